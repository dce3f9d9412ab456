use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shared::domain::{CommentId, UserId};

pub type Time = DateTime<Utc>;

/// How the mapped fields of a record were spelled on the wire.
///
/// `raw` holds the values as received (absent keys stay absent) and
/// `canonical` what the transformer rendered for them at that moment. A field
/// whose rendering still matches is written back in its received spelling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireOrigin {
    pub(crate) raw: Map<String, Value>,
    pub(crate) canonical: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub url: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    /// Keys of the wire attachment object other than the known ones.
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl Attachment {
    /// Splits `type/format`; `None` when the mime type is not of that shape.
    pub fn mime_parts(&self) -> Option<(&str, &str)> {
        let (kind, format) = self.mime_type.split_once('/')?;
        if kind.is_empty() || format.is_empty() || format.contains('/') {
            return None;
        }
        Some((kind, format))
    }

    pub fn media_kind(&self) -> MediaKind {
        match self.mime_parts() {
            Some(("image", _)) => MediaKind::Image,
            Some(("video", _)) => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// Enriched, in-memory comment record.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    /// `None` for top-level comments. Never changes after creation.
    pub parent_id: Option<CommentId>,
    /// Direct replies in arrival order. Maintained by the store.
    pub child_ids: Vec<CommentId>,
    pub creator_user_id: UserId,
    pub creator_display_name: Option<String>,
    pub creator_profile_picture_url: Option<String>,
    pub created_at: Time,
    pub modified_at: Option<Time>,
    pub content: String,
    pub pings: Vec<UserId>,
    pub attachments: Vec<Attachment>,
    pub upvote_count: u64,
    pub user_has_upvoted: bool,
    pub is_deleted: bool,
    pub is_new: bool,
    pub created_by_current_user: bool,
    pub created_by_admin: bool,
    /// Wire keys not covered by the field mapping.
    pub extra: Map<String, Value>,
    /// Empty for records created locally.
    pub wire: WireOrigin,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub fn reply_count(&self) -> usize {
        self.child_ids.len()
    }

    pub fn was_edited(&self) -> bool {
        self.modified_at
            .is_some_and(|modified| modified != self.created_at)
    }

    /// Flips the upvote flag and moves the count with it in one step.
    pub(crate) fn toggle_upvote(&mut self) {
        if self.user_has_upvoted {
            self.upvote_count = self.upvote_count.saturating_sub(1);
        } else {
            self.upvote_count = self.upvote_count.saturating_add(1);
        }
        self.user_has_upvoted = !self.user_has_upvoted;
    }
}

#[cfg(test)]
#[path = "tests/model_tests.rs"]
mod tests;
