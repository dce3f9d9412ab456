use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use shared::{
    domain::{CommentId, UserId},
    protocol::{AttachmentPayload, CommentPayload},
};
use thiserror::Error;

use crate::{
    config::CommentsContext,
    model::{Attachment, Comment, Time, WireOrigin},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("field '{key}' has the wrong type, expected {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("field '{key}' is not a valid timestamp: {value}")]
    InvalidTimestamp { key: String, value: String },
    #[error("field '{0}' must not be negative")]
    Negative(String),
}

/// Converts wire payloads to enriched comments and back.
#[derive(Debug, Clone)]
pub struct CommentTransformer {
    context: Arc<CommentsContext>,
}

impl CommentTransformer {
    pub fn new(context: Arc<CommentsContext>) -> Self {
        Self { context }
    }

    pub fn enrich(&self, payload: &CommentPayload) -> Result<Comment, TransformError> {
        let mapping = self.context.mapping();
        let mut fields = payload.clone();
        let raw: Map<String, Value> = mapping
            .entries()
            .iter()
            .filter_map(|(_, key)| payload.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();

        let id = take_identifier(&mut fields, &mapping.id)?
            .map(CommentId::new)
            .ok_or_else(|| TransformError::MissingField(mapping.id.clone()))?;
        let creator_user_id = take_identifier(&mut fields, &mapping.creator)?
            .map(UserId::new)
            .ok_or_else(|| TransformError::MissingField(mapping.creator.clone()))?;
        let created_by_current_user = creator_user_id == *self.context.current_user();

        let mut comment = Comment {
            parent_id: take_parent(&mut fields, &mapping.parent)?,
            child_ids: Vec::new(),
            created_at: take_time(&mut fields, &mapping.created)?
                .ok_or_else(|| TransformError::MissingField(mapping.created.clone()))?,
            modified_at: take_time(&mut fields, &mapping.modified)?,
            content: take_string(&mut fields, &mapping.content)?
                .ok_or_else(|| TransformError::MissingField(mapping.content.clone()))?,
            pings: take_pings(&mut fields, &mapping.pings)?,
            attachments: take_attachments(&mut fields, &mapping.attachments)?,
            creator_display_name: take_string(&mut fields, &mapping.fullname)?,
            creator_profile_picture_url: take_string(&mut fields, &mapping.profile_picture_url)?,
            upvote_count: take_count(&mut fields, &mapping.upvote_count)?,
            user_has_upvoted: take_flag(&mut fields, &mapping.user_has_upvoted)?,
            is_deleted: take_flag(&mut fields, &mapping.is_deleted)?,
            is_new: take_flag(&mut fields, &mapping.is_new)?,
            created_by_admin: take_flag(&mut fields, &mapping.created_by_admin)?,
            created_by_current_user,
            id,
            creator_user_id,
            extra: fields,
            wire: WireOrigin::default(),
        };
        comment.wire = WireOrigin {
            canonical: self.render_mapped(&comment),
            raw,
        };
        Ok(comment)
    }

    /// Strips derived fields and renames everything back to external keys.
    ///
    /// Fields unchanged since `enrich` keep their received spelling (integer
    /// ids, epoch timestamps, omitted optional keys); everything else is
    /// written in canonical form.
    pub fn deplete(&self, comment: &Comment) -> CommentPayload {
        let mut payload = comment.extra.clone();
        for (key, rendered) in self.render_mapped(comment) {
            if comment.wire.canonical.get(&key) != Some(&rendered) {
                payload.insert(key, rendered);
            } else if let Some(received) = comment.wire.raw.get(&key) {
                payload.insert(key, received.clone());
            }
        }
        payload
    }

    /// Canonical rendering of every mapped field.
    fn render_mapped(&self, comment: &Comment) -> Map<String, Value> {
        let mapping = self.context.mapping();
        let mut payload = Map::new();

        payload.insert(mapping.id.clone(), Value::from(comment.id.as_str()));
        payload.insert(
            mapping.parent.clone(),
            optional_string(comment.parent_id.as_ref().map(CommentId::as_str)),
        );
        payload.insert(mapping.created.clone(), Value::from(format_time(&comment.created_at)));
        payload.insert(
            mapping.modified.clone(),
            comment
                .modified_at
                .as_ref()
                .map_or(Value::Null, |t| Value::from(format_time(t))),
        );
        payload.insert(mapping.content.clone(), Value::from(comment.content.as_str()));
        payload.insert(
            mapping.pings.clone(),
            Value::Array(comment.pings.iter().map(|p| Value::from(p.as_str())).collect()),
        );
        payload.insert(
            mapping.attachments.clone(),
            Value::Array(comment.attachments.iter().map(attachment_to_value).collect()),
        );
        payload.insert(
            mapping.creator.clone(),
            Value::from(comment.creator_user_id.as_str()),
        );
        payload.insert(
            mapping.fullname.clone(),
            optional_string(comment.creator_display_name.as_deref()),
        );
        payload.insert(
            mapping.profile_picture_url.clone(),
            optional_string(comment.creator_profile_picture_url.as_deref()),
        );
        payload.insert(mapping.upvote_count.clone(), Value::from(comment.upvote_count));
        payload.insert(
            mapping.user_has_upvoted.clone(),
            Value::Bool(comment.user_has_upvoted),
        );
        payload.insert(mapping.is_deleted.clone(), Value::Bool(comment.is_deleted));
        payload.insert(mapping.is_new.clone(), Value::Bool(comment.is_new));
        payload.insert(
            mapping.created_by_admin.clone(),
            Value::Bool(comment.created_by_admin),
        );
        payload
    }

    /// Applies a server response on top of `current`: keys present in the
    /// response win, everything else is kept. Parent and replies never change.
    pub fn merge(
        &self,
        current: &Comment,
        response: &CommentPayload,
    ) -> Result<Comment, TransformError> {
        let mut merged = self.deplete(current);
        merged.extend(response.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut comment = self.enrich(&merged)?;
        comment.parent_id = current.parent_id.clone();
        comment.child_ids = current.child_ids.clone();
        Ok(comment)
    }
}

pub fn format_time(time: &Time) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn attachment_to_value(attachment: &Attachment) -> Value {
    let mut object = attachment.extra.clone();
    object.insert("mime_type".into(), Value::from(attachment.mime_type.as_str()));
    object.insert("file".into(), Value::from(attachment.url.as_str()));
    if let Some(name) = &attachment.name {
        object.insert("name".into(), Value::from(name.as_str()));
    }
    if let Some(size) = attachment.size {
        object.insert("size".into(), Value::from(size));
    }
    Value::Object(object)
}

fn wrong_type(key: &str, expected: &'static str) -> TransformError {
    TransformError::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Removes `key`, treating an explicit `null` like an absent key.
fn take(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    fields.remove(key).filter(|v| !v.is_null())
}

fn take_identifier(fields: &mut Map<String, Value>, key: &str) -> Result<Option<String>, TransformError> {
    match take(fields, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(_) => Err(wrong_type(key, "string or integer id")),
    }
}

fn take_parent(fields: &mut Map<String, Value>, key: &str) -> Result<Option<CommentId>, TransformError> {
    match take(fields, key) {
        None | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(None),
        Some(Value::String(s)) => Ok(Some(CommentId::new(s))),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(CommentId::new(n.to_string()))),
        Some(_) => Err(wrong_type(key, "parent id or null")),
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<Option<String>, TransformError> {
    match take(fields, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(wrong_type(key, "string")),
    }
}

fn take_flag(fields: &mut Map<String, Value>, key: &str) -> Result<bool, TransformError> {
    match take(fields, key) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(_) => Err(wrong_type(key, "boolean")),
    }
}

fn take_count(fields: &mut Map<String, Value>, key: &str) -> Result<u64, TransformError> {
    match take(fields, key) {
        None => Ok(0),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_i64()) {
            (Some(count), _) => Ok(count),
            (None, Some(_)) => Err(TransformError::Negative(key.to_string())),
            (None, None) => Err(wrong_type(key, "non-negative integer")),
        },
        Some(_) => Err(wrong_type(key, "non-negative integer")),
    }
}

fn take_time(fields: &mut Map<String, Value>, key: &str) -> Result<Option<Time>, TransformError> {
    let invalid = |value: String| TransformError::InvalidTimestamp {
        key: key.to_string(),
        value,
    };
    match take(fields, key) {
        None => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| invalid(s)),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(Some)
            .ok_or_else(|| invalid(n.to_string())),
        Some(_) => Err(wrong_type(key, "timestamp")),
    }
}

fn take_pings(fields: &mut Map<String, Value>, key: &str) -> Result<Vec<UserId>, TransformError> {
    match take(fields, key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(UserId::new(s)),
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(UserId::new(n.to_string())),
                _ => Err(wrong_type(key, "array of user ids")),
            })
            .collect(),
        Some(_) => Err(wrong_type(key, "array of user ids")),
    }
}

fn take_attachments(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Result<Vec<Attachment>, TransformError> {
    match take(fields, key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<AttachmentPayload>(item)
                    .map(|a| Attachment {
                        mime_type: a.mime_type,
                        url: a.file,
                        name: a.name,
                        size: a.size,
                        extra: a.extra,
                    })
                    .map_err(|_| wrong_type(key, "array of attachment objects"))
            })
            .collect(),
        Some(_) => Err(wrong_type(key, "array of attachment objects")),
    }
}

#[cfg(test)]
#[path = "tests/transformer_tests.rs"]
mod tests;
