use std::{collections::HashSet, fs, path::Path, sync::Arc};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{SortKey, UserId};
use thiserror::Error;
use tracing::{debug, warn};

const ENV_PREFIX: &str = "COMMENTS__";

/// External (wire) key for every mapped comment field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub id: String,
    pub parent: String,
    pub created: String,
    pub modified: String,
    pub content: String,
    pub attachments: String,
    pub pings: String,
    pub creator: String,
    pub fullname: String,
    pub profile_picture_url: String,
    pub is_new: String,
    pub created_by_admin: String,
    pub upvote_count: String,
    pub user_has_upvoted: String,
    pub is_deleted: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            id: "id".into(),
            parent: "parent".into(),
            created: "created".into(),
            modified: "modified".into(),
            content: "content".into(),
            attachments: "attachments".into(),
            pings: "pings".into(),
            creator: "creator".into(),
            fullname: "fullname".into(),
            profile_picture_url: "profile_picture_url".into(),
            is_new: "is_new".into(),
            created_by_admin: "created_by_admin".into(),
            upvote_count: "upvote_count".into(),
            user_has_upvoted: "user_has_upvoted".into(),
            is_deleted: "is_deleted".into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("field '{field}' is mapped to an empty key")]
    EmptyKey { field: &'static str },
    #[error("external key '{key}' is mapped more than once")]
    DuplicateKey { key: String },
}

impl FieldMapping {
    pub fn entries(&self) -> [(&'static str, &str); 15] {
        [
            ("id", self.id.as_str()),
            ("parent", self.parent.as_str()),
            ("created", self.created.as_str()),
            ("modified", self.modified.as_str()),
            ("content", self.content.as_str()),
            ("attachments", self.attachments.as_str()),
            ("pings", self.pings.as_str()),
            ("creator", self.creator.as_str()),
            ("fullname", self.fullname.as_str()),
            ("profile_picture_url", self.profile_picture_url.as_str()),
            ("is_new", self.is_new.as_str()),
            ("created_by_admin", self.created_by_admin.as_str()),
            ("upvote_count", self.upvote_count.as_str()),
            ("user_has_upvoted", self.user_has_upvoted.as_str()),
            ("is_deleted", self.is_deleted.as_str()),
        ]
    }

    /// The inverse mapping only exists if external keys are distinct.
    pub fn validate(&self) -> Result<(), MappingError> {
        let mut seen = HashSet::new();
        for (field, key) in self.entries() {
            if key.trim().is_empty() {
                return Err(MappingError::EmptyKey { field });
            }
            if !seen.insert(key) {
                return Err(MappingError::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn is_mapped(&self, key: &str) -> bool {
        self.entries().iter().any(|(_, mapped)| *mapped == key)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommentsOptions {
    pub current_user_id: UserId,
    pub current_user_name: Option<String>,
    pub current_user_profile_picture_url: Option<String>,
    pub current_user_is_admin: bool,
    pub enable_replying: bool,
    pub enable_editing: bool,
    pub enable_upvoting: bool,
    pub enable_deleting: bool,
    pub enable_deleting_comment_with_replies: bool,
    pub enable_attachments: bool,
    pub default_sort: SortKey,
    pub field_mappings: FieldMapping,
}

impl Default for CommentsOptions {
    fn default() -> Self {
        Self {
            current_user_id: UserId::new(""),
            current_user_name: None,
            current_user_profile_picture_url: None,
            current_user_is_admin: false,
            enable_replying: true,
            enable_editing: true,
            enable_upvoting: true,
            enable_deleting: true,
            enable_deleting_comment_with_replies: false,
            enable_attachments: false,
            default_sort: SortKey::Newest,
            field_mappings: FieldMapping::default(),
        }
    }
}

/// Loads options from `path` (if it exists) and `COMMENTS__*` environment
/// variables, in that order of precedence.
pub fn load_options(path: impl AsRef<Path>) -> anyhow::Result<CommentsOptions> {
    let path = path.as_ref();
    let mut options = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<CommentsOptions>(&raw)
            .with_context(|| format!("failed to parse comments config '{}'", path.display()))?,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "no comments config file, using defaults");
            CommentsOptions::default()
        }
    };

    apply_env_overrides(&mut options, |name| std::env::var(name).ok());
    options
        .field_mappings
        .validate()
        .context("invalid field mapping")?;
    Ok(options)
}

pub fn apply_env_overrides(
    options: &mut CommentsOptions,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
    let flag = |name: &str, target: &mut bool| {
        if let Some(raw) = var(name) {
            match parse_flag(&raw) {
                Some(value) => *target = value,
                None => warn!(variable = name, value = %raw, "ignoring non-boolean override"),
            }
        }
    };

    if let Some(v) = var("CURRENT_USER_ID") {
        options.current_user_id = UserId::new(v);
    }
    if let Some(v) = var("CURRENT_USER_NAME") {
        options.current_user_name = Some(v);
    }
    flag("CURRENT_USER_IS_ADMIN", &mut options.current_user_is_admin);
    flag("ENABLE_REPLYING", &mut options.enable_replying);
    flag("ENABLE_EDITING", &mut options.enable_editing);
    flag("ENABLE_UPVOTING", &mut options.enable_upvoting);
    flag("ENABLE_DELETING", &mut options.enable_deleting);
    flag(
        "ENABLE_DELETING_COMMENT_WITH_REPLIES",
        &mut options.enable_deleting_comment_with_replies,
    );
    flag("ENABLE_ATTACHMENTS", &mut options.enable_attachments);
    if let Some(v) = var("DEFAULT_SORT") {
        match v.parse() {
            Ok(sort) => options.default_sort = sort,
            Err(err) => warn!(error = %err, "ignoring default sort override"),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Everything the comment components need, built once and shared by `Arc`.
#[derive(Debug)]
pub struct CommentsContext {
    pub options: CommentsOptions,
}

impl CommentsContext {
    pub fn new(options: CommentsOptions) -> Result<Arc<Self>, MappingError> {
        options.field_mappings.validate()?;
        Ok(Arc::new(Self { options }))
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.options.field_mappings
    }

    pub fn current_user(&self) -> &UserId {
        &self.options.current_user_id
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
