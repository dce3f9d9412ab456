use serde::{Deserialize, Serialize};

/// A comment as it travels over the wire: a JSON object keyed by the external
/// field names of the configured mapping. Keys the mapping does not know about
/// are carried through untouched.
pub type CommentPayload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub mime_type: String,
    /// URL of the stored file.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Server-side keys such as an attachment id, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
