use async_trait::async_trait;
use shared::{error::ApiError, protocol::CommentPayload};
use thiserror::Error;

use crate::{events::EventKind, model::Comment, transformer::TransformError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("server rejected the request: {0}")]
    Rejected(#[from] ApiError),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server response could not be applied: {0}")]
    InvalidResponse(#[from] TransformError),
}

/// Server side of the mutation protocol. Every call gets the depleted payload
/// of the record being mutated and answers with the authoritative record.
#[async_trait]
pub trait MutationGateway: Send + Sync {
    async fn submit_create(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError>;
    async fn submit_update(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError>;
    async fn submit_delete(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError>;
    async fn submit_upvote_toggle(
        &self,
        payload: CommentPayload,
    ) -> Result<CommentPayload, GatewayError>;
}

/// Source of the initial thread.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_comments(&self) -> Result<Vec<CommentPayload>, GatewayError>;
}

/// Gateway for a view-model with no server attached; every mutation rolls back.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGateway;

#[async_trait]
impl MutationGateway for OfflineGateway {
    async fn submit_create(&self, _payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        Err(offline())
    }

    async fn submit_update(&self, _payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        Err(offline())
    }

    async fn submit_delete(&self, _payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        Err(offline())
    }

    async fn submit_upvote_toggle(
        &self,
        _payload: CommentPayload,
    ) -> Result<CommentPayload, GatewayError> {
        Err(offline())
    }
}

fn offline() -> GatewayError {
    GatewayError::Transport("no gateway configured".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    UpvoteToggle,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::UpvoteToggle => "upvote_toggle",
        }
    }

    pub fn event_kind(self) -> EventKind {
        match self {
            Self::Create => EventKind::CommentAdded,
            Self::Update | Self::UpvoteToggle => EventKind::CommentUpdated,
            Self::Delete => EventKind::CommentDeleted,
        }
    }

    pub(crate) async fn dispatch(
        self,
        gateway: &dyn MutationGateway,
        payload: CommentPayload,
    ) -> Result<CommentPayload, GatewayError> {
        match self {
            Self::Create => gateway.submit_create(payload).await,
            Self::Update => gateway.submit_update(payload).await,
            Self::Delete => gateway.submit_delete(payload).await,
            Self::UpvoteToggle => gateway.submit_upvote_toggle(payload).await,
        }
    }

    /// Copies back only the fields this kind of mutation changes. Creates
    /// are discarded instead and never reach this.
    pub(crate) fn restore(self, target: &mut Comment, snapshot: &Comment) {
        match self {
            Self::Create => {}
            Self::Update => {
                target.content = snapshot.content.clone();
                target.pings = snapshot.pings.clone();
                target.attachments = snapshot.attachments.clone();
                target.modified_at = snapshot.modified_at;
            }
            Self::Delete => target.is_deleted = snapshot.is_deleted,
            Self::UpvoteToggle => {
                target.upvote_count = snapshot.upvote_count;
                target.user_has_upvoted = snapshot.user_has_upvoted;
            }
        }
    }
}
