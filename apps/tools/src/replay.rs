use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use comments_core::{
    CommentEdit, CommentEvent, CommentViewModel, GatewayError, MutationGateway, MutationPhase,
    NewComment, PendingMutation,
};
use serde::Deserialize;
use serde_json::Value;
use shared::{domain::CommentId, error::ApiError, protocol::CommentPayload};
use tracing::warn;

/// In-process server: echoes every payload and numbers new comments
/// `srv-1`, `srv-2`, ... so scripts can refer to them.
#[derive(Debug)]
pub struct EchoGateway {
    id_key: String,
    failure: Option<String>,
    next_id: AtomicU64,
}

impl EchoGateway {
    /// `id_key` is the external key new ids are written under.
    pub fn new(id_key: impl Into<String>) -> Self {
        Self {
            id_key: id_key.into(),
            failure: None,
            next_id: AtomicU64::new(0),
        }
    }

    /// Refuses every request with `body` as the server's error body, either a
    /// JSON `ApiError` or plain text.
    pub fn failing(mut self, body: impl Into<String>) -> Self {
        self.failure = Some(body.into());
        self
    }

    fn answer(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        if let Some(body) = &self.failure {
            return Err(GatewayError::Rejected(ApiError::parse(body.as_bytes())));
        }
        Ok(payload)
    }
}

#[async_trait]
impl MutationGateway for EchoGateway {
    async fn submit_create(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        let mut response = self.answer(payload)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        response.insert(self.id_key.clone(), Value::from(format!("srv-{n}")));
        Ok(response)
    }

    async fn submit_update(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        self.answer(payload)
    }

    async fn submit_delete(&self, payload: CommentPayload) -> Result<CommentPayload, GatewayError> {
        self.answer(payload)
    }

    async fn submit_upvote_toggle(
        &self,
        payload: CommentPayload,
    ) -> Result<CommentPayload, GatewayError> {
        self.answer(payload)
    }
}

/// One line of a replay script.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Create {
        content: String,
        #[serde(default)]
        parent: Option<CommentId>,
    },
    Edit {
        id: CommentId,
        content: String,
    },
    Delete {
        id: CommentId,
    },
    Upvote {
        id: CommentId,
    },
}

/// Scripts are JSON lines; blank lines and `#` comments are skipped.
pub fn parse_script(raw: &str) -> Result<Vec<Step>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid step on line {}", n + 1))
        })
        .collect()
}

pub async fn run_step(vm: &CommentViewModel, step: Step) -> Result<()> {
    let pending: PendingMutation = match step {
        Step::Create { content, parent } => {
            let mut input = NewComment::new(content);
            input.parent_id = parent;
            vm.create(input)
        }
        Step::Edit { id, content } => vm.edit(&id, CommentEdit::new(content)),
        Step::Delete { id } => vm.delete(&id),
        Step::Upvote { id } => vm.toggle_upvote(&id),
    }
    .context("step rejected")?;

    let kind = pending.kind();
    let outcome = pending.await;
    if !outcome.is_confirmed() {
        warn!(mutation = kind.as_str(), ?outcome, "step not confirmed");
    }
    Ok(())
}

pub fn describe(event: &CommentEvent) -> String {
    let phase = match &event.phase {
        MutationPhase::Optimistic => "optimistic".to_string(),
        MutationPhase::Confirmed => "confirmed".to_string(),
        MutationPhase::RolledBack(err) => format!("rolled back ({err})"),
    };
    let mut line = format!("{:?} {} {phase}", event.kind, event.comment_id);
    if let Some(replaced) = &event.replaced_id {
        line.push_str(&format!(" replacing {replaced}"));
    }
    line
}

#[cfg(test)]
#[path = "tests/replay_tests.rs"]
mod tests;
