use std::{fmt, future::IntoFuture, sync::Arc};

use chrono::{SubsecRound, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use shared::{
    domain::{CommentId, SortKey, UserId},
    protocol::CommentPayload,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::{CommentsContext, CommentsOptions},
    events::{CommentEvent, EventBus, EventKind, MutationPhase, Subscription},
    gateway::{CommentSource, GatewayError, MutationGateway, MutationKind},
    model::{Attachment, Comment, Time},
    sorter::CommentSorter,
    store::CommentStore,
    transformer::{CommentTransformer, TransformError},
};

/// Local rejection of a mutation. The store is never touched when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("comment content must not be empty")]
    EmptyContent,
    #[error("replying is disabled")]
    RepliesDisabled,
    #[error("parent comment {0} does not exist")]
    UnknownParent(CommentId),
    #[error("comment {0} is not confirmed by the server yet")]
    Pending(CommentId),
    #[error("attachments are disabled")]
    AttachmentsDisabled,
    #[error("editing is disabled")]
    EditingDisabled,
    #[error("deleting is disabled")]
    DeletingDisabled,
    #[error("upvoting is disabled")]
    UpvotingDisabled,
    #[error("current user may not modify comment {0}")]
    NotPermitted(CommentId),
    #[error("comment {0} has replies")]
    HasReplies(CommentId),
    #[error("comment {0} is deleted")]
    Deleted(CommentId),
    #[error("edit leaves comment {0} unchanged")]
    Unchanged(CommentId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewComment {
    pub content: String,
    pub parent_id: Option<CommentId>,
    pub pings: Vec<UserId>,
    pub attachments: Vec<Attachment>,
}

impl NewComment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn reply_to(mut self, parent_id: CommentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_pings(mut self, pings: Vec<UserId>) -> Self {
        self.pings = pings;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// New content for an existing comment. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentEdit {
    pub content: String,
    pub pings: Option<Vec<UserId>>,
    pub attachments: Option<Vec<Attachment>>,
}

impl CommentEdit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_pings(mut self, pings: Vec<UserId>) -> Self {
        self.pings = Some(pings);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Server accepted the mutation; carries the reconciled record.
    Confirmed(Comment),
    RolledBack(GatewayError),
    /// The target disappeared; nothing was sent or changed.
    Skipped,
}

impl MutationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Gateway half of a mutation whose optimistic half has already been
/// applied. The gateway is only called once this is awaited.
#[must_use = "the gateway call only happens when the mutation is awaited"]
pub struct PendingMutation {
    kind: MutationKind,
    comment_id: CommentId,
    future: BoxFuture<'static, MutationOutcome>,
}

impl PendingMutation {
    fn skipped(kind: MutationKind, comment_id: CommentId) -> Self {
        Self {
            kind,
            comment_id,
            future: future::ready(MutationOutcome::Skipped).boxed(),
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Id of the target; the temporary id for a create.
    pub fn comment_id(&self) -> &CommentId {
        &self.comment_id
    }
}

impl IntoFuture for PendingMutation {
    type Output = MutationOutcome;
    type IntoFuture = BoxFuture<'static, MutationOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl fmt::Debug for PendingMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingMutation")
            .field("kind", &self.kind)
            .field("comment_id", &self.comment_id)
            .finish_non_exhaustive()
    }
}

struct Shared {
    context: Arc<CommentsContext>,
    transformer: CommentTransformer,
    sorter: CommentSorter,
    store: Mutex<CommentStore>,
    events: EventBus,
    gateway: Arc<dyn MutationGateway>,
}

/// Owns the comment tree and is the only component that mutates it.
///
/// Every mutation runs in two halves. Validation, the optimistic change and
/// its event happen before the method returns; the returned
/// [`PendingMutation`] then talks to the gateway and either reconciles the
/// record with the server response or restores the fields it changed.
/// Event handlers run with no lock held and may call back into the
/// view-model.
#[derive(Clone)]
pub struct CommentViewModel {
    shared: Arc<Shared>,
}

impl CommentViewModel {
    pub fn new(context: Arc<CommentsContext>, gateway: Arc<dyn MutationGateway>) -> Self {
        let transformer = CommentTransformer::new(Arc::clone(&context));
        let sorter = CommentSorter::new(&context.options);
        Self {
            shared: Arc::new(Shared {
                context,
                transformer,
                sorter,
                store: Mutex::new(CommentStore::new()),
                events: EventBus::new(),
                gateway,
            }),
        }
    }

    pub fn context(&self) -> &Arc<CommentsContext> {
        &self.shared.context
    }

    pub fn transformer(&self) -> &CommentTransformer {
        &self.shared.transformer
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&CommentEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(kind, handler)
    }

    fn options(&self) -> &CommentsOptions {
        &self.shared.context.options
    }

    /// Adds wire records to the thread. Nothing is stored if any record
    /// fails to convert.
    pub fn load(&self, payloads: &[CommentPayload]) -> Result<usize, TransformError> {
        let records = payloads
            .iter()
            .map(|payload| self.shared.transformer.enrich(payload))
            .collect::<Result<Vec<_>, _>>()?;
        let count = records.len();

        let mut store = self.shared.store.lock();
        for record in records {
            store.upsert(record);
        }
        info!(count, total = store.len(), "loaded comments");
        Ok(count)
    }

    /// Replaces the whole thread with what `source` returns. Mutations still
    /// in flight for records that are gone resolve as skipped.
    pub async fn reload(&self, source: &dyn CommentSource) -> Result<usize, GatewayError> {
        let payloads = source.fetch_comments().await?;
        let mut fresh = CommentStore::new();
        for payload in &payloads {
            fresh.upsert(self.shared.transformer.enrich(payload)?);
        }
        let count = fresh.len();
        *self.shared.store.lock() = fresh;
        info!(count, "reloaded comments");
        Ok(count)
    }

    pub fn get_comment(&self, id: &CommentId) -> Option<Comment> {
        self.shared.store.lock().snapshot(id)
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.lock().is_empty()
    }

    pub fn sorted_top_level(&self, key: SortKey) -> Vec<Comment> {
        let records: Vec<Comment> = self.shared.store.lock().iter().cloned().collect();
        self.shared.sorter.sort(records, key)
    }

    pub fn default_sorted(&self) -> Vec<Comment> {
        self.sorted_top_level(self.options().default_sort)
    }

    pub fn replies(&self, id: &CommentId) -> Vec<Comment> {
        self.shared
            .store
            .lock()
            .children_of(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn attachments_view(&self) -> Vec<Comment> {
        self.sorted_top_level(SortKey::Attachments)
    }

    /// Top-level comment whose reply list shows a reply to `id`. Replies to
    /// replies are displayed flat under the outermost ancestor.
    pub fn reply_target(&self, id: &CommentId) -> Option<CommentId> {
        let store = self.shared.store.lock();
        let mut current = store.get(id)?;
        // Bounded walk: malformed input could contain a parent cycle.
        for _ in 0..store.len() {
            match current.parent_id.as_ref().and_then(|p| store.get(p)) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Some(current.id.clone())
    }

    pub fn can_reply(&self, parent_id: &CommentId) -> bool {
        let store = self.shared.store.lock();
        self.check_reply(&store, parent_id).is_ok()
    }

    pub fn can_edit(&self, id: &CommentId) -> bool {
        self.check_existing(id, |c| self.check_edit(c))
    }

    pub fn can_delete(&self, id: &CommentId) -> bool {
        self.check_existing(id, |c| self.check_delete(c))
    }

    pub fn can_upvote(&self, id: &CommentId) -> bool {
        self.check_existing(id, |c| self.check_upvote(c))
    }

    fn check_existing(
        &self,
        id: &CommentId,
        check: impl FnOnce(&Comment) -> Result<(), ValidationError>,
    ) -> bool {
        self.shared
            .store
            .lock()
            .get(id)
            .is_some_and(|comment| check(comment).is_ok())
    }

    fn check_reply(&self, store: &CommentStore, parent_id: &CommentId) -> Result<(), ValidationError> {
        if !self.options().enable_replying {
            return Err(ValidationError::RepliesDisabled);
        }
        let parent = store
            .get(parent_id)
            .ok_or_else(|| ValidationError::UnknownParent(parent_id.clone()))?;
        if parent.id.is_temporary() {
            return Err(ValidationError::Pending(parent.id.clone()));
        }
        if parent.is_deleted {
            return Err(ValidationError::Deleted(parent.id.clone()));
        }
        Ok(())
    }

    fn check_owner(&self, comment: &Comment) -> Result<(), ValidationError> {
        if comment.created_by_current_user || self.options().current_user_is_admin {
            Ok(())
        } else {
            Err(ValidationError::NotPermitted(comment.id.clone()))
        }
    }

    fn check_settled(comment: &Comment) -> Result<(), ValidationError> {
        if comment.is_deleted {
            return Err(ValidationError::Deleted(comment.id.clone()));
        }
        if comment.id.is_temporary() {
            return Err(ValidationError::Pending(comment.id.clone()));
        }
        Ok(())
    }

    fn check_edit(&self, comment: &Comment) -> Result<(), ValidationError> {
        if !self.options().enable_editing {
            return Err(ValidationError::EditingDisabled);
        }
        self.check_owner(comment)?;
        Self::check_settled(comment)
    }

    fn check_delete(&self, comment: &Comment) -> Result<(), ValidationError> {
        let options = self.options();
        if !options.enable_deleting {
            return Err(ValidationError::DeletingDisabled);
        }
        self.check_owner(comment)?;
        Self::check_settled(comment)?;
        if comment.reply_count() > 0 && !options.enable_deleting_comment_with_replies {
            return Err(ValidationError::HasReplies(comment.id.clone()));
        }
        Ok(())
    }

    fn check_upvote(&self, comment: &Comment) -> Result<(), ValidationError> {
        if !self.options().enable_upvoting {
            return Err(ValidationError::UpvotingDisabled);
        }
        Self::check_settled(comment)
    }

    /// Adds the comment under a temporary id right away; the confirmation
    /// moves it to the id the server assigns.
    pub fn create(&self, input: NewComment) -> Result<PendingMutation, ValidationError> {
        let options = self.options();
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if !input.attachments.is_empty() && !options.enable_attachments {
            return Err(ValidationError::AttachmentsDisabled);
        }

        let created_at = now();
        let comment = Comment {
            id: CommentId::temporary(),
            parent_id: input.parent_id,
            child_ids: Vec::new(),
            creator_user_id: options.current_user_id.clone(),
            creator_display_name: options.current_user_name.clone(),
            creator_profile_picture_url: options.current_user_profile_picture_url.clone(),
            created_at,
            modified_at: Some(created_at),
            content: content.to_string(),
            pings: input.pings,
            attachments: input.attachments,
            upvote_count: 0,
            user_has_upvoted: false,
            is_deleted: false,
            is_new: false,
            created_by_current_user: true,
            created_by_admin: options.current_user_is_admin,
            extra: Default::default(),
            wire: Default::default(),
        };

        {
            let mut store = self.shared.store.lock();
            if let Some(parent_id) = &comment.parent_id {
                self.check_reply(&store, parent_id)?;
            }
            store.upsert(comment.clone());
        }
        debug!(
            comment_id = %comment.id,
            parent_id = ?comment.parent_id,
            "optimistic create applied"
        );

        self.emit(&CommentEvent::new(
            EventKind::CommentAdded,
            MutationPhase::Optimistic,
            &comment,
        ));
        if let Some(parent_id) = &comment.parent_id {
            self.emit(&CommentEvent::action_bar_refresh(
                parent_id,
                MutationPhase::Optimistic,
            ));
        }

        let payload = self.shared.transformer.deplete(&comment);
        let future = self.clone().settle_create(comment.id.clone(), payload).boxed();
        Ok(PendingMutation {
            kind: MutationKind::Create,
            comment_id: comment.id,
            future,
        })
    }

    pub fn edit(&self, id: &CommentId, edit: CommentEdit) -> Result<PendingMutation, ValidationError> {
        let content = edit.content.trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        self.mutate(MutationKind::Update, id, |comment| {
            self.check_edit(comment)?;
            let pings = edit.pings.unwrap_or_else(|| comment.pings.clone());
            let attachments = edit
                .attachments
                .unwrap_or_else(|| comment.attachments.clone());
            if attachments != comment.attachments && !self.options().enable_attachments {
                return Err(ValidationError::AttachmentsDisabled);
            }
            if content == comment.content
                && pings == comment.pings
                && attachments == comment.attachments
            {
                return Err(ValidationError::Unchanged(comment.id.clone()));
            }
            comment.content = content;
            comment.pings = pings;
            comment.attachments = attachments;
            comment.modified_at = Some(now());
            Ok(())
        })
    }

    /// Tombstones the comment. Its replies stay where they are.
    pub fn delete(&self, id: &CommentId) -> Result<PendingMutation, ValidationError> {
        self.mutate(MutationKind::Delete, id, |comment| {
            self.check_delete(comment)?;
            comment.is_deleted = true;
            Ok(())
        })
    }

    pub fn toggle_upvote(&self, id: &CommentId) -> Result<PendingMutation, ValidationError> {
        self.mutate(MutationKind::UpvoteToggle, id, |comment| {
            self.check_upvote(comment)?;
            comment.toggle_upvote();
            Ok(())
        })
    }

    fn mutate<F>(
        &self,
        kind: MutationKind,
        id: &CommentId,
        apply: F,
    ) -> Result<PendingMutation, ValidationError>
    where
        F: FnOnce(&mut Comment) -> Result<(), ValidationError>,
    {
        let (snapshot, updated) = {
            let mut store = self.shared.store.lock();
            let Some(snapshot) = store.snapshot(id) else {
                debug!(
                    comment_id = %id,
                    mutation = kind.as_str(),
                    "mutation of unknown comment ignored"
                );
                return Ok(PendingMutation::skipped(kind, id.clone()));
            };
            let mut updated = snapshot.clone();
            apply(&mut updated)?;
            store.upsert(updated.clone());
            (snapshot, updated)
        };
        debug!(comment_id = %id, mutation = kind.as_str(), "optimistic mutation applied");

        self.emit(&CommentEvent::new(
            kind.event_kind(),
            MutationPhase::Optimistic,
            &updated,
        ));
        if kind == MutationKind::Delete {
            if let Some(parent_id) = &updated.parent_id {
                self.emit(&CommentEvent::action_bar_refresh(
                    parent_id,
                    MutationPhase::Optimistic,
                ));
            }
        }

        let payload = self.shared.transformer.deplete(&updated);
        let future = self
            .clone()
            .settle(kind, id.clone(), snapshot, payload)
            .boxed();
        Ok(PendingMutation {
            kind,
            comment_id: id.clone(),
            future,
        })
    }

    async fn settle_create(self, temporary_id: CommentId, payload: CommentPayload) -> MutationOutcome {
        debug!(comment_id = %temporary_id, "submitting create");
        let result = match MutationKind::Create
            .dispatch(self.shared.gateway.as_ref(), payload)
            .await
        {
            Ok(response) => self.confirm_create(&temporary_id, &response),
            Err(err) => Err(err),
        };

        match result {
            Ok(Some(comment)) => {
                info!(
                    comment_id = %comment.id,
                    temporary_id = %temporary_id,
                    "create confirmed"
                );
                let mut event =
                    CommentEvent::new(EventKind::CommentAdded, MutationPhase::Confirmed, &comment);
                event.replaced_id = Some(temporary_id);
                self.emit(&event);
                MutationOutcome::Confirmed(comment)
            }
            Ok(None) => MutationOutcome::Skipped,
            Err(err) => self.roll_back_create(&temporary_id, err),
        }
    }

    fn confirm_create(
        &self,
        temporary_id: &CommentId,
        response: &CommentPayload,
    ) -> Result<Option<Comment>, GatewayError> {
        let mut store = self.shared.store.lock();
        let Some(current) = store.get(temporary_id) else {
            debug!(comment_id = %temporary_id, "created comment gone before confirmation");
            return Ok(None);
        };
        let confirmed = self.shared.transformer.merge(current, response)?;
        if confirmed.id.is_temporary() {
            let key = self.shared.context.mapping().id.clone();
            return Err(TransformError::MissingField(key).into());
        }

        let id = confirmed.id.clone();
        store.rekey(temporary_id, &id);
        store.upsert(confirmed);
        Ok(store.snapshot(&id))
    }

    fn roll_back_create(&self, temporary_id: &CommentId, err: GatewayError) -> MutationOutcome {
        let discarded = self.shared.store.lock().discard(temporary_id);
        warn!(comment_id = %temporary_id, error = %err, "create failed, comment discarded");

        self.emit(&CommentEvent::without_comment(
            EventKind::CommentAdded,
            MutationPhase::RolledBack(err.clone()),
            temporary_id,
        ));
        if let Some(parent_id) = discarded.and_then(|c| c.parent_id) {
            self.emit(&CommentEvent::action_bar_refresh(
                &parent_id,
                MutationPhase::RolledBack(err.clone()),
            ));
        }
        MutationOutcome::RolledBack(err)
    }

    async fn settle(
        self,
        kind: MutationKind,
        id: CommentId,
        snapshot: Comment,
        payload: CommentPayload,
    ) -> MutationOutcome {
        debug!(comment_id = %id, mutation = kind.as_str(), "submitting mutation");
        let result = match kind.dispatch(self.shared.gateway.as_ref(), payload).await {
            Ok(response) => self.confirm(kind, &id, &response),
            Err(err) => Err(err),
        };

        match result {
            Ok(Some(comment)) => {
                info!(comment_id = %id, mutation = kind.as_str(), "mutation confirmed");
                self.emit(&CommentEvent::new(
                    kind.event_kind(),
                    MutationPhase::Confirmed,
                    &comment,
                ));
                MutationOutcome::Confirmed(comment)
            }
            Ok(None) => MutationOutcome::Skipped,
            Err(err) => self.roll_back(kind, &id, &snapshot, err),
        }
    }

    fn confirm(
        &self,
        kind: MutationKind,
        id: &CommentId,
        response: &CommentPayload,
    ) -> Result<Option<Comment>, GatewayError> {
        let mut store = self.shared.store.lock();
        let Some(current) = store.get(id) else {
            debug!(comment_id = %id, "comment gone before confirmation");
            return Ok(None);
        };
        let mut merged = self.shared.transformer.merge(current, response)?;
        if merged.id != *id {
            warn!(comment_id = %id, response_id = %merged.id, "ignoring id change in confirmation");
            merged.id = id.clone();
        }
        if kind == MutationKind::Delete {
            merged.is_deleted = true;
        }
        store.upsert(merged);
        Ok(store.snapshot(id))
    }

    fn roll_back(
        &self,
        kind: MutationKind,
        id: &CommentId,
        snapshot: &Comment,
        err: GatewayError,
    ) -> MutationOutcome {
        let reverted = {
            let mut store = self.shared.store.lock();
            let Some(mut current) = store.snapshot(id) else {
                debug!(comment_id = %id, error = %err, "comment gone before rollback");
                return MutationOutcome::RolledBack(err);
            };
            kind.restore(&mut current, snapshot);
            store.upsert(current.clone());
            current
        };
        warn!(
            comment_id = %id,
            mutation = kind.as_str(),
            error = %err,
            "mutation failed, rolled back"
        );

        let phase = MutationPhase::RolledBack(err.clone());
        self.emit(&CommentEvent::new(kind.event_kind(), phase.clone(), &reverted));
        if kind == MutationKind::Delete {
            if let Some(parent_id) = &reverted.parent_id {
                self.emit(&CommentEvent::action_bar_refresh(parent_id, phase));
            }
        }
        MutationOutcome::RolledBack(err)
    }

    fn emit(&self, event: &CommentEvent) {
        self.shared.events.emit(event);
    }
}

impl fmt::Debug for CommentViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentViewModel")
            .field("comments", &self.len())
            .finish_non_exhaustive()
    }
}

/// Millisecond precision, so local timestamps survive a trip over the wire.
fn now() -> Time {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
#[path = "tests/view_model_tests.rs"]
mod tests;
