use std::collections::HashMap;

use shared::domain::CommentId;
use tracing::{debug, warn};

use crate::model::Comment;

/// Keyed table of comment records. Only the view-model holds it mutably.
#[derive(Debug, Default)]
pub struct CommentStore {
    comments: HashMap<CommentId, Comment>,
    arrival: Vec<CommentId>,
    /// Replies that arrived before their parent, keyed by the missing parent.
    orphans: HashMap<CommentId, Vec<CommentId>>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.get(id)
    }

    pub fn snapshot(&self, id: &CommentId) -> Option<Comment> {
        self.comments.get(id).cloned()
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.comments.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// All records in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Comment> + '_ {
        self.arrival.iter().filter_map(|id| self.comments.get(id))
    }

    pub fn top_level(&self) -> Vec<&Comment> {
        self.iter().filter(|c| c.is_top_level()).collect()
    }

    /// Direct replies of `id` in arrival order.
    pub fn children_of(&self, id: &CommentId) -> Vec<&Comment> {
        self.comments
            .get(id)
            .map(|parent| {
                parent
                    .child_ids
                    .iter()
                    .filter_map(|child| self.comments.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Inserts `record`, or merges it into the stored record with the same id.
    ///
    /// On merge the stored parent, reply list and unmapped wire keys are kept;
    /// replies listed by `record` that the store does not know yet are
    /// appended.
    pub fn upsert(&mut self, mut record: Comment) {
        let id = record.id.clone();
        if let Some(existing) = self.comments.get_mut(&id) {
            if record.parent_id != existing.parent_id {
                warn!(
                    comment_id = %id,
                    "ignoring parent change on existing comment"
                );
            }
            let mut child_ids = std::mem::take(&mut existing.child_ids);
            for child in record.child_ids.drain(..) {
                if !child_ids.contains(&child) {
                    child_ids.push(child);
                }
            }
            let mut extra = std::mem::take(&mut existing.extra);
            extra.extend(std::mem::take(&mut record.extra));

            record.parent_id = existing.parent_id.take();
            record.child_ids = child_ids;
            record.extra = extra;
            *existing = record;
            return;
        }

        if let Some(waiting) = self.orphans.remove(&id) {
            for child in waiting {
                if !record.child_ids.contains(&child) {
                    record.child_ids.push(child);
                }
            }
        }
        let parent = record.parent_id.clone();
        self.arrival.push(id.clone());
        self.comments.insert(id.clone(), record);
        if let Some(parent) = parent {
            self.register_child(&parent, &id);
        }
    }

    fn register_child(&mut self, parent: &CommentId, child: &CommentId) {
        match self.comments.get_mut(parent) {
            Some(parent) => {
                if !parent.child_ids.contains(child) {
                    parent.child_ids.push(child.clone());
                }
            }
            None => {
                warn!(
                    comment_id = %child,
                    parent_id = %parent,
                    "parent not loaded yet, parking reply"
                );
                let waiting = self.orphans.entry(parent.clone()).or_default();
                if !waiting.contains(child) {
                    waiting.push(child.clone());
                }
            }
        }
    }

    /// Moves the record at `old` to `new`, keeping its slot in the parent's
    /// reply list. If `new` is already stored, `old` is folded into it.
    pub fn rekey(&mut self, old: &CommentId, new: &CommentId) -> bool {
        if old == new {
            return self.comments.contains_key(old);
        }
        let Some(mut record) = self.comments.remove(old) else {
            debug!(comment_id = %old, "rekey of unknown comment ignored");
            return false;
        };

        for child in &record.child_ids {
            if let Some(child) = self.comments.get_mut(child) {
                child.parent_id = Some(new.clone());
            }
        }

        if self.comments.contains_key(new) {
            warn!(old_id = %old, new_id = %new, "canonical id already stored, folding record");
            self.unregister(&record);
            self.arrival.retain(|id| id != old);
            let children = std::mem::take(&mut record.child_ids);
            if let Some(existing) = self.comments.get_mut(new) {
                for child in children {
                    if !existing.child_ids.contains(&child) {
                        existing.child_ids.push(child);
                    }
                }
            }
            return true;
        }

        if let Some(parent) = record.parent_id.as_ref() {
            if let Some(parent) = self.comments.get_mut(parent) {
                for child in parent.child_ids.iter_mut().filter(|c| **c == *old) {
                    *child = new.clone();
                }
            }
        }
        for id in self.arrival.iter_mut().filter(|id| **id == *old) {
            *id = new.clone();
        }
        record.id = new.clone();
        self.comments.insert(new.clone(), record);
        true
    }

    /// Physically removes an unconfirmed record. Confirmed comments are only
    /// ever tombstoned.
    pub fn discard(&mut self, id: &CommentId) -> Option<Comment> {
        let record = self.comments.remove(id)?;
        self.arrival.retain(|a| a != id);
        self.unregister(&record);
        Some(record)
    }

    fn unregister(&mut self, record: &Comment) {
        let Some(parent) = record.parent_id.as_ref() else {
            return;
        };
        if let Some(parent) = self.comments.get_mut(parent) {
            parent.child_ids.retain(|c| *c != record.id);
        }
        if let Some(waiting) = self.orphans.get_mut(parent) {
            waiting.retain(|c| *c != record.id);
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
