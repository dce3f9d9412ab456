use std::cmp::Reverse;

use shared::domain::SortKey;

use crate::{config::CommentsOptions, model::Comment};

#[derive(Debug, Clone, Copy)]
pub struct CommentSorter {
    enable_upvoting: bool,
}

impl CommentSorter {
    pub fn new(options: &CommentsOptions) -> Self {
        Self::with_upvoting(options.enable_upvoting)
    }

    pub fn with_upvoting(enable_upvoting: bool) -> Self {
        Self { enable_upvoting }
    }

    /// Direct replies plus upvotes when upvoting is enabled.
    pub fn popularity(&self, comment: &Comment) -> u64 {
        let mut score = comment.reply_count() as u64;
        if self.enable_upvoting {
            score = score.saturating_add(comment.upvote_count);
        }
        score
    }

    /// Orders the top-level comments of `records`; replies are dropped since
    /// they always stay in arrival order under their parent. `Attachments`
    /// instead selects every live comment carrying attachments.
    pub fn sort(&self, records: impl IntoIterator<Item = Comment>, key: SortKey) -> Vec<Comment> {
        let mut selected: Vec<Comment> = match key {
            SortKey::Attachments => records
                .into_iter()
                .filter(|c| c.has_attachments() && !c.is_deleted)
                .collect(),
            _ => records.into_iter().filter(Comment::is_top_level).collect(),
        };
        self.sort_in_place(&mut selected, key);
        selected
    }

    /// Every comparison ends on the id, so the result does not depend on
    /// the stability of the sort.
    pub fn sort_in_place(&self, records: &mut [Comment], key: SortKey) {
        match key {
            SortKey::Popularity => records.sort_unstable_by(|a, b| {
                let key = |c: &Comment| (Reverse(self.popularity(c)), Reverse(c.created_at));
                key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id))
            }),
            SortKey::Oldest => {
                records.sort_unstable_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            }
            SortKey::Newest | SortKey::Attachments => records.sort_unstable_by(|a, b| {
                (Reverse(a.created_at), &a.id).cmp(&(Reverse(b.created_at), &b.id))
            }),
        }
    }
}

#[cfg(test)]
#[path = "tests/sorter_tests.rs"]
mod tests;
