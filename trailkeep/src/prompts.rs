//! User-facing prompts and notifications.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use futures::future::{self, BoxFuture, FutureExt};
use trailcore::RouteSummary;

use crate::position::PositionError;

/// Answer to the save-or-discard prompt shown on stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveDecision {
    /// Save under the given name (empty means a generated name)
    Saved(String),
    Discarded,
    /// Keep the route in memory; capture can resume
    Cancelled,
}

/// Dismissible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PositionPermissionDenied,
    PositionTimeout,
    PositionUnavailable,
    /// Save failed on every backend; the route is still in memory
    SaveFailed(String),
}

impl From<PositionError> for Notice {
    fn from(error: PositionError) -> Self {
        match error {
            PositionError::PermissionDenied => Notice::PositionPermissionDenied,
            PositionError::Timeout => Notice::PositionTimeout,
            PositionError::Unavailable => Notice::PositionUnavailable,
        }
    }
}

/// UI collaborator for prompts and notifications.
pub trait Prompter: Send + Sync {
    fn confirm_save(&self, summary: RouteSummary) -> BoxFuture<'static, SaveDecision>;

    /// Offer an unsaved route found at startup. `true` restores it.
    fn offer_restore(&self, summary: RouteSummary) -> BoxFuture<'static, bool>;

    fn notify(&self, notice: Notice);
}

/// Prompter with queued answers; records everything it was shown.
///
/// When a queue runs dry the answer is `Cancelled` / `false`.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    save_answers: Mutex<VecDeque<SaveDecision>>,
    restore_answers: Mutex<VecDeque<bool>>,
    shown: Mutex<Vec<RouteSummary>>,
    notices: Mutex<Vec<Notice>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_save(self, decision: SaveDecision) -> Self {
        lock(&self.save_answers).push_back(decision);
        self
    }

    pub fn answer_restore(self, restore: bool) -> Self {
        lock(&self.restore_answers).push_back(restore);
        self
    }

    /// Summaries shown by either prompt, in order.
    pub fn shown(&self) -> Vec<RouteSummary> {
        lock(&self.shown).clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Prompter for ScriptedPrompter {
    fn confirm_save(&self, summary: RouteSummary) -> BoxFuture<'static, SaveDecision> {
        lock(&self.shown).push(summary);
        let decision = lock(&self.save_answers)
            .pop_front()
            .unwrap_or(SaveDecision::Cancelled);
        future::ready(decision).boxed()
    }

    fn offer_restore(&self, summary: RouteSummary) -> BoxFuture<'static, bool> {
        lock(&self.shown).push(summary);
        let restore = lock(&self.restore_answers).pop_front().unwrap_or(false);
        future::ready(restore).boxed()
    }

    fn notify(&self, notice: Notice) {
        log::info!("[ScriptedPrompter] Notice: {:?}", notice);
        lock(&self.notices).push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RouteSummary {
        RouteSummary::of(&[], 0.0, 0, None)
    }

    #[tokio::test]
    async fn test_answers_in_order_then_default() {
        let prompter = ScriptedPrompter::new()
            .answer_save(SaveDecision::Discarded)
            .answer_save(SaveDecision::Saved("Hill".into()))
            .answer_restore(true);

        assert_eq!(prompter.confirm_save(summary()).await, SaveDecision::Discarded);
        assert_eq!(
            prompter.confirm_save(summary()).await,
            SaveDecision::Saved("Hill".into())
        );
        assert_eq!(prompter.confirm_save(summary()).await, SaveDecision::Cancelled);

        assert!(prompter.offer_restore(summary()).await);
        assert!(!prompter.offer_restore(summary()).await);
        assert_eq!(prompter.shown().len(), 5);
    }

    #[test]
    fn test_notice_from_position_error() {
        let prompter = ScriptedPrompter::new();
        prompter.notify(PositionError::Timeout.into());
        assert_eq!(prompter.notices(), vec![Notice::PositionTimeout]);
    }
}
