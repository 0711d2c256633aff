//! Action-Source Classifier
//!
//! Decides whether a raw player callback was caused by the reconciliation
//! engine (suppress it) or by the user (relay it to the room).
//!
//! The engine arms a guard immediately *before* each player mutation it
//! performs on behalf of an inbound event, tagged with the epoch of that
//! event. Guards are consumed oldest first, one per callback. There is no
//! timer: a guard stays armed until a callback arrives for it.
//!
//! When a superseding event mutates the player before the callback of an
//! earlier mutation has arrived, both guards are outstanding. The epoch
//! returned with each suppression tells the engine which mutation the
//! callback belongs to.

use std::collections::VecDeque;

use tracing::debug;

use crate::player::PlayerState;

/// Armed suppression, tagged with the engine epoch that armed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub epoch: u64,
}

/// Outcome of classifying one player callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Caused by the reconciliation mutation armed at `epoch`; never relayed
    Suppressed { epoch: u64 },
    /// User started playback; relay PLAY
    UserPlay,
    /// User paused; relay PAUSE
    UserPause,
    /// Buffering after a user interaction; hand the position to the debouncer
    PossibleSeek,
    /// Nothing to do
    Ignored,
}

#[derive(Debug, Default)]
pub struct ActionSourceClassifier {
    /// Outstanding guards, oldest first
    guards: VecDeque<Guard>,
    user_action_pending: bool,
    /// Last Playing/Paused state observed, guarded or not
    last_settled: Option<PlayerState>,
}

impl ActionSourceClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a guard before a reconciliation mutation
    pub fn arm(&mut self, epoch: u64) {
        self.guards.push_back(Guard { epoch });
    }

    /// Withdraw the most recent guard when its mutation was never issued
    pub fn cancel_latest(&mut self) {
        self.guards.pop_back();
    }

    /// Drop every outstanding guard (transport loss, new media)
    pub fn disarm(&mut self) {
        self.guards.clear();
    }

    /// Oldest outstanding guard, the one the next callback consumes
    pub fn guard(&self) -> Option<Guard> {
        self.guards.front().copied()
    }

    pub fn outstanding(&self) -> usize {
        self.guards.len()
    }

    pub fn user_action_pending(&self) -> bool {
        self.user_action_pending
    }

    /// The user touched the player controls (scrubber drag, play button)
    pub fn note_user_interaction(&mut self) {
        self.user_action_pending = true;
    }

    /// Forget the settled state so the next Playing/Paused counts as a transition
    pub fn reset_settled(&mut self) {
        self.last_settled = None;
    }

    /// Record the state a reconciliation mutation settles the player into
    ///
    /// A later re-report of that state (stall recovery after a guarded seek)
    /// is then not mistaken for a user transition.
    pub fn expect_settled(&mut self, state: PlayerState) {
        if state.is_settled() {
            self.last_settled = Some(state);
        }
    }

    /// Classify a raw player callback
    pub fn classify(&mut self, state: PlayerState) -> Classification {
        let previous = self.last_settled;
        if state.is_settled() {
            self.last_settled = Some(state);
        }

        if let Some(guard) = self.guards.pop_front() {
            self.user_action_pending = false;
            debug!("Suppressed {:?} callback (guard epoch {})", state, guard.epoch);
            return Classification::Suppressed { epoch: guard.epoch };
        }

        match state {
            PlayerState::Playing | PlayerState::Paused => {
                if previous == Some(state) {
                    // Recovery from buffering into the state we were already in
                    return Classification::Ignored;
                }
                self.user_action_pending = false;
                if state == PlayerState::Playing {
                    Classification::UserPlay
                } else {
                    Classification::UserPause
                }
            }
            PlayerState::Buffering if self.user_action_pending => {
                self.user_action_pending = false;
                Classification::PossibleSeek
            }
            _ => Classification::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_consumed_by_next_callback_only() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.arm(4);

        assert_eq!(
            classifier.classify(PlayerState::Playing),
            Classification::Suppressed { epoch: 4 }
        );
        assert!(classifier.guard().is_none());

        // Next user pause is a real transition
        assert_eq!(classifier.classify(PlayerState::Paused), Classification::UserPause);
    }

    #[test]
    fn test_guard_clears_pending_user_action() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.note_user_interaction();
        classifier.arm(1);

        classifier.classify(PlayerState::Buffering);
        assert!(!classifier.user_action_pending());
    }

    #[test]
    fn test_user_transitions_reported_once() {
        let mut classifier = ActionSourceClassifier::new();

        assert_eq!(classifier.classify(PlayerState::Playing), Classification::UserPlay);
        assert_eq!(classifier.classify(PlayerState::Buffering), Classification::Ignored);
        // Resuming from a stall is not a new PLAY
        assert_eq!(classifier.classify(PlayerState::Playing), Classification::Ignored);
        assert_eq!(classifier.classify(PlayerState::Paused), Classification::UserPause);
    }

    #[test]
    fn test_buffering_after_interaction_is_possible_seek() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.classify(PlayerState::Playing);

        classifier.note_user_interaction();
        assert_eq!(classifier.classify(PlayerState::Buffering), Classification::PossibleSeek);
        assert!(!classifier.user_action_pending());

        // Unprompted stall is not a seek
        assert_eq!(classifier.classify(PlayerState::Buffering), Classification::Ignored);
    }

    #[test]
    fn test_guarded_callback_still_updates_settled_state() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.arm(2);
        classifier.classify(PlayerState::Paused);

        // Player re-reports Paused after a guarded seek: no PAUSE echo
        assert_eq!(classifier.classify(PlayerState::Paused), Classification::Ignored);
    }

    #[test]
    fn test_expected_state_is_not_a_transition() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.arm(3);
        classifier.expect_settled(PlayerState::Paused);

        // Guard consumed by the seek's buffering, then the player re-reports Paused
        assert_eq!(
            classifier.classify(PlayerState::Buffering),
            Classification::Suppressed { epoch: 3 }
        );
        assert_eq!(classifier.classify(PlayerState::Paused), Classification::Ignored);
        assert_eq!(classifier.classify(PlayerState::Playing), Classification::UserPlay);
    }

    #[test]
    fn test_guards_consumed_oldest_first() {
        let mut classifier = ActionSourceClassifier::new();
        // Deferred play at epoch 5, then a PAUSE at epoch 6 before any callback
        classifier.arm(5);
        classifier.arm(6);
        assert_eq!(classifier.outstanding(), 2);

        assert_eq!(
            classifier.classify(PlayerState::Playing),
            Classification::Suppressed { epoch: 5 }
        );
        assert_eq!(
            classifier.classify(PlayerState::Paused),
            Classification::Suppressed { epoch: 6 }
        );
        assert!(classifier.guard().is_none());
        assert_eq!(classifier.classify(PlayerState::Playing), Classification::UserPlay);
    }

    #[test]
    fn test_cancel_latest_keeps_earlier_guard() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.arm(1);
        classifier.arm(2);
        classifier.cancel_latest();

        assert_eq!(classifier.guard(), Some(Guard { epoch: 1 }));
        assert_eq!(
            classifier.classify(PlayerState::Paused),
            Classification::Suppressed { epoch: 1 }
        );
        assert_eq!(classifier.outstanding(), 0);
    }

    #[test]
    fn test_reset_settled() {
        let mut classifier = ActionSourceClassifier::new();
        classifier.classify(PlayerState::Paused);
        classifier.reset_settled();
        assert_eq!(classifier.classify(PlayerState::Paused), Classification::UserPause);
    }
}
