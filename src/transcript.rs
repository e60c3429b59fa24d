//! Turn-by-turn transcript of a live session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user/AI exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// What the user said
    pub user: String,
    /// What the AI said
    pub ai: String,
}

impl Turn {
    /// Create a turn from both sides
    pub fn new(user: impl Into<String>, ai: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ai: ai.into(),
        }
    }

    /// Whether neither side has said anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.ai.is_empty()
    }
}

/// A turn once the backend signalled completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedTurn {
    /// The finalized exchange
    pub turn: Turn,
    /// When the turn was finalized
    pub finished_at: DateTime<Utc>,
}

/// Accumulates streamed transcript fragments into turns
#[derive(Debug, Default)]
pub struct TurnTracker {
    log: Vec<FinishedTurn>,
    current: Turn,
}

impl TurnTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the user's speech
    pub fn push_user(&mut self, fragment: &str) {
        self.current.user.push_str(fragment);
    }

    /// Append a fragment of the AI's speech
    pub fn push_ai(&mut self, fragment: &str) {
        self.current.ai.push_str(fragment);
    }

    /// Finalize the in-progress turn
    ///
    /// Non-empty turns are appended to the log; both buffers are reset either
    /// way. Returns the appended turn, if any.
    pub fn complete_turn(&mut self) -> Option<&FinishedTurn> {
        let turn = std::mem::take(&mut self.current);
        if turn.is_empty() {
            return None;
        }

        self.log.push(FinishedTurn {
            turn,
            finished_at: Utc::now(),
        });
        self.log.last()
    }

    /// Finalized turns, oldest first
    #[must_use]
    pub fn log(&self) -> &[FinishedTurn] {
        &self.log
    }

    /// The turn still being spoken
    #[must_use]
    pub const fn current(&self) -> &Turn {
        &self.current
    }

    /// Finalized turns followed by the live one, for display
    ///
    /// The live turn is omitted while it is empty.
    #[must_use]
    pub fn view(&self) -> Vec<Turn> {
        let mut turns: Vec<Turn> = self.log.iter().map(|f| f.turn.clone()).collect();
        if !self.current.is_empty() {
            turns.push(self.current.clone());
        }
        turns
    }

    /// Drop the whole transcript
    pub fn clear(&mut self) {
        self.log.clear();
        self.current = Turn::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_finalization() {
        let mut tracker = TurnTracker::new();
        tracker.push_user("Hi");
        tracker.push_ai("Hello");

        let finished = tracker.complete_turn().unwrap();
        assert_eq!(finished.turn, Turn::new("Hi", "Hello"));

        assert_eq!(tracker.log().len(), 1);
        assert_eq!(tracker.current(), &Turn::default());
    }

    #[test]
    fn test_empty_turn_discarded() {
        let mut tracker = TurnTracker::new();
        assert!(tracker.complete_turn().is_none());
        assert!(tracker.log().is_empty());
    }

    #[test]
    fn test_fragments_accumulate_in_order() {
        let mut tracker = TurnTracker::new();
        tracker.push_user("What's ");
        tracker.push_ai("Let me");
        tracker.push_user("the time?");
        tracker.push_ai(" check.");

        assert_eq!(tracker.current(), &Turn::new("What's the time?", "Let me check."));
    }

    #[test]
    fn test_one_sided_turn_kept() {
        let mut tracker = TurnTracker::new();
        tracker.push_ai("Are you still there?");
        tracker.complete_turn();

        // A second completion with nothing new appends nothing
        tracker.complete_turn();

        assert_eq!(tracker.log().len(), 1);
        assert_eq!(tracker.log()[0].turn, Turn::new("", "Are you still there?"));
    }

    #[test]
    fn test_view_appends_live_turn() {
        let mut tracker = TurnTracker::new();
        tracker.push_user("one");
        tracker.complete_turn();
        tracker.push_user("two");

        assert_eq!(tracker.view(), vec![Turn::new("one", ""), Turn::new("two", "")]);

        tracker.clear();
        assert!(tracker.view().is_empty());
    }
}
