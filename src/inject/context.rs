//! Conversation context tracking.
//!
//! Keeps a short per-user window of recent turns so the pipeline can tell
//! "the user is still asking about the agenda" apart from an unrelated
//! message, and can proactively surface an activity change mid-conversation.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use super::intent::Intent;

// A follow-up only counts as part of an ongoing agenda discussion if it
// arrives this soon after the previous turn
const FOLLOW_UP_WINDOW: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Turn {
    pub message: String,
    pub at: Instant,
    pub intent: Option<Intent>,
    pub injected: bool,
    pub activity: Option<String>,
}

/// Why a continuation override fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueReason {
    /// One of the last turns was injected and the follow-up came quickly.
    OngoingTopic,
    /// The active activity differs from the one last shown to this user.
    ActivityChanged,
}

pub struct ContextCache {
    contexts: HashMap<String, VecDeque<Turn>>,
    max_turns: usize,
    ttl: Duration,
    last_sweep: Instant,
}

impl ContextCache {
    pub fn new(max_turns: usize, ttl: Duration) -> Self {
        Self {
            contexts: HashMap::new(),
            max_turns: max_turns.max(1),
            ttl,
            last_sweep: Instant::now(),
        }
    }

    pub fn add_turn(
        &mut self,
        user_id: &str,
        message: &str,
        intent: Option<Intent>,
        injected: bool,
        activity: Option<&str>,
    ) {
        let turns = self.contexts.entry(user_id.to_string()).or_default();
        if turns.len() == self.max_turns {
            turns.pop_front();
        }
        turns.push_back(Turn {
            message: message.to_string(),
            at: Instant::now(),
            intent,
            injected,
            activity: activity.map(str::to_string),
        });
        debug!(user_id, injected, "Recorded conversation turn");

        if self.last_sweep.elapsed() > SWEEP_INTERVAL {
            self.sweep();
        }
    }

    /// Whether injection should happen regardless of the optimizer: the user
    /// is mid-discussion about the agenda, or the activity changed since they
    /// last saw it. Returns `None` to defer to the normal path.
    pub fn should_continue_inject(
        &self,
        user_id: &str,
        current_activity: Option<&str>,
    ) -> Option<ContinueReason> {
        let recent = self.recent_turns(user_id, 2);

        if let Some(last) = recent.last() {
            if last.at.elapsed() <= FOLLOW_UP_WINDOW && recent.iter().any(|t| t.injected) {
                debug!(user_id, "Continuation: ongoing agenda topic");
                return Some(ContinueReason::OngoingTopic);
            }
        }

        let last_activity = recent.last().and_then(|t| t.activity.as_deref());
        if let (Some(last), Some(current)) = (last_activity, current_activity) {
            if last != current {
                debug!(user_id, last, current, "Continuation: activity changed");
                return Some(ContinueReason::ActivityChanged);
            }
        }

        None
    }

    /// Most recent non-expired turns, oldest first.
    pub fn recent_turns(&self, user_id: &str, count: usize) -> Vec<&Turn> {
        let Some(turns) = self.contexts.get(user_id) else {
            return Vec::new();
        };
        let live: Vec<&Turn> = turns.iter().filter(|t| t.at.elapsed() < self.ttl).collect();
        let skip = live.len().saturating_sub(count);
        live.into_iter().skip(skip).collect()
    }

    fn sweep(&mut self) {
        let ttl = self.ttl;
        self.contexts.retain(|_, turns| {
            turns.retain(|t| t.at.elapsed() < ttl);
            !turns.is_empty()
        });
        self.last_sweep = Instant::now();
    }
}
