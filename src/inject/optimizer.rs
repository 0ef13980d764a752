//! Injection gatekeeper.
//!
//! Stateful filter in front of the template engine: suppresses tech/command
//! traffic, near-duplicate repeats inside a cooldown window, and (with a coin
//! flip) casual chatter, and enforces a confidence floor. Everything it allows
//! is recorded so the next decision can see what this user was just told.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::intent::Intent;

const CONFIDENCE_FLOOR: f64 = 0.4;

#[derive(Debug, Clone)]
struct InjectRecord {
    last_time: Instant,
    activity: String,
    intent: Intent,
    count: u32,
}

/// Why an injection was denied. Carried in logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    TechOrCommand,
    NoActivity,
    Cooldown,
    CasualRoll,
    LowConfidence,
}

pub struct InjectOptimizer {
    history: HashMap<String, InjectRecord>,
    ttl: Duration,
    casual_probability: f64,
    rng: StdRng,
    last_sweep: Instant,
}

impl InjectOptimizer {
    pub fn new(ttl: Duration, casual_probability: f64) -> Self {
        Self::with_rng(ttl, casual_probability, StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_rng(ttl: Duration, casual_probability: f64, rng: StdRng) -> Self {
        Self {
            history: HashMap::new(),
            ttl,
            casual_probability,
            rng,
            last_sweep: Instant::now(),
        }
    }

    /// Fixed-order decision: tech/command deny, no-activity deny for
    /// non-queries, cooldown on exact (activity, intent) repeats, casual coin
    /// flip, confidence floor, then allow.
    ///
    /// Future queries are exempt from the cooldown: asking about the evening
    /// right after asking about the afternoon is a different question even
    /// though user and activity match.
    pub fn should_inject(
        &mut self,
        user_id: &str,
        intent: Intent,
        current_activity: Option<&str>,
        confidence: f64,
    ) -> Result<(), DenyReason> {
        self.maybe_sweep();

        if matches!(intent, Intent::TechQuestion | Intent::Command) {
            debug!(user_id, intent = intent.as_str(), "Deny: tech/command");
            return Err(DenyReason::TechOrCommand);
        }

        if current_activity.is_none()
            && !matches!(intent, Intent::QueryCurrent | Intent::QueryFuture)
        {
            debug!(user_id, "Deny: no current activity and not a query");
            return Err(DenyReason::NoActivity);
        }

        if intent != Intent::QueryFuture {
            if let Some(record) = self.history.get(user_id) {
                let same_activity = current_activity == Some(record.activity.as_str());
                if record.last_time.elapsed() < self.ttl
                    && same_activity
                    && record.intent == intent
                {
                    debug!(user_id, "Deny: duplicate within cooldown");
                    return Err(DenyReason::Cooldown);
                }
            }
        }

        if intent == Intent::CasualChat && self.rng.gen::<f64>() > self.casual_probability {
            debug!(user_id, "Deny: casual roll");
            return Err(DenyReason::CasualRoll);
        }

        if confidence < CONFIDENCE_FLOOR {
            debug!(user_id, confidence, "Deny: confidence below floor");
            return Err(DenyReason::LowConfidence);
        }

        debug!(user_id, intent = intent.as_str(), confidence, "Allow injection");
        Ok(())
    }

    /// Record a delivered injection for cooldown comparisons.
    pub fn record_injection(&mut self, user_id: &str, activity: &str, intent: Intent) {
        let entry = self
            .history
            .entry(user_id.to_string())
            .and_modify(|r| {
                r.last_time = Instant::now();
                r.activity = activity.to_string();
                r.intent = intent;
                r.count += 1;
            })
            .or_insert_with(|| InjectRecord {
                last_time: Instant::now(),
                activity: activity.to_string(),
                intent,
                count: 1,
            });
        debug!(user_id, activity, count = entry.count, "Recorded injection");
    }

    pub fn total_injections(&self) -> u32 {
        self.history.values().map(|r| r.count).sum()
    }

    /// Injections delivered to one user since their history was last swept.
    pub fn user_injections(&self, user_id: &str) -> u32 {
        self.history.get(user_id).map_or(0, |r| r.count)
    }

    // Drop per-user history idle for more than twice the TTL. Triggered
    // opportunistically from should_inject, at most once per TTL.
    fn maybe_sweep(&mut self) {
        if self.last_sweep.elapsed() < self.ttl {
            return;
        }
        let horizon = self.ttl * 2;
        let before = self.history.len();
        self.history.retain(|_, r| r.last_time.elapsed() <= horizon);
        if self.history.len() < before {
            debug!(removed = before - self.history.len(), "Swept stale inject history");
        }
        self.last_sweep = Instant::now();
    }
}
