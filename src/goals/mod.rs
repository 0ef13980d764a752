//! Goal entity model.
//!
//! A goal is the durable unit of planning: either a long-running objective or
//! a generated daily-schedule activity (the latter carries a `time_window` in
//! its parameter/condition maps).

pub mod store;

pub use store::{GoalStore, StoreError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Scope id for agenda-wide goals shared by every chat.
pub const GLOBAL_SCOPE: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: Uuid,
    pub name: String,
    pub description: String,
    /// Category tag, e.g. "study", "meal", or a custom string.
    pub goal_type: String,
    pub priority: GoalPriority,
    pub creator_id: String,
    /// Owning chat/scope id; [`GLOBAL_SCOPE`] for agenda-wide goals.
    pub chat_id: String,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default)]
    pub conditions: Map<String, Value>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Progress percentage, clamped to 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_count: u32,
}

/// Fields supplied when creating a goal; identity and lifecycle fields are
/// filled in by the store.
#[derive(Debug, Clone)]
pub struct NewGoal {
    pub name: String,
    pub description: String,
    pub goal_type: String,
    pub priority: GoalPriority,
    pub creator_id: String,
    pub chat_id: String,
    pub deadline: Option<DateTime<Utc>>,
    pub interval_seconds: Option<u64>,
    pub conditions: Map<String, Value>,
    pub parameters: Map<String, Value>,
}

impl NewGoal {
    pub fn new(name: impl Into<String>, goal_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            goal_type: goal_type.into(),
            priority: GoalPriority::Medium,
            creator_id: "system".to_string(),
            chat_id: GLOBAL_SCOPE.to_string(),
            deadline: None,
            interval_seconds: None,
            conditions: Map::new(),
            parameters: Map::new(),
        }
    }
}

/// A single typed partial update. Applied in order by
/// [`GoalStore::update`]; replaces attribute-by-name mutation so that an
/// unknown field is unrepresentable.
#[derive(Debug, Clone)]
pub enum GoalUpdate {
    Name(String),
    Description(String),
    GoalType(String),
    Priority(GoalPriority),
    Status(GoalStatus),
    Deadline(Option<DateTime<Utc>>),
    IntervalSeconds(Option<u64>),
    Progress(u8),
    Conditions(Map<String, Value>),
    Parameters(Map<String, Value>),
}

impl Goal {
    pub(crate) fn create(draft: NewGoal) -> Self {
        Self {
            goal_id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            goal_type: draft.goal_type,
            priority: draft.priority,
            creator_id: draft.creator_id,
            chat_id: draft.chat_id,
            status: GoalStatus::Active,
            created_at: Utc::now(),
            deadline: draft.deadline,
            interval_seconds: draft.interval_seconds,
            conditions: draft.conditions,
            parameters: draft.parameters,
            progress: 0,
            last_executed_at: None,
            execution_count: 0,
        }
    }

    pub(crate) fn apply(&mut self, update: &GoalUpdate) {
        match update {
            GoalUpdate::Name(v) => self.name = v.clone(),
            GoalUpdate::Description(v) => self.description = v.clone(),
            GoalUpdate::GoalType(v) => self.goal_type = v.clone(),
            GoalUpdate::Priority(v) => self.priority = *v,
            GoalUpdate::Status(v) => self.status = *v,
            GoalUpdate::Deadline(v) => self.deadline = *v,
            GoalUpdate::IntervalSeconds(v) => self.interval_seconds = *v,
            GoalUpdate::Progress(v) => self.progress = (*v).min(100),
            GoalUpdate::Conditions(v) => self.conditions = v.clone(),
            GoalUpdate::Parameters(v) => self.parameters = v.clone(),
        }
    }

    /// Stored time window, if any. Legacy convention: `parameters` takes
    /// precedence over `conditions` when both carry one.
    pub fn time_window(&self) -> Option<Vec<i64>> {
        let raw = self
            .parameters
            .get("time_window")
            .or_else(|| self.conditions.get("time_window"))?;
        let arr = raw.as_array()?;
        arr.iter().map(|v| v.as_i64()).collect()
    }

    /// Whether a recurring goal is due: active, past its interval since the
    /// last execution, and not past its deadline.
    pub fn should_execute_now(&self) -> bool {
        if self.status != GoalStatus::Active {
            return false;
        }
        if let (Some(interval), Some(last)) = (self.interval_seconds, self.last_executed_at) {
            if Utc::now() < last + Duration::seconds(interval as i64) {
                return false;
            }
        }
        if let Some(deadline) = self.deadline {
            if Utc::now() > deadline {
                return false;
            }
        }
        true
    }

    pub(crate) fn mark_executed(&mut self) {
        self.last_executed_at = Some(Utc::now());
        self.execution_count += 1;
    }

    /// Human-readable one-goal summary for status listings.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("[{:?}] {}", self.status, self.name),
            format!("  id: {}", &self.goal_id.to_string()[..8]),
            format!("  scope: {}", self.chat_id),
            format!("  priority: {:?}", self.priority),
            format!("  progress: {}%", self.progress),
            format!("  executions: {}", self.execution_count),
        ];
        if let Some(deadline) = self.deadline {
            let left = deadline - Utc::now();
            if left > Duration::zero() {
                lines.push(format!(
                    "  time left: {}d {}h",
                    left.num_days(),
                    left.num_hours() % 24
                ));
            } else {
                lines.push("  overdue".to_string());
            }
        }
        if let Some(interval) = self.interval_seconds {
            let hours = interval / 3600;
            let minutes = (interval % 3600) / 60;
            if hours > 0 {
                lines.push(format!("  repeats: every {}h{}m", hours, minutes));
            } else {
                lines.push(format!("  repeats: every {}m", minutes));
            }
        }
        lines.join("\n")
    }
}
