//! Schedule generation boundary.
//!
//! The algorithm that invents a day's activities lives outside this crate
//! (typically an LLM call). The pipeline only needs a trait to call it through
//! and a result shape that can flag "today already had a schedule", which the
//! apply step must treat as a no-op.

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::goals::NewGoal;

/// Result of one generation run.
#[derive(Debug, Default)]
pub struct GeneratedSchedule {
    pub items: Vec<NewGoal>,
    /// Set when the generator found today's schedule already in place.
    /// Applying such a result must not create anything.
    pub already_exists: bool,
}

#[async_trait]
pub trait ScheduleGenerator: Send + Sync {
    async fn generate(
        &self,
        user_id: &str,
        scope: &str,
        options: &GenerationConfig,
    ) -> anyhow::Result<GeneratedSchedule>;
}

/// Generator used when auto-generation has no backing model: produces nothing,
/// so the agenda only ever holds manually created goals.
#[derive(Debug, Default)]
pub struct NullGenerator;

#[async_trait]
impl ScheduleGenerator for NullGenerator {
    async fn generate(
        &self,
        _user_id: &str,
        _scope: &str,
        _options: &GenerationConfig,
    ) -> anyhow::Result<GeneratedSchedule> {
        Ok(GeneratedSchedule {
            items: Vec::new(),
            already_exists: true,
        })
    }
}
