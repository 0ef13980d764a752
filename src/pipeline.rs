//! Per-message injection pipeline.
//!
//! Entry point is [`InjectPipeline::handle_message`]: it ensures today's
//! schedule exists (generating it at most once per day), resolves the current
//! snapshot, runs the configured decision mode and, when allowed, prepends the
//! rendered agenda text to the envelope's prompt. Failures anywhere degrade to
//! "no injection"; the message flow never sees an error from here.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, InjectMode};
use crate::generator::ScheduleGenerator;
use crate::goals::{GoalStore, GLOBAL_SCOPE};
use crate::inject::{
    ActivityStateAnalyzer, ContextCache, Intent, IntentClassifier, InjectOptimizer, TimeRange,
};
use crate::inject::TemplateEngine;
use crate::message::MessageEnvelope;
use crate::schedule::{ScheduleResolver, ScheduleSnapshot, UpcomingActivity};

pub struct InjectPipeline {
    config: AppConfig,
    store: GoalStore,
    resolver: ScheduleResolver,
    generator: Arc<dyn ScheduleGenerator>,
    classifier: IntentClassifier,
    analyzer: ActivityStateAnalyzer,
    templates: TemplateEngine,
    optimizer: Mutex<InjectOptimizer>,
    context: Mutex<ContextCache>,
    // Guards check-then-generate; holds the last date the check ran
    generation_check: Mutex<Option<NaiveDate>>,
}

impl InjectPipeline {
    pub fn new(
        config: AppConfig,
        store: GoalStore,
        generator: Arc<dyn ScheduleGenerator>,
    ) -> Self {
        let clock = crate::clock::Clock::new(&config.schedule.timezone);
        let resolver = ScheduleResolver::new(
            store.clone(),
            clock,
            Duration::from_secs(config.schedule.cache_ttl_secs),
            config.schedule.cache_max_size,
        );
        let optimizer = InjectOptimizer::new(
            Duration::from_secs(config.inject.cooldown_ttl_secs),
            config.inject.casual_inject_probability,
        );
        let context = ContextCache::new(
            config.inject.context_max_turns,
            Duration::from_secs(config.inject.context_ttl_secs),
        );
        Self {
            config,
            store,
            resolver,
            generator,
            classifier: IntentClassifier::new(),
            analyzer: ActivityStateAnalyzer::new(),
            templates: TemplateEngine::new(),
            optimizer: Mutex::new(optimizer),
            context: Mutex::new(context),
            generation_check: Mutex::new(None),
        }
    }

    pub fn resolver(&self) -> &ScheduleResolver {
        &self.resolver
    }

    /// Run the full decision chain for one message. Returns whether text was
    /// injected; the envelope's prompt is untouched unless it was.
    pub async fn handle_message(&self, envelope: &mut MessageEnvelope) -> bool {
        let Some(scope) = envelope.scope().map(str::to_string) else {
            return false;
        };
        let user_id = envelope.user_id().to_string();
        let user_message = envelope.user_message().unwrap_or_default();

        if self.config.schedule.auto_generate {
            self.ensure_today_schedule(&user_id).await;
        }

        let snapshot = self.resolver.resolve(&scope).await;

        match self.decide(&user_id, &user_message, &snapshot).await {
            Some(text) => {
                envelope.prepend_to_prompt(&text);
                true
            }
            None => false,
        }
    }

    /// Mode dispatch. Records the turn in the context cache on every path.
    async fn decide(
        &self,
        user_id: &str,
        user_message: &str,
        snapshot: &ScheduleSnapshot,
    ) -> Option<String> {
        let current = snapshot.current.as_ref();
        let current_name = current.map(|c| c.name.as_str());

        let continuation = {
            let context = self.context.lock().await;
            context.should_continue_inject(user_id, current_name)
        };

        let (intent, confidence) = self.classifier.classify(user_message);

        let content = match self.config.inject.mode {
            InjectMode::Smart => self.decide_smart(intent, user_message, snapshot),
            InjectMode::Rule => {
                self.decide_rule(user_id, intent, confidence, user_message, snapshot, continuation.is_some())
                    .await
            }
            InjectMode::Traditional => current.map(|c| {
                self.templates.render_traditional(
                    &c.name,
                    &c.description,
                    &upcoming_pairs(&snapshot.upcoming),
                )
            }),
        };

        {
            let mut context = self.context.lock().await;
            context.add_turn(
                user_id,
                user_message,
                Some(intent),
                content.is_some(),
                current_name,
            );
        }

        if let Some(reason) = continuation {
            debug!(user_id, ?reason, "Continuation override was active");
        }
        content
    }

    /// Soft injection: hand the agenda to the LLM as optional context with
    /// usage guidance, and let it decide. Only tech/command traffic is
    /// filtered out up front.
    fn decide_smart(
        &self,
        intent: Intent,
        user_message: &str,
        snapshot: &ScheduleSnapshot,
    ) -> Option<String> {
        if matches!(intent, Intent::TechQuestion | Intent::Command) {
            debug!("Smart mode: tech/command message, skipping");
            return None;
        }
        let current = snapshot.current.as_ref()?;

        let mut lines = vec![
            "[optional context - bot's current agenda]".to_string(),
            if current.description.is_empty() {
                format!("now: {}", current.name)
            } else {
                format!("now: {} ({})", current.name, current.description)
            },
        ];
        if !snapshot.upcoming.is_empty() {
            lines.push("coming up:".to_string());
            let cap = self.config.inject.max_future_activities.unwrap_or(3);
            for activity in snapshot.upcoming.iter().take(cap) {
                lines.push(format!("  {} - {}", activity.start, activity.name));
            }
        }
        lines.push(String::new());

        let guidance = match intent {
            Intent::QueryCurrent => {
                "The user is asking about the current state; answer truthfully from the agenda."
            }
            Intent::QueryFuture => {
                "The user is asking about upcoming plans; introduce them naturally."
            }
            _ => {
                "The agenda above is reference only. Mention it if relevant to the user's \
                 message, otherwise ignore it entirely; never steer the conversation toward it."
            }
        };
        lines.push(guidance.to_string());
        lines.push(String::new());
        lines.push("---".to_string());

        info!(activity = %current.name, "Smart injection");
        Some(lines.join("\n"))
    }

    /// Full rule pipeline: optimizer gate (unless a continuation override is
    /// in effect), state analysis, time-range filtering, template rendering.
    async fn decide_rule(
        &self,
        user_id: &str,
        intent: Intent,
        confidence: f64,
        user_message: &str,
        snapshot: &ScheduleSnapshot,
        continuation: bool,
    ) -> Option<String> {
        let current = snapshot.current.as_ref();
        let current_name = current.map(|c| c.name.as_str());

        if !continuation {
            let mut optimizer = self.optimizer.lock().await;
            if let Err(reason) = optimizer.should_inject(user_id, intent, current_name, confidence)
            {
                debug!(user_id, ?reason, "Rule mode: injection denied");
                return None;
            }
        }

        let mut upcoming = snapshot.upcoming.clone();
        if intent == Intent::QueryFuture {
            if let Some(range) = self.classifier.extract_time_range(user_message) {
                upcoming = filter_by_time_range(upcoming, range);
            }
        }

        let now = self.resolver.clock().minute_of_day();
        let rendered = {
            let mut rng = rand::thread_rng();
            let state_text = current.and_then(|c| {
                self.analyzer
                    .analyze(c.start_minutes, c.end_minutes, now, &c.activity_type, &mut rng)
                    .1
            });
            self.templates.render(
                intent,
                current_name,
                state_text.as_deref(),
                &upcoming_pairs(&upcoming),
                self.config.inject.max_future_activities,
                &mut rng,
            )
        };

        if rendered.is_some() {
            let mut optimizer = self.optimizer.lock().await;
            optimizer.record_injection(user_id, current_name.unwrap_or(""), intent);
            info!(user_id, intent = intent.as_str(), confidence, "Rule injection");
        }
        rendered
    }

    /// Once-per-day schedule check. The lock makes check-then-generate atomic
    /// across concurrent messages; whichever caller gets in first does the
    /// work, everyone after sees the date stamp and returns immediately.
    async fn ensure_today_schedule(&self, user_id: &str) {
        let today = self.resolver.clock().today();
        let mut checked = self.generation_check.lock().await;
        if *checked == Some(today) {
            return;
        }

        if !self.today_schedule_exists(today).await {
            info!("No schedule for today yet, generating");
            self.generate_today(user_id).await;
        }
        // Stamp the date whether or not generation succeeded; one attempt a day
        *checked = Some(today);
    }

    async fn today_schedule_exists(&self, today: NaiveDate) -> bool {
        let goals = self.store.active(Some(GLOBAL_SCOPE)).await;
        goals.iter().any(|g| {
            g.time_window().is_some() && self.resolver.clock().date_of(g.created_at) == today
        })
    }

    /// Run the generator with a timeout, actively cancelling the in-flight
    /// task when it overruns. A result flagged "already exists" is a no-op.
    async fn generate_today(&self, user_id: &str) {
        let generator = Arc::clone(&self.generator);
        let options = self.config.schedule.generation.clone();
        let user = user_id.to_string();
        let mut task = tokio::spawn(async move {
            generator.generate(&user, GLOBAL_SCOPE, &options).await
        });

        let timeout = Duration::from_secs(self.config.schedule.generation_timeout_secs);
        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                error!("Schedule generation task failed: {join_err}");
                return;
            }
            Err(_) => {
                task.abort();
                error!(timeout_secs = timeout.as_secs(), "Schedule generation timed out");
                return;
            }
        };

        match result {
            Ok(schedule) if schedule.already_exists => {
                info!("Today's schedule already exists, skipping apply");
            }
            Ok(schedule) if schedule.items.is_empty() => {
                warn!("Generator returned an empty schedule");
            }
            Ok(schedule) => match self.store.create_batch(schedule.items).await {
                Ok(created) => {
                    info!(count = created.len(), "Applied generated schedule");
                    self.resolver.invalidate();
                }
                Err(e) => error!("Failed to apply generated schedule: {e}"),
            },
            Err(e) => error!("Schedule generation failed: {e}"),
        }
    }
}

fn upcoming_pairs(upcoming: &[UpcomingActivity]) -> Vec<(String, String)> {
    upcoming
        .iter()
        .map(|a| (a.start.clone(), a.name.clone()))
        .collect()
}

/// Keep only activities starting within the asked-about hours.
fn filter_by_time_range(
    upcoming: Vec<UpcomingActivity>,
    range: TimeRange,
) -> Vec<UpcomingActivity> {
    upcoming
        .into_iter()
        .filter(|a| range.contains_minute(a.start_minutes))
        .collect()
}
