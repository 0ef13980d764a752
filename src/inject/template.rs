//! Injection text rendering.
//!
//! Per-intent template pools; a template is drawn uniformly at random so the
//! injected text does not read the same every time. A `None` entry in a pool
//! means "draw a blank": the casual pool is half blanks on top of the
//! optimizer's own probabilistic gate.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::intent::Intent;

const QUERY_CURRENT_TEMPLATES: &[Option<&str>] = &[
    Some("[current status] {activity_full}. Mention the current activity naturally when answering."),
    Some("[current status] {activity_full}. Feel free to say what you're up to in the reply."),
    Some("[current status] {activity_full}. Weave it into the reply naturally."),
    Some("[current status] {activity_full}. Bring it up in passing."),
];

const QUERY_FUTURE_TEMPLATES: &[Option<&str>] = &[
    Some("[current status] {activity_full}. [coming up] {future_activities}. Mention the upcoming plans naturally."),
    Some("[upcoming plans] {future_activities}. You can reference what's coming up in the answer."),
    Some("[today] now: {activity_full}, later: {future_activities}. Mention the plan casually."),
];

const CASUAL_TEMPLATES: &[Option<&str>] = &[
    Some("[note] {activity_full}. Can mention it offhand."),
    Some("[current] {activity_full}. Keep the reply light."),
    None,
    None,
];

#[derive(Debug, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    /// Render injectable text for an intent, or `None` to suppress.
    ///
    /// Tech/command intents never render. A missing current activity
    /// suppresses everything except future queries, which can still answer
    /// from the upcoming list alone.
    pub fn render(
        &self,
        intent: Intent,
        current_activity: Option<&str>,
        state_text: Option<&str>,
        upcoming: &[(String, String)],
        max_upcoming: Option<usize>,
        rng: &mut impl Rng,
    ) -> Option<String> {
        let pool: &[Option<&str>] = match intent {
            Intent::QueryCurrent => QUERY_CURRENT_TEMPLATES,
            Intent::QueryFuture => QUERY_FUTURE_TEMPLATES,
            Intent::CasualChat | Intent::Unknown => CASUAL_TEMPLATES,
            Intent::TechQuestion | Intent::Command => return None,
        };

        let template = (*pool.choose(rng)?)?;

        if current_activity.is_none() && intent != Intent::QueryFuture {
            debug!(intent = intent.as_str(), "No current activity, suppressing");
            return None;
        }

        let activity = current_activity.unwrap_or("taking a break");
        let activity_full = match state_text {
            Some(desc) if !desc.is_empty() => format!("{activity} ({desc})"),
            _ => activity.to_string(),
        };

        let rendered = template
            .replace("{activity_full}", &activity_full)
            .replace("{activity}", activity)
            .replace("{description}", state_text.unwrap_or(""))
            .replace(
                "{future_activities}",
                &format_upcoming(upcoming, max_upcoming),
            );
        debug!(intent = intent.as_str(), len = rendered.len(), "Rendered inject content");
        Some(rendered)
    }

    /// Fixed-template rendering for the traditional mode: no intent handling,
    /// always injects when there is a current activity.
    pub fn render_traditional(
        &self,
        current_activity: &str,
        description: &str,
        upcoming: &[(String, String)],
    ) -> String {
        let mut content = format!("[current status]\nCurrently {current_activity}");
        if !description.is_empty() {
            content.push_str(&format!(" ({description})"));
        }
        content.push_str("\nYou can mention what you're doing naturally, without making a point of it.");
        if let Some((time, name)) = upcoming.first() {
            content.push_str(&format!("\nAt {time} it's {name} next."));
        }
        content.push('\n');
        content
    }
}

/// "HH:MM name" lines, newline-joined, optionally capped.
fn format_upcoming(upcoming: &[(String, String)], max: Option<usize>) -> String {
    if upcoming.is_empty() {
        return "nothing else scheduled".to_string();
    }
    let shown = match max {
        Some(n) => &upcoming[..upcoming.len().min(n)],
        None => upcoming,
    };
    shown
        .iter()
        .map(|(time, name)| format!("{time} {name}"))
        .collect::<Vec<_>>()
        .join("\n")
}
