//! Rule-based intent classification.
//!
//! Keyword scoring over lowercased message text. Single-word keywords match
//! on word boundaries (so "now" does not fire inside "know"); multi-word
//! phrases match as substrings. The classifier is stateless and cheap enough
//! to run on every message.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Asking what the bot is doing right now.
    QueryCurrent,
    /// Asking about upcoming plans.
    QueryFuture,
    CasualChat,
    TechQuestion,
    Command,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::QueryCurrent => "query_current",
            Intent::QueryFuture => "query_future",
            Intent::CasualChat => "casual_chat",
            Intent::TechQuestion => "tech_question",
            Intent::Command => "command",
            Intent::Unknown => "unknown",
        }
    }
}

/// A named time-of-day range the user asked about, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub name: &'static str,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeRange {
    /// Whether a minute-of-day start falls inside this range.
    pub fn contains_minute(&self, minute: u32) -> bool {
        self.start_hour * 60 <= minute && minute < self.end_hour * 60
    }
}

const CURRENT_KEYWORDS: &[&str] = &[
    "now",
    "right now",
    "currently",
    "at the moment",
    "this moment",
    "doing",
    "busy",
    "free",
    "available",
    "what are you doing",
    "what are you up to",
    "just",
    "just now",
    "where are you",
];

// Activity verbs used to catch state questions phrased around the activity
// itself ("weren't you eating?")
const ACTIVITY_VERBS: &[&str] = &[
    "eat", "eating", "sleep", "sleeping", "play", "playing", "chat", "chatting", "watch",
    "watching", "study", "studying", "write", "writing", "work", "working", "rest", "resting",
    "exercise", "exercising", "read", "reading", "gaming",
];

const FUTURE_KEYWORDS: &[&str] = &[
    "later",
    "next",
    "after",
    "afterwards",
    "soon",
    "tonight",
    "tomorrow",
    "this afternoon",
    "this evening",
    "afternoon",
    "evening",
    "plan",
    "plans",
    "planning",
    "schedule",
    "agenda",
    "going to",
    "gonna",
    "then",
    "up next",
];

const TECH_KEYWORDS: &[&str] = &[
    "how",
    "why",
    "what is",
    "error",
    "bug",
    "crash",
    "exception",
    "install",
    "configure",
    "config",
    "setup",
    "debug",
    "code",
    "script",
    "function",
    "database",
    "server",
    "api",
    "version",
    "update",
    "upgrade",
    "compatible",
];

const CASUAL_KEYWORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "yo",
    "good morning",
    "good night",
    "goodnight",
    "bye",
    "goodbye",
    "haha",
    "lol",
    "ok",
    "okay",
    "yeah",
    "thanks",
    "thank you",
    "thx",
];

// Strong markers that boost the corresponding score by 1.5x
const CURRENT_MARKERS: &[&str] = &["now", "right now", "currently", "doing", "at the moment"];
const FUTURE_MARKERS: &[&str] = &["next", "later", "plan", "plans", "schedule", "agenda"];
const RECENCY_MARKERS: &[&str] = &["just", "just now", "still"];

static COMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(/\w+|sudo\s|git\s|npm\s|cargo\s|python\s|cd\s|ls\s)")
        .unwrap_or_else(|e| panic!("invalid command pattern: {e}"))
});

// Named time-of-day ranges, checked longest-name-first so "early morning"
// wins over "morning"
const TIME_RANGES: &[TimeRange] = &[
    TimeRange { name: "early morning", start_hour: 0, end_hour: 6 },
    TimeRange { name: "late night", start_hour: 22, end_hour: 24 },
    TimeRange { name: "afternoon", start_hour: 14, end_hour: 18 },
    TimeRange { name: "morning", start_hour: 6, end_hour: 12 },
    TimeRange { name: "tonight", start_hour: 18, end_hour: 23 },
    TimeRange { name: "evening", start_hour: 18, end_hour: 23 },
    TimeRange { name: "midday", start_hour: 11, end_hour: 14 },
    TimeRange { name: "noon", start_hour: 11, end_hour: 14 },
];

#[derive(Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a message. Priority order, first match wins: command, tech,
    /// current-state query, future query, casual, short question, default
    /// casual.
    pub fn classify(&self, message: &str) -> (Intent, f64) {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return (Intent::Unknown, 0.0);
        }
        let message = trimmed.to_lowercase();

        if COMMAND_PATTERN.is_match(&message) {
            return (Intent::Command, 1.0);
        }

        let tech_score = keyword_score(&message, TECH_KEYWORDS);
        if tech_score > 0.5 {
            debug!(score = tech_score, "Classified as tech question");
            return (Intent::TechQuestion, tech_score);
        }

        let mut current_score = keyword_score(&message, CURRENT_KEYWORDS);
        if any_match(&message, CURRENT_MARKERS) {
            current_score = (current_score * 1.5).min(1.0);
        }
        // Rhetorical pattern ("aren't you ...?") over an activity verb is a
        // state question even without explicit time words
        let has_verb = any_match(&message, ACTIVITY_VERBS);
        let rhetorical = (message.contains("aren't you") || message.contains("weren't you"))
            && message.contains('?');
        if rhetorical && has_verb {
            current_score = current_score.max(0.85);
        }
        if has_verb && any_match(&message, RECENCY_MARKERS) {
            current_score = current_score.max(0.80);
        }
        if current_score > 0.4 {
            debug!(score = current_score, "Classified as current-state query");
            return (Intent::QueryCurrent, current_score);
        }

        let mut future_score = keyword_score(&message, FUTURE_KEYWORDS);
        if any_match(&message, FUTURE_MARKERS) {
            future_score = (future_score * 1.5).min(1.0);
        }
        if future_score > 0.4 {
            debug!(score = future_score, "Classified as future query");
            return (Intent::QueryFuture, future_score);
        }

        let casual_score = keyword_score(&message, CASUAL_KEYWORDS);
        if casual_score > 0.3 {
            return (Intent::CasualChat, casual_score);
        }

        if message.chars().count() < 10 && message.contains('?') {
            return (Intent::QueryCurrent, 0.6);
        }

        (Intent::CasualChat, 0.40)
    }

    /// Extract a named time-of-day range from the message, used to narrow the
    /// upcoming-activity list to the hours the user asked about.
    pub fn extract_time_range(&self, message: &str) -> Option<TimeRange> {
        let message = message.trim().to_lowercase();
        if message.is_empty() {
            return None;
        }
        TIME_RANGES
            .iter()
            .find(|range| phrase_matches(&message, range.name))
            .copied()
    }
}

fn any_match(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| phrase_matches(message, kw))
}

fn phrase_matches(message: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return message.contains(keyword);
    }
    message
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word == keyword || word.trim_matches('\'') == keyword)
}

/// Keyword-set score: min(1, matched/3) + min(0.5, sum(len/5)/5), capped at 1.
/// Zero when nothing matches.
fn keyword_score(message: &str, keywords: &[&str]) -> f64 {
    let mut matched = 0u32;
    let mut total_weight = 0.0f64;
    for keyword in keywords {
        if phrase_matches(message, keyword) {
            matched += 1;
            total_weight += keyword.len() as f64 / 5.0;
        }
    }
    if matched == 0 {
        return 0.0;
    }
    let base = (matched as f64 / 3.0).min(1.0);
    let bonus = (total_weight / 5.0).min(0.5);
    (base + bonus).min(1.0)
}
