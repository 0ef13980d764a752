//! Message boundary object.
//!
//! The transport layer hands the pipeline one of these per incoming message.
//! The pipeline only ever reads the metadata and, when it decides to inject,
//! prepends text to the prompt buffer; an undecided or denied message leaves
//! the prompt byte-identical.

use tracing::debug;

// Prompts sometimes arrive with a rendered chat transcript rather than the
// user's own words; those must not be mistaken for the message text
const TRANSCRIPT_MARKER: &str = "[chat transcript]";
const MAX_EXTRACT_LEN: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct MessageEnvelope {
    /// Prompt buffer destined for the language model.
    pub prompt: String,
    /// Message text as reported by the transport's base metadata.
    pub base_message: Option<String>,
    /// Rawest available form of the message.
    pub raw_message: Option<String>,
    /// Rendered plain text; may contain a transcript rather than the message.
    pub plain_text: Option<String>,
    /// Chat/stream scope id.
    pub stream_id: Option<String>,
    pub user_id: Option<String>,
}

impl MessageEnvelope {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Best-effort extraction of what the user actually typed.
    ///
    /// Priority: base metadata text, then raw message, then plain text. The
    /// raw/plain fallbacks are rejected when they look like an embedded
    /// transcript or are too long to be a single message.
    pub fn user_message(&self) -> Option<String> {
        if let Some(base) = self.base_message.as_deref() {
            if !base.is_empty() {
                return Some(base.to_string());
            }
        }
        for candidate in [self.raw_message.as_deref(), self.plain_text.as_deref()] {
            if let Some(text) = candidate {
                if !text.is_empty()
                    && !text.contains(TRANSCRIPT_MARKER)
                    && text.chars().count() < MAX_EXTRACT_LEN
                {
                    return Some(text.to_string());
                }
            }
        }
        debug!("No usable user message in envelope");
        None
    }

    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or("unknown")
    }

    pub fn scope(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Prepend injected text to the prompt buffer.
    pub fn prepend_to_prompt(&mut self, text: &str) {
        self.prompt = format!("{text}\n{}", self.prompt);
    }
}
