//! Injection decision pipeline.
//!
//! Per incoming message: classify intent, check the conversation context for a
//! continuation override, gate through the optimizer, then render the final
//! text from the template engine. Each stage lives in its own module and is
//! independently testable.

pub mod context;
pub mod intent;
pub mod optimizer;
pub mod state;
pub mod template;

pub use context::ContextCache;
pub use intent::{Intent, IntentClassifier, TimeRange};
pub use optimizer::InjectOptimizer;
pub use state::ActivityStateAnalyzer;
pub use template::TemplateEngine;
