use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub inject: InjectConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Delay before a coalesced flush after a mutation. A burst of mutations
    /// inside this window produces exactly one physical write.
    #[serde(default = "default_save_delay_ms")]
    pub save_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            save_delay_ms: default_save_delay_ms(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_save_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Timezone identifier (e.g. "Asia/Shanghai"). Falls back to the system
    /// clock when it does not resolve.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_auto_generate")]
    pub auto_generate: bool,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_size: default_cache_max_size(),
            timezone: default_timezone(),
            auto_generate: default_auto_generate(),
            generation_timeout_secs: default_generation_timeout_secs(),
            generation: GenerationConfig::default(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_max_size() -> usize {
    100
}
fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}
fn default_auto_generate() -> bool {
    true
}
fn default_generation_timeout_secs() -> u64 {
    180
}

/// Options forwarded verbatim to the external schedule generator.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub use_multi_round: bool,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_min_activities")]
    pub min_activities: usize,
    #[serde(default = "default_max_activities")]
    pub max_activities: usize,
    #[serde(default = "default_min_description_length")]
    pub min_description_length: usize,
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub custom_prompt: String,
    #[serde(default)]
    pub custom_model: Option<CustomModelConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            use_multi_round: false,
            max_rounds: default_max_rounds(),
            min_activities: default_min_activities(),
            max_activities: default_max_activities(),
            min_description_length: default_min_description_length(),
            max_description_length: default_max_description_length(),
            max_tokens: default_max_tokens(),
            custom_prompt: String::new(),
            custom_model: None,
        }
    }
}

fn default_max_rounds() -> u32 {
    2
}
fn default_min_activities() -> usize {
    8
}
fn default_max_activities() -> usize {
    15
}
fn default_min_description_length() -> usize {
    15
}
fn default_max_description_length() -> usize {
    50
}
fn default_max_tokens() -> u32 {
    8192
}

#[derive(Debug, Deserialize, Clone)]
pub struct CustomModelConfig {
    pub model_name: String,
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct InjectConfig {
    #[serde(default)]
    pub mode: InjectMode,
    #[serde(default = "default_cooldown_ttl_secs")]
    pub cooldown_ttl_secs: u64,
    #[serde(default = "default_casual_inject_probability")]
    pub casual_inject_probability: f64,
    #[serde(default = "default_context_max_turns")]
    pub context_max_turns: usize,
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,
    /// Maximum upcoming activities rendered into the prompt. None = unlimited.
    #[serde(default)]
    pub max_future_activities: Option<usize>,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            mode: InjectMode::default(),
            cooldown_ttl_secs: default_cooldown_ttl_secs(),
            casual_inject_probability: default_casual_inject_probability(),
            context_max_turns: default_context_max_turns(),
            context_ttl_secs: default_context_ttl_secs(),
            max_future_activities: None,
        }
    }
}

fn default_cooldown_ttl_secs() -> u64 {
    300
}
fn default_casual_inject_probability() -> f64 {
    0.5
}
fn default_context_max_turns() -> usize {
    3
}
fn default_context_ttl_secs() -> u64 {
    600
}

/// How agenda context reaches the prompt. `Smart` hands the agenda to the LLM
/// as optional context, `Rule` runs the full classifier/optimizer pipeline,
/// `Traditional` is a fixed template.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InjectMode {
    #[default]
    Smart,
    Rule,
    Traditional,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_retention_days() -> i64 {
    30
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
