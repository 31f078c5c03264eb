use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_KEYS_FILE: &str = "api_keys.json";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime credential override. When set, the persisted record is ignored
    /// and never written.
    pub api_key_override: Option<String>,
    pub keys_file: PathBuf,
    pub model: String,
    pub api_base: String,
    /// Timeout for a single HTTP call to the provider.
    pub request_timeout: Duration,
    /// Caller-level timeout around one whole orchestrated generation.
    pub generation_timeout: Duration,
    pub max_attempts: u32,
    pub quota_reset_interval: Duration,
    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key_override: None,
            keys_file: PathBuf::from(DEFAULT_KEYS_FILE),
            model: DEFAULT_MODEL.into(),
            api_base: DEFAULT_API_BASE.into(),
            request_timeout: Duration::from_secs(60),
            generation_timeout: Duration::from_secs(180),
            max_attempts: 3,
            quota_reset_interval: Duration::from_secs(24 * 3600),
            log_json: false,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    Ok(Config {
        api_key_override: normalize_override(std::env::var("GEMINI_API_KEY").ok()),
        keys_file: std::env::var("QUIZGEN_KEYS_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.keys_file),
        model: std::env::var("GEMINI_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.model),
        api_base: std::env::var("GEMINI_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base),
        request_timeout: env_secs("QUIZGEN_REQUEST_TIMEOUT_SECS").unwrap_or(defaults.request_timeout),
        generation_timeout: env_secs("QUIZGEN_GENERATION_TIMEOUT_SECS")
            .unwrap_or(defaults.generation_timeout),
        max_attempts: std::env::var("QUIZGEN_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .map(|n| n.max(1))
            .unwrap_or(defaults.max_attempts),
        quota_reset_interval: reset_interval(
            std::env::var("QUIZGEN_QUOTA_RESET_HOURS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
        )
        .unwrap_or(defaults.quota_reset_interval),
        log_json: std::env::var("QUIZGEN_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false),
    })
}

/// A blank override counts as unset.
pub fn normalize_override(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Zero hours counts as unset.
pub fn reset_interval(hours: Option<u64>) -> Option<Duration> {
    hours
        .filter(|h| *h > 0)
        .map(|h| Duration::from_secs(h.saturating_mul(3600)))
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}
