use std::env;

/// Run configuration loaded from environment variables. CLI flags override
/// the scheduling knobs; these are the durable-path and pacing defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical listings file (append-only tabular sink).
    pub data_file: String,

    /// SQLite database holding yield samples and effectiveness scores.
    pub feedback_db: String,

    /// Proxy addresses for egress rotation, comma separated. Empty means
    /// direct connections only.
    pub proxies: Vec<String>,

    /// Inter-request pacing jitter bounds, milliseconds.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_file: env::var("VANSWEEP_DATA_FILE")
                .unwrap_or_else(|_| "data/listings.csv".to_string()),
            feedback_db: env::var("VANSWEEP_FEEDBACK_DB")
                .unwrap_or_else(|_| "data/feedback.db".to_string()),
            proxies: env::var("VANSWEEP_PROXIES")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            min_delay_ms: env_u64("VANSWEEP_MIN_DELAY_MS", 1_000),
            max_delay_ms: env_u64("VANSWEEP_MAX_DELAY_MS", 3_000),
        }
    }

    /// Log the effective configuration without leaking proxy credentials.
    pub fn log_redacted(&self) {
        tracing::info!(
            data_file = %self.data_file,
            feedback_db = %self.feedback_db,
            proxies = self.proxies.len(),
            min_delay_ms = self.min_delay_ms,
            max_delay_ms = self.max_delay_ms,
            "Configuration loaded"
        );
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
