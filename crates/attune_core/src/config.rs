use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttuneConfig {
    pub vision: VisionConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
}

impl AttuneConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AttuneConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist, return defaults
    /// with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ATTUNE_VISION_PROVIDER") {
            self.vision.provider = v;
        }
        if let Ok(v) = std::env::var("ATTUNE_VISION_MODEL") {
            self.vision.model = v;
        }
        if let Ok(v) = std::env::var("ATTUNE_VISION_DEADLINE_SECS") {
            if let Ok(n) = v.parse() {
                self.vision.deadline_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ATTUNE_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Ok(v) = std::env::var("ATTUNE_DEVICE_SECRET") {
            self.crypto.device_secret = Some(v);
        }
        if let Ok(v) = std::env::var("ATTUNE_PBKDF2_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.crypto.pbkdf2_iterations = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub provider: String,
    pub model: String,
    /// Hard deadline on a single vision call. On expiry the call is treated
    /// as a provider failure and the offline fallback stands in.
    pub deadline_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "claude-4-5-sonnet-20250929".to_string(),
            deadline_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub retry: RetryScheduleConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "attune.db".to_string(),
            retry: RetryScheduleConfig::default(),
        }
    }
}

/// Bounded retry schedule for storage open + operation.
/// Quota failures are never retried regardless of this schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryScheduleConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Per-attempt delays in milliseconds; attempt N waits `delays_ms[N-1]`.
    pub delays_ms: Vec<u64>,
    /// Jitter applied to each delay, as a fraction (0.25 = +/- 25%).
    pub jitter_fraction: f64,
}

impl Default for RetryScheduleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays_ms: vec![0, 50, 200],
            jitter_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-SHA256 iteration count. Values below 100_000 are raised to
    /// the floor at key-derivation time.
    pub pbkdf2_iterations: u32,
    /// Device secret used to derive the key-encryption key. Usually injected
    /// via ATTUNE_DEVICE_SECRET rather than written to disk.
    pub device_secret: Option<String>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 100_000,
            device_secret: None,
        }
    }
}

impl CryptoConfig {
    /// Iterations with the floor applied.
    pub fn effective_iterations(&self) -> u32 {
        self.pbkdf2_iterations.max(100_000)
    }
}

// ============================================================================
// Tests
// ============================================================================
