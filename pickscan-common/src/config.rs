//! Configuration loading and config file resolution
//!
//! Every tuning constant of the pipeline (idle windows, cool-down, cache
//! sizes, quiet period, wake words) lives here with a built-in default. A
//! missing or partial TOML file never prevents startup: absent keys fall back
//! to the defaults and a missing file falls back to the defaults entirely.
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `PICKSCAN_CONFIG` environment variable
//! 3. `<user config dir>/pickscan/config.toml`
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PICKSCAN_CONFIG";

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub products: ProductCacheConfig,
    pub duplicate: DuplicateConfig,
    pub accumulation: AccumulationConfig,
    pub voice: VoiceConfig,
    pub logging: LoggingConfig,
}

/// Scanner hardware profile
///
/// Desktop scanners send a burst of keystrokes in well under 100ms. Handheld
/// integrations (DataWedge style) are slower and may not send a terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    #[default]
    Desktop,
    Handheld,
}

impl ScanProfile {
    pub fn default_idle_ms(self) -> u64 {
        match self {
            ScanProfile::Desktop => 100,
            ScanProfile::Handheld => 500,
        }
    }
}

/// Scan buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub profile: ScanProfile,
    /// Overrides the profile's idle window (e.g. 40ms for fast desktop scanners)
    pub idle_ms: Option<u64>,
    /// Shorter codes are dropped silently
    pub min_code_len: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            profile: ScanProfile::Desktop,
            idle_ms: None,
            min_code_len: 4,
        }
    }
}

impl ScanConfig {
    /// Idle window after which an unterminated buffer is finalized
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_ms.unwrap_or_else(|| self.profile.default_idle_ms()))
    }
}

/// Product cache bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductCacheConfig {
    /// Inserting past this size trims the cache
    pub cache_capacity: usize,
    /// Entries kept (most recently inserted) after a trim
    pub cache_retain: usize,
}

impl Default for ProductCacheConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 200,
            cache_retain: 150,
        }
    }
}

/// Duplicate guard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Minimum minutes since added/fulfilled before a code may be picked again
    pub cooldown_minutes: i64,
    /// How long a verdict is reused for bursts of the same scan
    pub verdict_ttl_ms: u64,
    /// Verdict cache size; oldest entries are evicted first
    pub verdict_cache_cap: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 5,
            verdict_ttl_ms: 2000,
            verdict_cache_cap: 50,
        }
    }
}

impl DuplicateConfig {
    pub fn verdict_ttl(&self) -> Duration {
        Duration::from_millis(self.verdict_ttl_ms)
    }
}

/// Accumulation and auto-commit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulationConfig {
    /// Inactivity before the active slot is committed automatically
    pub quiet_period_ms: u64,
    /// Window in which a second flush of the same code is suppressed
    pub resubmit_guard_ms: u64,
}

impl Default for AccumulationConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 5000,
            resubmit_guard_ms: 2000,
        }
    }
}

impl AccumulationConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn resubmit_guard(&self) -> Duration {
        Duration::from_millis(self.resubmit_guard_ms)
    }
}

/// Voice command settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub wake_words: Vec<String>,
    pub require_wake_word: bool,
    /// Delay before restarting after the recognizer ends normally
    pub restart_delay_ms: u64,
    /// Delay before restarting after an "aborted" recognizer error
    pub aborted_restart_delay_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            wake_words: vec!["ixora".to_string(), "pina".to_string()],
            require_wake_word: true,
            restart_delay_ms: 250,
            aborted_restart_delay_ms: 500,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserConfig(PathBuf),
    Defaults,
}

/// Configuration together with its origin
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub source: ConfigSource,
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file by priority and load it
    ///
    /// An explicit command-line path must exist. A dangling environment
    /// variable or a missing user config only logs a warning.
    pub fn resolve(cli_arg: Option<&Path>) -> Result<LoadedConfig> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            let config = Self::load_file(path).map_err(|e| {
                Error::Config(format!("Failed to load {}: {}", path.display(), e))
            })?;
            info!("Loaded configuration from {}", path.display());
            return Ok(LoadedConfig {
                config,
                source: ConfigSource::CommandLine(path.to_path_buf()),
            });
        }

        // Priority 2: Environment variable
        if let Ok(raw) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(raw);
            if path.exists() {
                let config = Self::load_file(&path)?;
                info!("Loaded configuration from ${} ({})", CONFIG_ENV_VAR, path.display());
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::Environment(path),
                });
            }
            warn!(
                "${} points to missing file {}, ignoring",
                CONFIG_ENV_VAR,
                path.display()
            );
        }

        // Priority 3: User config file
        if let Some(path) = user_config_path() {
            if path.exists() {
                let config = Self::load_file(&path)?;
                info!("Loaded configuration from {}", path.display());
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::UserConfig(path),
                });
            }
        }

        // Priority 4: Built-in defaults
        warn!("No configuration file found, using built-in defaults");
        Ok(LoadedConfig {
            config: EngineConfig::default(),
            source: ConfigSource::Defaults,
        })
    }

    /// Reject combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scan.idle_window().is_zero() {
            return Err(Error::Config("scan.idle_ms must be greater than zero".to_string()));
        }
        if self.scan.min_code_len == 0 {
            return Err(Error::Config("scan.min_code_len must be at least 1".to_string()));
        }
        if self.products.cache_capacity == 0 {
            return Err(Error::Config(
                "products.cache_capacity must be greater than zero".to_string(),
            ));
        }
        if self.products.cache_retain > self.products.cache_capacity {
            return Err(Error::Config(format!(
                "products.cache_retain ({}) exceeds products.cache_capacity ({})",
                self.products.cache_retain, self.products.cache_capacity
            )));
        }
        if self.duplicate.cooldown_minutes < 0 {
            return Err(Error::Config(
                "duplicate.cooldown_minutes must not be negative".to_string(),
            ));
        }
        if self.duplicate.verdict_cache_cap == 0 {
            return Err(Error::Config(
                "duplicate.verdict_cache_cap must be greater than zero".to_string(),
            ));
        }
        if self.accumulation.quiet_period_ms == 0 {
            return Err(Error::Config(
                "accumulation.quiet_period_ms must be greater than zero".to_string(),
            ));
        }
        let has_wake_word = self.voice.wake_words.iter().any(|w| !w.trim().is_empty());
        if self.voice.require_wake_word && !has_wake_word {
            return Err(Error::Config(
                "voice.require_wake_word is set but voice.wake_words is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform config path: `<config dir>/pickscan/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pickscan").join("config.toml"))
}
