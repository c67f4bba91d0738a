//! Configuration management.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Lowest accepted duplicate suppression window.
///
/// Values below this floor are clamped on every load path; a shorter
/// window cannot distinguish reader bounce from an intentional re-scan.
pub const MIN_SCAN_INTERVAL_FLOOR: Duration = Duration::from_millis(100);

/// Runtime configuration for the ingestion pipeline.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `SCANGATE_INPUT_TIMEOUT_MS` | u64 | `500` | Keystroke inactivity timeout |
/// | `SCANGATE_MIN_SCAN_INTERVAL_MS` | u64 | `1000` | Duplicate suppression window (floor 100) |
/// | `SCANGATE_MAX_BUFFER_LENGTH` | usize | `15` | Keystroke buffer length bound |
/// | `SCANGATE_CACHE_RETENTION_HOURS` | u64 | `24` | Suppression cache entry retention |
/// | `SCANGATE_CACHE_CAPACITY` | usize | `1024` | Suppression cache capacity |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Gap after which a partial keystroke buffer is considered stale.
    pub input_timeout: Duration,
    /// Window during which a repeated payload is rejected as duplicate.
    pub min_scan_interval: Duration,
    /// Maximum number of buffered keystrokes.
    pub max_buffer_length: usize,
    /// How long an idle suppression cache entry is retained.
    pub cache_retention: Duration,
    /// Maximum number of suppression cache entries.
    pub cache_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            input_timeout: Duration::from_millis(500),
            min_scan_interval: Duration::from_millis(1000),
            max_buffer_length: 15,
            cache_retention: Duration::from_secs(24 * 60 * 60),
            cache_capacity: 1024,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Keystroke inactivity timeout in milliseconds.
    pub input_timeout_ms: Option<u64>,
    /// Duplicate suppression window in milliseconds.
    pub min_scan_interval_ms: Option<u64>,
    /// Keystroke buffer length bound.
    pub max_buffer_length: Option<usize>,
    /// Suppression cache retention in hours.
    pub cache_retention_hours: Option<u64>,
    /// Suppression cache capacity.
    pub cache_capacity: Option<usize>,
}

impl ScanConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Falls back to defaults for unset or unparsable variables.
    #[must_use]
    pub fn from_env() -> Self {
        fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        let defaults = Self::default();
        let config = Self {
            input_timeout: env_parse("SCANGATE_INPUT_TIMEOUT_MS")
                .map_or(defaults.input_timeout, Duration::from_millis),
            min_scan_interval: env_parse("SCANGATE_MIN_SCAN_INTERVAL_MS")
                .map_or(defaults.min_scan_interval, Duration::from_millis),
            max_buffer_length: env_parse("SCANGATE_MAX_BUFFER_LENGTH")
                .unwrap_or(defaults.max_buffer_length),
            cache_retention: env_parse("SCANGATE_CACHE_RETENTION_HOURS")
                .map_or(defaults.cache_retention, |hours: u64| {
                    Duration::from_secs(hours * 60 * 60)
                }),
            cache_capacity: env_parse("SCANGATE_CACHE_CAPACITY")
                .unwrap_or(defaults.cache_capacity),
        };
        config.normalized()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::Error::InvalidInput(
            format!("failed to read config file {}: {e}", path.display()),
        ))?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| {
            crate::Error::InvalidInput(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/scangate/` for
    /// Unix compatibility. Returns defaults if no file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("scangate").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("scangate")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a parsed [`ConfigFile`] into a normalized configuration.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(ms) = file.input_timeout_ms {
            config.input_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.min_scan_interval_ms {
            config.min_scan_interval = Duration::from_millis(ms);
        }
        if let Some(len) = file.max_buffer_length {
            config.max_buffer_length = len;
        }
        if let Some(hours) = file.cache_retention_hours {
            config.cache_retention = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(capacity) = file.cache_capacity {
            config.cache_capacity = capacity;
        }

        config.normalized()
    }

    /// Builder method to set the keystroke inactivity timeout.
    #[must_use]
    pub const fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout = timeout;
        self
    }

    /// Builder method to set the duplicate suppression window.
    ///
    /// Clamped to [`MIN_SCAN_INTERVAL_FLOOR`].
    #[must_use]
    pub fn with_min_scan_interval(mut self, interval: Duration) -> Self {
        self.min_scan_interval = interval;
        self.normalized()
    }

    /// Builder method to set the keystroke buffer length bound.
    #[must_use]
    pub const fn with_max_buffer_length(mut self, length: usize) -> Self {
        self.max_buffer_length = length;
        self
    }

    /// Builder method to set the suppression cache retention.
    #[must_use]
    pub const fn with_cache_retention(mut self, retention: Duration) -> Self {
        self.cache_retention = retention;
        self
    }

    /// Builder method to set the suppression cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Clamps out-of-range values; applied on every load path.
    fn normalized(mut self) -> Self {
        if self.min_scan_interval < MIN_SCAN_INTERVAL_FLOOR {
            tracing::warn!(
                requested_ms = self.min_scan_interval.as_millis() as u64,
                floor_ms = MIN_SCAN_INTERVAL_FLOOR.as_millis() as u64,
                "min_scan_interval below floor, clamping"
            );
            self.min_scan_interval = MIN_SCAN_INTERVAL_FLOOR;
        }
        if self.max_buffer_length == 0 {
            self.max_buffer_length = 1;
        }
        if self.cache_capacity == 0 {
            self.cache_capacity = 1;
        }
        self
    }
}
