//! Harness configuration using Figment
//!
//! Configuration is layered from:
//! 1. Built-in defaults (valid without any file)
//! 2. A TOML file, usually `config/nvme_rsrc.toml`
//! 3. Environment variables prefixed with `NVME_RSRC_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use nvme_rsrc::config::HarnessConfig;
//!
//! // NVME_RSRC_LOGGING__LEVEL=debug overrides [logging] level
//! let config = HarnessConfig::load()?;
//! println!("Protected kinds: {:?}", config.registry.protected_kinds);
//! # Ok::<(), figment::Error>(())
//! ```

use crate::entity::{EntityKind, ADMIN_QUEUE_KINDS};
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/nvme_rsrc.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "NVME_RSRC_";

/// Top-level harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Registry settings applied to every test group
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
    /// Emit span open/close events
    #[serde(default)]
    pub span_events: bool,
    /// ANSI colors in pretty output
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

/// What happens to registered entities when a group ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Drop every entry
    ReleaseAll,
    /// Drop every entry except the protected kinds
    #[default]
    KeepProtected,
}

/// `[registry]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Kinds that survive a `keep_protected` teardown
    #[serde(default = "default_protected_kinds")]
    pub protected_kinds: Vec<EntityKind>,
    /// Teardown applied at group end
    #[serde(default)]
    pub teardown: TeardownPolicy,
    /// Metadata buffer size in bytes for IO commands
    #[serde(default)]
    pub meta_alloc_size: Option<u32>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

fn default_protected_kinds() -> Vec<EntityKind> {
    ADMIN_QUEUE_KINDS.to_vec()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: OutputFormat::default(),
            span_events: false,
            ansi: default_ansi(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            protected_kinds: default_protected_kinds(),
            teardown: TeardownPolicy::default(),
            meta_alloc_size: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from the default path and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        if let Some(size) = self.registry.meta_alloc_size {
            if size == 0 || size % 4 != 0 {
                return Err(format!(
                    "Invalid meta_alloc_size {size}. Must be a non-zero multiple of 4"
                ));
            }
        }

        let mut seen = HashSet::new();
        for kind in &self.registry.protected_kinds {
            if !seen.insert(kind) {
                return Err(format!("Duplicate protected kind: {}", kind.config_name()));
            }
        }

        Ok(())
    }
}
