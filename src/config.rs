//! Settings for locating and driving a VKMS device.
//!
//! Loaded from a TOML file such as:
//!
//! ```toml
//! dri_dir = "/dev/dri"
//! driver_name = "vkms"
//! race_retries = 3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::result::{Error, Result};

/// Environment variable that overrides [`VkmsConfig::dri_dir`].
pub const DRI_DIR_ENV: &str = "VKMS_DRI_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VkmsConfig {
    /// Directory scanned for DRM device nodes.
    #[serde(default = "default_dri_dir")]
    pub dri_dir: PathBuf,

    /// Driver name a device must report to be selected.
    #[serde(default = "default_driver_name")]
    pub driver_name: String,

    /// How many times a query that raced with a hotplug is attempted.
    #[serde(default = "default_race_retries")]
    pub race_retries: usize,
}

fn default_dri_dir() -> PathBuf {
    PathBuf::from("/dev/dri")
}

fn default_driver_name() -> String {
    "vkms".to_string()
}

fn default_race_retries() -> usize {
    3
}

impl Default for VkmsConfig {
    fn default() -> Self {
        Self {
            dri_dir: default_dri_dir(),
            driver_name: default_driver_name(),
            race_retries: default_race_retries(),
        }
    }
}

impl VkmsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    /// Load from `path`, falling back to the defaults when the file doesn't
    /// exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        info!(?path, "loaded configuration");
        Ok(config)
    }

    /// Apply [`DRI_DIR_ENV`] if it is set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(DRI_DIR_ENV).filter(|v| !v.is_empty()) {
            debug!(dir = %dir, "dri_dir overridden from environment");
            self.dri_dir = PathBuf::from(dir);
        }
        self
    }
}
