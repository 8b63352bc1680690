use std::env;
use std::path::{Path, PathBuf};

use resources::LoadBudget;
use serde::{Deserialize, Serialize};
use symbology::{DimensionDefaults, KeyError, ResourceKeyBuilder};

pub const BASE_URL_VAR: &str = "SYMRES_BASE_URL";
pub const LOADS_PER_FRAME_VAR: &str = "SYMRES_LOADS_PER_FRAME";

/// Per-renderer settings for resource discovery and loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererConfig {
    /// Document base location relative file references resolve against.
    pub base_url: Option<String>,
    pub default_width: f64,
    pub default_height: f64,
    /// `None` starts every queued load in one pump.
    pub loads_per_frame: Option<u32>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let dims = DimensionDefaults::default();
        Self {
            base_url: None,
            default_width: dims.width,
            default_height: dims.height,
            loads_per_frame: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    BaseUrl(#[from] KeyError),
}

impl RendererConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Reads overrides through `lookup`; unset or unparsable values keep the
    /// defaults.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup(BASE_URL_VAR).filter(|v| !v.is_empty()),
            loads_per_frame: lookup(LOADS_PER_FRAME_VAR)
                .and_then(|v| v.parse().ok())
                .or(defaults.loads_per_frame),
            ..defaults
        }
    }

    pub fn key_builder(&self) -> Result<ResourceKeyBuilder, ConfigError> {
        match &self.base_url {
            Some(base) => Ok(ResourceKeyBuilder::from_base_str(base)?),
            None => Ok(ResourceKeyBuilder::default()),
        }
    }

    pub fn dimension_defaults(&self) -> DimensionDefaults {
        DimensionDefaults::new(self.default_width, self.default_height)
    }

    pub fn load_budget(&self) -> LoadBudget {
        self.loads_per_frame
            .map(LoadBudget::new)
            .unwrap_or_else(LoadBudget::unlimited)
    }
}
