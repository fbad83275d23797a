//! Checker options
//!
//! Options are plain data handed to each VM instance; nothing here is global.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_INSTANTIATION_DEPTH: usize = 100;
/// Upper bound accepted for `max_instantiation_depth`
pub const INSTANTIATION_DEPTH_CEILING: usize = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("maxInstantiationDepth must be between 1 and {max}, got {value}")]
    InstantiationDepth { value: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckerOptions {
    /// Nesting depth of generic instantiations before diagnostic 2589
    pub max_instantiation_depth: usize,
    /// Instruction budget per run; `None` runs to completion
    pub max_steps: Option<u64>,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            max_instantiation_depth: DEFAULT_MAX_INSTANTIATION_DEPTH,
            max_steps: None,
        }
    }
}

impl CheckerOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let options = Self::from_json(&text).map_err(|source| ConfigError::Json { path: display, source })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_instantiation_depth == 0 || self.max_instantiation_depth > INSTANTIATION_DEPTH_CEILING {
            return Err(ConfigError::InstantiationDepth {
                value: self.max_instantiation_depth,
                max: INSTANTIATION_DEPTH_CEILING,
            });
        }
        Ok(())
    }

    /// Depth limit the VM enforces; out-of-range values are clamped
    pub fn instantiation_limit(&self) -> usize {
        self.max_instantiation_depth.clamp(1, INSTANTIATION_DEPTH_CEILING)
    }
}
