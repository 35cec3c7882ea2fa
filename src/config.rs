// Engine configuration file

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn, Level};

use crate::core::constants::RAW_CLOCK_OFFSET_SECS;
use crate::core::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "reader.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Point budget handed to the aggregation engine per plot.
    pub max_data_points: usize,
    pub parallel_loading: bool,
    pub raw_reduction_factor: usize,
    pub raw_clock_offset_secs: i64,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_data_points: 10_000,
            parallel_loading: true,
            raw_reduction_factor: 1_000,
            raw_clock_offset_secs: RAW_CLOCK_OFFSET_SECS,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Defaults when the file does not exist. A file that exists but is invalid is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::from_file(path) {
            Err(crate::core::error::ReaderError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn tracing_level(&self) -> Level {
        Level::from_str(self.log_level.trim()).unwrap_or(Level::INFO)
    }
}
