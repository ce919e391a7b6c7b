use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::analysis::dedup::DedupConfig;
use crate::analysis::flood::FloodConfig;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub classifier: ClassifierConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&raw).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// The port the detectors treat as the likely flood target. Shared
    /// by the decoder's seed rule and flood Rule C.
    pub watch_port: u16,
    /// Seed the malicious flag on any SYN toward the watch port.
    pub seed_rule: bool,
    pub flood: FloodConfig,
    pub dedup: DedupConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            watch_port: 80,
            seed_rule: true,
            flood: FloodConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// The decoder's view of the seed heuristic.
    pub fn seed(&self) -> SeedRule {
        SeedRule {
            enabled: self.seed_rule,
            port: self.watch_port,
        }
    }
}

/// The decoder's baseline maliciousness heuristic: SYN bit set toward
/// the watched port. A seed signal only; later passes OR into it.
#[derive(Debug, Clone, Copy)]
pub struct SeedRule {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Endpoint of the external classifier service.
    pub url: String,
    /// Upper bound on the whole HTTP exchange.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            url: "http://127.0.0.1:3000/api/ml-analyze".into(),
            timeout_secs: 10,
        }
    }
}
