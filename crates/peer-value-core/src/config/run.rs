use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::holdings::HoldingsMode;
use super::{is_yaml, read_source};
use crate::error::PeerValueError;
use crate::types::Currency;
use crate::PeerValueResult;

/// One holdings file to value in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Label used in the report's `source` column
    pub name: String,
    pub path: PathBuf,
    pub kind: HoldingsMode,
}

/// Market-data fetch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub concurrency: usize,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_delay_ms: 100,
            timeout_secs: 20,
        }
    }
}

/// Batch run manifest.
///
/// ```yaml
/// reporting_currency: EUR
/// peer_map: peers.yaml
/// sources:
///   - { name: Stocks, path: stocks.csv, kind: stocks }
///   - { name: Global Fund, path: fund.csv, kind: fund }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub reporting_currency: Currency,
    pub peer_map: PathBuf,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub market_data: MarketDataConfig,
}

impl RunConfig {
    pub fn from_str_with_format(source_name: &str, text: &str, yaml: bool) -> PeerValueResult<Self> {
        let parsed: Self = if yaml {
            serde_yaml::from_str(text).map_err(|e| PeerValueError::config(source_name, e.to_string()))?
        } else {
            serde_json::from_str(text).map_err(|e| PeerValueError::config(source_name, e.to_string()))?
        };
        parsed.validate(source_name)?;
        Ok(parsed)
    }

    /// Load, validate and resolve relative paths against the manifest's
    /// directory.
    pub fn load(path: &Path) -> PeerValueResult<Self> {
        let text = read_source(path)?;
        let config = Self::from_str_with_format(&path.display().to_string(), &text, is_yaml(path))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_paths(base))
    }

    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.peer_map = resolve(&self.peer_map);
        for source in &mut self.sources {
            source.path = resolve(&source.path);
        }
        self
    }

    pub fn validate(&self, source_name: &str) -> PeerValueResult<()> {
        if self.sources.is_empty() {
            return Err(PeerValueError::config(source_name, "no sources configured"));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(PeerValueError::config(source_name, "source with empty name"));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(PeerValueError::config(
                    source_name,
                    format!("duplicate source name '{}'", source.name),
                ));
            }
        }
        if self.market_data.timeout_secs == 0 {
            return Err(PeerValueError::config(source_name, "timeout_secs must be positive"));
        }
        Ok(())
    }
}
