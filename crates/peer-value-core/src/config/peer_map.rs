use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{is_yaml, read_source};
use crate::error::PeerValueError;
use crate::PeerValueResult;

/// Target ticker to its ordered list of peer tickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>", into = "BTreeMap<String, Vec<String>>")]
pub struct PeerMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for PeerMap {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut map = PeerMap::default();
        for (target, peers) in raw {
            map.insert(target, peers);
        }
        map
    }
}

impl From<PeerMap> for BTreeMap<String, Vec<String>> {
    fn from(map: PeerMap) -> Self {
        map.entries
    }
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickers are stored trimmed and upper-cased.
    pub fn insert(&mut self, target: impl AsRef<str>, peers: impl IntoIterator<Item = impl AsRef<str>>) {
        let peers = peers
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        self.entries.insert(normalize(target.as_ref()), peers);
    }

    pub fn with(mut self, target: &str, peers: &[&str]) -> Self {
        self.insert(target, peers);
        self
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.entries.contains_key(&normalize(ticker))
    }

    /// Peers of `ticker` in configured order, without duplicates and
    /// without the target itself. `None` when the ticker is not mapped.
    pub fn peers_for(&self, ticker: &str) -> Option<Vec<String>> {
        let target = normalize(ticker);
        let raw = self.entries.get(&target)?;
        let mut peers: Vec<String> = Vec::with_capacity(raw.len());
        for peer in raw {
            if *peer != target && !peers.contains(peer) {
                peers.push(peer.clone());
            }
        }
        Some(peers)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_json(source_name: &str, text: &str) -> PeerValueResult<Self> {
        serde_json::from_str(text).map_err(|e| PeerValueError::config(source_name, e.to_string()))
    }

    pub fn from_yaml(source_name: &str, text: &str) -> PeerValueResult<Self> {
        serde_yaml::from_str(text).map_err(|e| PeerValueError::config(source_name, e.to_string()))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> PeerValueResult<Self> {
        let text = read_source(path)?;
        let name = path.display().to_string();
        if is_yaml(path) {
            Self::from_yaml(&name, &text)
        } else {
            Self::from_json(&name, &text)
        }
    }
}

fn normalize(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}
