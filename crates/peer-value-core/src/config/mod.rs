//! Request-scoped configuration: holdings tables, peer maps and run
//! manifests. Everything here is loaded once and passed explicitly.

pub mod holdings;
pub mod peer_map;
pub mod run;

use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

use crate::error::PeerValueError;
use crate::PeerValueResult;

pub use holdings::{load_holdings, parse_holdings, Holding, Holdings, HoldingsMode};
pub use peer_map::PeerMap;
pub use run::{MarketDataConfig, RunConfig, SourceConfig};

/// Parse a number that may use a comma as decimal separator.
///
/// `"0,4"` is 0.4. When both separators occur, `.` groups thousands:
/// `"1.234,5"` is 1234.5.
pub fn parse_locale_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.replace(',', ".")
    };
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Read a config file into a string, naming the file on failure.
pub(crate) fn read_source(path: &Path) -> PeerValueResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| PeerValueError::config(path.display().to_string(), e.to_string()))
}

/// True for `.yaml` / `.yml` paths; everything else is read as JSON.
pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_locale_decimals() {
        assert_eq!(parse_locale_decimal("0,4"), Some(dec!(0.4)));
        assert_eq!(parse_locale_decimal(" 0.25 "), Some(dec!(0.25)));
        assert_eq!(parse_locale_decimal("1.234,5"), Some(dec!(1234.5)));
        assert_eq!(parse_locale_decimal("1 500"), Some(dec!(1500)));
        assert_eq!(parse_locale_decimal(""), None);
        assert_eq!(parse_locale_decimal("abc"), None);
    }

    #[test]
    fn test_yaml_detection() {
        assert!(is_yaml(Path::new("peers.YML")));
        assert!(!is_yaml(Path::new("peers.json")));
    }
}
