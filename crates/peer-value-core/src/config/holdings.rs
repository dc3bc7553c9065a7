use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{parse_locale_decimal, read_source};
use crate::error::PeerValueError;
use crate::types::WeightTriple;
use crate::PeerValueResult;

const TICKER: &str = "ticker";
const EV_WEIGHT: &str = "price_ev_w";
const PE_WEIGHT: &str = "price_pe_w";
const PS_WEIGHT: &str = "price_ps_w";
const SHARE: &str = "share";

/// Which table layout a holdings file follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldingsMode {
    /// One row per stock: ticker and method weights
    Stocks,
    /// Stock list plus a `share` count per row
    Fund,
}

impl HoldingsMode {
    fn required_columns(self) -> &'static [&'static str] {
        match self {
            HoldingsMode::Stocks => &[TICKER, EV_WEIGHT, PE_WEIGHT, PS_WEIGHT],
            HoldingsMode::Fund => &[TICKER, EV_WEIGHT, PE_WEIGHT, PS_WEIGHT, SHARE],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    /// Share count; only present in fund mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<Decimal>,
    pub weights: WeightTriple,
}

/// Parsed holdings table with the notes produced while reading it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Holdings {
    pub entries: Vec<Holding>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Holdings {
    pub fn get(&self, ticker: &str) -> Option<&Holding> {
        self.entries
            .iter()
            .find(|h| h.ticker.eq_ignore_ascii_case(ticker.trim()))
    }

    /// Weights for `ticker`, or the default triple.
    pub fn weights_for(&self, ticker: &str) -> WeightTriple {
        self.get(ticker).map(|h| h.weights).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_holdings(path: &Path, mode: HoldingsMode) -> PeerValueResult<Holdings> {
    let text = read_source(path)?;
    parse_holdings(&path.display().to_string(), &text, mode)
}

/// Parse a holdings CSV.
///
/// Rows with an empty required cell are dropped with a warning. Any
/// unparseable or negative number fails the whole table, as do missing
/// columns and a table without usable rows.
pub fn parse_holdings(source_name: &str, text: &str, mode: HoldingsMode) -> PeerValueResult<Holdings> {
    let header_line = text.lines().next().unwrap_or_default();
    let delimiter = if header_line.contains(';') && !header_line.contains(',') {
        b';'
    } else {
        b','
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect();

    let missing: Vec<&str> = mode
        .required_columns()
        .iter()
        .copied()
        .filter(|c| !columns.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(PeerValueError::config(
            source_name,
            format!("missing required columns: {}", missing.join(", ")),
        ));
    }

    let mut holdings = Holdings::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = index + 2;
        let cell = |name: &str| -> &str {
            columns
                .get(name)
                .and_then(|i| record.get(*i))
                .unwrap_or_default()
                .trim()
        };

        if let Some(empty) = mode.required_columns().iter().copied().find(|c| cell(c).is_empty()) {
            let note = format!("{source_name}: row {line} dropped, empty '{empty}'");
            tracing::warn!("{note}");
            holdings.warnings.push(note);
            continue;
        }

        let number = |name: &str| -> PeerValueResult<Decimal> {
            let raw = cell(name);
            let value = parse_locale_decimal(raw).ok_or_else(|| {
                PeerValueError::config(source_name, format!("row {line}: '{raw}' in {name} is not a number"))
            })?;
            if value < Decimal::ZERO {
                return Err(PeerValueError::config(
                    source_name,
                    format!("row {line}: {name} must not be negative"),
                ));
            }
            Ok(value)
        };

        let holding = Holding {
            ticker: cell(TICKER).to_ascii_uppercase(),
            shares: match mode {
                HoldingsMode::Fund => Some(number(SHARE)?),
                HoldingsMode::Stocks => None,
            },
            weights: WeightTriple::new(number(EV_WEIGHT)?, number(PE_WEIGHT)?, number(PS_WEIGHT)?),
        };

        match positions.get(&holding.ticker) {
            Some(&at) => {
                let note = format!(
                    "{source_name}: duplicate ticker {} at row {line}, keeping the later row",
                    holding.ticker
                );
                tracing::warn!("{note}");
                holdings.warnings.push(note);
                holdings.entries[at] = holding;
            }
            None => {
                positions.insert(holding.ticker.clone(), holdings.entries.len());
                holdings.entries.push(holding);
            }
        }
    }

    if holdings.entries.is_empty() {
        return Err(PeerValueError::config(source_name, "no usable rows"));
    }
    Ok(holdings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_semicolon_table_with_comma_decimals() {
        let text = "Ticker;Price_EV_W;Price_PE_W;Price_PS_W;Share\n\
                    ko;0,4;0,3;0,3;1.250,5\n\
                    PEP;0,5;0,5;0;10\n";
        let h = parse_holdings("fund.csv", text, HoldingsMode::Fund).unwrap();

        assert_eq!(h.len(), 2);
        assert_eq!(
            h.entries[0],
            Holding {
                ticker: "KO".into(),
                shares: Some(dec!(1250.5)),
                weights: WeightTriple::new(dec!(0.4), dec!(0.3), dec!(0.3)),
            }
        );
        assert_eq!(h.weights_for("pep").p_s, dec!(0));
        assert!(h.warnings.is_empty());
    }

    #[test]
    fn test_rows_with_empty_cells_dropped() {
        let text = "ticker,price_ev_w,price_pe_w,price_ps_w\n\
                    KO,0.4,0.3,0.3\n\
                    PEP,,0.5,0.5\n";
        let h = parse_holdings("stocks.csv", text, HoldingsMode::Stocks).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.warnings.len(), 1);
        assert!(h.warnings[0].contains("row 3"));
        assert_eq!(h.weights_for("UNKNOWN"), WeightTriple::default());
    }

    #[test]
    fn test_missing_columns() {
        let text = "ticker,price_ev_w,price_pe_w,price_ps_w\nKO,1,1,1\n";
        let err = parse_holdings("fund.csv", text, HoldingsMode::Fund).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error in fund.csv: missing required columns: share"
        );
    }

    #[test]
    fn test_bad_numbers_fail_the_table() {
        let text = "ticker,price_ev_w,price_pe_w,price_ps_w\nKO,abc,1,1\n";
        assert!(parse_holdings("s.csv", text, HoldingsMode::Stocks).is_err());

        let text = "ticker,price_ev_w,price_pe_w,price_ps_w\nKO,-1,1,1\n";
        let err = parse_holdings("s.csv", text, HoldingsMode::Stocks).unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn test_no_rows() {
        let text = "ticker,price_ev_w,price_pe_w,price_ps_w\n,1,1,1\n";
        let err = parse_holdings("s.csv", text, HoldingsMode::Stocks).unwrap_err();
        assert!(err.to_string().ends_with("no usable rows"));
    }

    #[test]
    fn test_duplicate_ticker_last_wins() {
        let text = "ticker,price_ev_w,price_pe_w,price_ps_w\n\
                    KO,1,0,0\n\
                    PEP,1,1,1\n\
                    KO,0,1,0\n";
        let h = parse_holdings("s.csv", text, HoldingsMode::Stocks).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.entries[0].ticker, "KO");
        assert_eq!(h.entries[0].weights.p_e, dec!(1));
        assert_eq!(h.warnings.len(), 1);
    }
}
