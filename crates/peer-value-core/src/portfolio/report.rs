use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::aggregate::PortfolioResult;
use crate::types::{Money, Rate};
use crate::valuation::ValuationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Stock,
    Fund,
}

impl std::fmt::Display for RowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowKind::Stock => write!(f, "Stock"),
            RowKind::Fund => write!(f, "Fund"),
        }
    }
}

/// One line of the summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub kind: RowKind,
    /// Holdings source the row came from
    pub source: String,
    pub ticker: String,
    pub name: String,
    pub fair_price: Option<Money>,
    pub current_price: Option<Money>,
    /// Premium (+) or discount (-) of fair over current, 1 dp
    pub difference_pct: Option<Rate>,
}

impl ReportRow {
    pub fn from_valuation(source: &str, v: &ValuationResult) -> Self {
        Self {
            kind: RowKind::Stock,
            source: source.to_string(),
            ticker: v.ticker.clone(),
            name: v.name.clone(),
            fair_price: Some(v.fair_price),
            current_price: v.current_price,
            difference_pct: v.premium_discount_pct,
        }
    }

    /// Fund row: values are position totals, the difference is the
    /// portfolio premium/discount.
    pub fn from_portfolio(source: &str, name: &str, p: &PortfolioResult) -> Self {
        Self {
            kind: RowKind::Fund,
            source: source.to_string(),
            ticker: source.to_string(),
            name: name.to_string(),
            fair_price: Some(p.total_fair_value.round_dp(2)),
            current_price: Some(p.total_current_value.round_dp(2)),
            difference_pct: Some(p.premium_discount_pct.round_dp(1)),
        }
    }
}

/// Sort by difference, largest first; rows without one go last. Stable.
pub fn sort_rows(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| match (a.difference_pct, b.difference_pct) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(ticker: &str, diff: Option<Rate>) -> ReportRow {
        ReportRow {
            kind: RowKind::Stock,
            source: "Stocks".into(),
            ticker: ticker.into(),
            name: ticker.into(),
            fair_price: None,
            current_price: None,
            difference_pct: diff,
        }
    }

    #[test]
    fn test_sort_descending_absent_last() {
        let mut rows = vec![
            row("A", Some(dec!(-5))),
            row("B", None),
            row("C", Some(dec!(12.5))),
            row("D", Some(dec!(0))),
        ];
        sort_rows(&mut rows);
        let order: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "A", "B"]);
    }
}
