//! Field resolution for heterogeneous feeds.
//!
//! Feeds expose the same concept under several names. Each concept has an
//! ordered list of candidate keys and a single lookup takes the first key
//! carrying a value.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use super::FinancialSnapshot;
use crate::types::{Currency, Rate};

/// Ordered candidate keys for one fundamental concept.
#[derive(Debug, Clone, Copy)]
pub struct FieldKeys {
    pub concept: &'static str,
    pub keys: &'static [&'static str],
}

pub const PRICE_KEYS: FieldKeys = FieldKeys {
    concept: "price",
    keys: &["currentPrice", "regularMarketPrice", "previousClose"],
};

pub const SHARES_KEYS: FieldKeys = FieldKeys {
    concept: "shares",
    keys: &["sharesOutstanding", "impliedSharesOutstanding", "floatShares"],
};

pub const DEBT_KEYS: FieldKeys = FieldKeys {
    concept: "debt",
    keys: &[
        "totalDebt",
        "netDebt",
        "longTermDebt",
        "shortTermDebt",
        "totalLiabilities",
    ],
};

pub const CASH_KEYS: FieldKeys = FieldKeys {
    concept: "cash",
    keys: &[
        "cash",
        "cashAndCashEquivalents",
        "totalCash",
        "cashAndShortTermInvestments",
    ],
};

pub const EBITDA_KEYS: FieldKeys = FieldKeys {
    concept: "ebitda",
    keys: &["ebitda", "EBITDA", "operatingCashflow"],
};

pub const REVENUE_KEYS: FieldKeys = FieldKeys {
    concept: "revenue",
    keys: &["totalRevenue", "revenue", "operatingRevenue", "grossRevenue"],
};

/// Last-resort revenue proxies, tried only when every revenue key is empty.
pub const REVENUE_FALLBACK_KEYS: FieldKeys = FieldKeys {
    concept: "revenue (proxy)",
    keys: &["totalCashFromOperatingActivities", "grossProfit"],
};

pub const EPS_KEYS: FieldKeys = FieldKeys {
    concept: "eps",
    keys: &["trailingEps", "basicEps", "earningsPerShare", "dilutedEPS"],
};

pub const NET_INCOME_KEYS: FieldKeys = FieldKeys {
    concept: "net_income",
    keys: &["netIncome", "netIncomeToCommon", "NetIncome", "normalizedIncome"],
};

pub const NAME_KEYS: FieldKeys = FieldKeys {
    concept: "name",
    keys: &["longName", "shortName"],
};

pub const CURRENCY_KEYS: FieldKeys = FieldKeys {
    concept: "currency",
    keys: &["currency"],
};

/// Statement figures are sometimes reported in a different currency from
/// the quote.
pub const FINANCIAL_CURRENCY_KEYS: FieldKeys = FieldKeys {
    concept: "financial_currency",
    keys: &["financialCurrency"],
};

/// First value among `keys` present in `map`. First match wins.
pub fn first_match<'m, V>(map: &'m HashMap<String, V>, keys: &[&str]) -> Option<&'m V> {
    keys.iter().find_map(|k| map.get(*k))
}

/// Flat key/value view of one feed response.
#[derive(Debug, Clone, Default)]
pub struct RawFields {
    numbers: HashMap<String, f64>,
    text: HashMap<String, String>,
}

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-finite numbers are treated as absent. An existing key is kept,
    /// so the first module that reports a concept wins.
    pub fn insert_number(&mut self, key: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.numbers.entry(key.into()).or_insert(value);
        }
    }

    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.text.entry(key.into()).or_insert(value);
        }
    }

    pub fn number(&self, keys: &FieldKeys) -> Option<f64> {
        first_match(&self.numbers, keys.keys).copied()
    }

    pub fn text(&self, keys: &FieldKeys) -> Option<&str> {
        first_match(&self.text, keys.keys).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.numbers.len() + self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fundamentals picked out of a [`RawFields`], still in feed currency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFundamentals {
    pub name: Option<String>,
    pub currency: Option<String>,
    pub financial_currency: Option<String>,
    pub price: Option<Decimal>,
    pub shares: Option<Decimal>,
    pub debt: Option<Decimal>,
    pub cash: Option<Decimal>,
    pub ebitda: Option<Decimal>,
    pub revenue: Option<Decimal>,
    pub eps: Option<Decimal>,
    pub net_income: Option<Decimal>,
}

impl ResolvedFundamentals {
    pub fn from_fields(fields: &RawFields) -> Self {
        let num = |keys: &FieldKeys| fields.number(keys).and_then(Decimal::from_f64);
        Self {
            name: fields.text(&NAME_KEYS).map(str::to_string),
            currency: fields.text(&CURRENCY_KEYS).map(str::to_string),
            financial_currency: fields.text(&FINANCIAL_CURRENCY_KEYS).map(str::to_string),
            price: num(&PRICE_KEYS),
            shares: num(&SHARES_KEYS),
            debt: num(&DEBT_KEYS),
            cash: num(&CASH_KEYS),
            ebitda: num(&EBITDA_KEYS),
            revenue: num(&REVENUE_KEYS).or_else(|| num(&REVENUE_FALLBACK_KEYS)),
            eps: num(&EPS_KEYS),
            net_income: num(&NET_INCOME_KEYS),
        }
    }

    /// Build the normalized snapshot. `quote_scale` converts per-share
    /// figures (price, EPS) and `statement_scale` converts statement
    /// figures into the reporting currency. Shares are never scaled.
    pub fn into_snapshot(
        self,
        ticker: &str,
        currency: Currency,
        quote_scale: Rate,
        statement_scale: Rate,
    ) -> FinancialSnapshot {
        let quote = |v: Option<Decimal>| v.and_then(|v| v.checked_mul(quote_scale));
        let statement = |v: Option<Decimal>| v.and_then(|v| v.checked_mul(statement_scale));

        FinancialSnapshot {
            ticker: ticker.to_string(),
            name: self.name.unwrap_or_else(|| ticker.to_string()),
            price: quote(self.price),
            shares: self.shares,
            debt: statement(self.debt),
            cash: statement(self.cash),
            ebitda: statement(self.ebitda),
            revenue: statement(self.revenue),
            eps: quote(self.eps),
            net_income: statement(self.net_income),
            currency: Some(currency),
            success: false,
            error: None,
        }
        .finalize()
    }
}

/// Split a feed currency code into its major currency and the divisor that
/// turns minor-unit quotes into major units (`GBp` pence → GBP / 100).
pub fn split_minor_unit(code: &str) -> (Currency, Decimal) {
    match code.trim() {
        "GBp" | "GBX" => (Currency::GBP, dec!(100)),
        "ZAc" | "ZAX" => (Currency::Other("ZAR".into()), dec!(100)),
        "ILA" => (Currency::Other("ILS".into()), dec!(100)),
        other => (Currency::from(other.to_string()), Decimal::ONE),
    }
}
