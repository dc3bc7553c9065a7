use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates and weights expressed as decimals (0.4 = 40%).
pub type Rate = Decimal;

/// Multiples (e.g., 8.5x EV/EBITDA)
pub type Multiple = Decimal;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Currency {
    GBP,
    USD,
    #[default]
    EUR,
    CHF,
    JPY,
    CAD,
    AUD,
    HKD,
    SGD,
    PLN,
    SEK,
    DKK,
    NOK,
    Other(String),
}

impl Currency {
    /// ISO 4217 code as used by market-data feeds.
    pub fn code(&self) -> &str {
        match self {
            Currency::GBP => "GBP",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::CHF => "CHF",
            Currency::JPY => "JPY",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::HKD => "HKD",
            Currency::SGD => "SGD",
            Currency::PLN => "PLN",
            Currency::SEK => "SEK",
            Currency::DKK => "DKK",
            Currency::NOK => "NOK",
            Currency::Other(code) => code,
        }
    }

    /// Display symbol for report formatting; falls back to the code.
    pub fn symbol(&self) -> String {
        match self {
            Currency::GBP => "£".into(),
            Currency::USD => "$".into(),
            Currency::EUR => "€".into(),
            Currency::JPY => "¥".into(),
            Currency::PLN => "zł ".into(),
            other => format!("{} ", other.code()),
        }
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "GBP" => Currency::GBP,
            "USD" => Currency::USD,
            "EUR" => Currency::EUR,
            "CHF" => Currency::CHF,
            "JPY" => Currency::JPY,
            "CAD" => Currency::CAD,
            "AUD" => Currency::AUD,
            "HKD" => Currency::HKD,
            "SGD" => Currency::SGD,
            "PLN" => Currency::PLN,
            "SEK" => Currency::SEK,
            "DKK" => Currency::DKK,
            "NOK" => Currency::NOK,
            other => Currency::Other(other.to_string()),
        }
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("'{s}' is not a three-letter currency code"));
        }
        Ok(Currency::from(trimmed.to_string()))
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The three peer-multiple pricing methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    EvEbitda,
    PriceEarnings,
    PriceSales,
}

impl ValuationMethod {
    pub const ALL: [ValuationMethod; 3] = [
        ValuationMethod::EvEbitda,
        ValuationMethod::PriceEarnings,
        ValuationMethod::PriceSales,
    ];
}

impl std::fmt::Display for ValuationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValuationMethod::EvEbitda => write!(f, "EV/EBITDA"),
            ValuationMethod::PriceEarnings => write!(f, "P/E"),
            ValuationMethod::PriceSales => write!(f, "P/S"),
        }
    }
}

/// User-supplied relative importance of the three methods for one target.
/// Need not sum to one; the valuation normalizes over available methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTriple {
    pub ev_ebitda: Rate,
    pub p_e: Rate,
    pub p_s: Rate,
}

impl WeightTriple {
    pub fn new(ev_ebitda: Rate, p_e: Rate, p_s: Rate) -> Self {
        Self { ev_ebitda, p_e, p_s }
    }

    pub fn weight(&self, method: ValuationMethod) -> Rate {
        match method {
            ValuationMethod::EvEbitda => self.ev_ebitda,
            ValuationMethod::PriceEarnings => self.p_e,
            ValuationMethod::PriceSales => self.p_s,
        }
    }
}

impl Default for WeightTriple {
    fn default() -> Self {
        Self::new(dec!(0.33), dec!(0.33), dec!(0.33))
    }
}

impl FromStr for WeightTriple {
    type Err = String;

    /// Parses `ev,pe,ps`, e.g. `0.4,0.3,0.3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("expected three comma-separated weights, got '{s}'"));
        }
        let mut values = [Decimal::ZERO; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            let w = Decimal::from_str(part).map_err(|e| format!("invalid weight '{part}': {e}"))?;
            if w < Decimal::ZERO {
                return Err(format!("weight '{part}' must not be negative"));
            }
            *slot = w;
        }
        Ok(Self::new(values[0], values[1], values[2]))
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_triple_parse() {
        let w: WeightTriple = "0.4, 0.3,0.3".parse().unwrap();
        assert_eq!(w, WeightTriple::new(dec!(0.4), dec!(0.3), dec!(0.3)));
        assert!("0.4,0.3".parse::<WeightTriple>().is_err());
        assert!("0.4,-0.3,0.3".parse::<WeightTriple>().is_err());
    }

    #[test]
    fn test_currency_round_trip_through_code() {
        assert_eq!(Currency::from("pln".to_string()), Currency::PLN);
        assert_eq!(Currency::from("BRL".to_string()).code(), "BRL");
        let json = serde_json::to_string(&Currency::EUR).unwrap();
        assert_eq!(json, "\"EUR\"");
    }
}
