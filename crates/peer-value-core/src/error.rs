use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerValueError {
    /// The provider could not supply a usable snapshot.
    #[error("ticker data unavailable")]
    DataUnavailable { ticker: String },

    /// None of the valuation methods has usable inputs for the target.
    #[error("insufficient data")]
    InsufficientMethodData { ticker: String },

    #[error("all available methods have zero weight")]
    ZeroWeight { ticker: String },

    /// Every available method produced a price at or below zero.
    #[error("no valid positive valuation results")]
    NoPositiveValuation { ticker: String },

    #[error("valuation failed: {succeeded} of {total} succeeded")]
    ValuationFailed { succeeded: usize, total: usize },

    #[error("configuration error in {source_name}: {reason}")]
    Configuration { source_name: String, reason: String },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PeerValueError {
    /// Ticker the error refers to, when it concerns a single entity.
    pub fn ticker(&self) -> Option<&str> {
        match self {
            PeerValueError::DataUnavailable { ticker }
            | PeerValueError::InsufficientMethodData { ticker }
            | PeerValueError::ZeroWeight { ticker }
            | PeerValueError::NoPositiveValuation { ticker } => Some(ticker),
            _ => None,
        }
    }

    pub(crate) fn config(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        PeerValueError::Configuration {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PeerValueError {
    fn from(e: serde_json::Error) -> Self {
        PeerValueError::SerializationError(e.to_string())
    }
}

impl From<csv::Error> for PeerValueError {
    fn from(e: csv::Error) -> Self {
        PeerValueError::Configuration {
            source_name: "csv".into(),
            reason: e.to_string(),
        }
    }
}
