pub mod config;
pub mod error;
pub mod market_data;
pub mod types;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "portfolio")]
pub mod portfolio;

pub use error::PeerValueError;
pub use types::*;

/// Standard result type for all peer-value operations
pub type PeerValueResult<T> = Result<T, PeerValueError>;
