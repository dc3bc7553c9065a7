//! Multi-entity valuation: fund roll-ups with failure isolation, batch
//! runs over configured holdings sources, and the sorted summary report.

pub mod aggregate;
pub mod batch;
pub mod report;

pub use aggregate::{FailedEntry, PortfolioAggregator, PortfolioEntry, PortfolioResult, PositionValuation};
pub use batch::{run_batch, BatchReport, BatchRunner, SkippedItem};
pub use report::{sort_rows, ReportRow, RowKind};
