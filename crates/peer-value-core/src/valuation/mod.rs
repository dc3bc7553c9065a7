//! Peer-multiple valuation engine.
//!
//! [`peer_multiples`] turns peer snapshots into outlier-bounded mean
//! multiples, [`weights`] renormalizes method weights over what is
//! available, and [`entity`] blends the method prices for one target.

pub mod entity;
pub mod peer_multiples;
pub mod weights;

pub use entity::{valuate, MethodExclusion, ValuationResult};
pub use peer_multiples::{
    compute_peer_multiples, MultipleSet, PeerMultipleCalculator, PeerMultiples, SkippedPeer,
};
pub use weights::normalize_weights;

/// In-flight fetch limit when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const MAX_CONCURRENCY: usize = 10;

pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}
