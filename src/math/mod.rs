//! Mathematical primitives for FedGuard.
//!
//! Provides shared math utilities used by detection and evaluation:
//!
//! - [`norms`] - squared Euclidean distances
//! - [`stats`] - median and linearly interpolated percentiles

pub mod norms;
pub mod stats;

pub use norms::l2_dist_sq;
pub use stats::{median, percentile};
