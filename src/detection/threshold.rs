//! Threshold rules for the two per-client signals.

use crate::math::stats::{median, quartiles};

/// Robust outlier threshold: `median + k * IQR`.
///
/// When the interquartile range is zero (identical values, or too few
/// clients to spread the quartiles) the threshold becomes
/// `median + degenerate_offset`. Returns `None` for an empty input.
pub fn robust_threshold(values: &[f64], k: f64, degenerate_offset: f64) -> Option<f64> {
    let mid = median(values)?;
    let (q1, q3) = quartiles(values)?;
    let iqr = q3 - q1;
    if iqr > 0.0 {
        Some(mid + k * iqr)
    } else {
        Some(mid + degenerate_offset)
    }
}

/// Whether a signal exceeds its threshold. Equality is not an excess.
pub fn exceeds(value: f64, threshold: f64) -> bool {
    value > threshold
}
