//! Order statistics over scalar samples.
//!
//! Percentiles use linear interpolation between closest ranks
//! (rank = p/100 * (n - 1)), the same convention as NumPy's default.

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

fn interpolate(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Median of `values`, `None` if empty.
///
/// For an even count this is the mean of the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    let sorted = sorted(values);
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// `p`-th percentile of `values` (`p` in 0..=100), `None` if empty.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    interpolate(&sorted(values), p)
}

/// First and third quartile.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    Some((percentile(values, 25.0)?, percentile(values, 75.0)?))
}
