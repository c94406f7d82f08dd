//! Distance computations for vectors.
//!
//! Used by nearest-centroid labeling in the detector.

use ndarray::ArrayView1;

/// Squared Euclidean distance between two equally long vectors (avoids sqrt).
///
/// Returns `f64::INFINITY` on length mismatch.
pub fn l2_dist_sq(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_l2_dist_sq() {
        let a = array![1.0, 1.0];
        let b = array![4.0, 5.0];
        assert!((l2_dist_sq(a.view(), b.view()) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_l2_dist_sq_mismatch() {
        let a = array![1.0];
        let b = array![1.0, 2.0];
        assert_eq!(l2_dist_sq(a.view(), b.view()), f64::INFINITY);
    }

    #[test]
    fn test_l2_dist_sq_identical_is_zero() {
        let a = array![0.5, -2.0, 3.0];
        assert_eq!(l2_dist_sq(a.view(), a.view()), 0.0);
    }
}
