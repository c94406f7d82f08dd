//! Per-feature z-score standardization fitted over a pooled matrix.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::FedGuardError;

/// Column-wise mean and population standard deviation.
///
/// Constant columns get a scale of 1.0 so they standardize to zero
/// instead of dividing by zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    /// Fit on `data` (rows are samples).
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self, FedGuardError> {
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| FedGuardError::ShapeError("cannot standardize zero rows".to_string()))?;
        // Two-pass variance: exact for data that is exact around its mean
        let centered = &data - &mean;
        let scale = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .ok_or_else(|| FedGuardError::ShapeError("cannot standardize zero rows".to_string()))?
            .mapv(|var| {
                let s = var.sqrt();
                if s > 0.0 && s.is_finite() {
                    s
                } else {
                    1.0
                }
            });
        Ok(Self { mean, scale })
    }

    /// Standardize `data` with the fitted statistics.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, FedGuardError> {
        if data.ncols() != self.mean.len() {
            return Err(FedGuardError::ShapeError(format!(
                "standardizer fitted on {} features, got {}",
                self.mean.len(),
                data.ncols()
            )));
        }
        Ok((&data - &self.mean) / &self.scale)
    }

    /// Fit on `data` and return it standardized.
    pub fn fit_transform(data: ArrayView2<'_, f64>) -> Result<(Self, Array2<f64>), FedGuardError> {
        let scaler = Self::fit(data)?;
        let z = scaler.transform(data)?;
        Ok((scaler, z))
    }

    /// Fitted per-feature means.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Fitted per-feature scales.
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_mean_unit_variance() {
        let data = array![[0.0, 10.0], [2.0, 20.0], [4.0, 30.0]];
        let (_, z) = Standardizer::fit_transform(data.view()).unwrap();
        for col in z.columns() {
            assert!(col.sum().abs() < 1e-12);
            let var = col.mapv(|v| v * v).mean().unwrap();
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let data = array![[5.0, 1.0], [5.0, 3.0]];
        let (scaler, z) = Standardizer::fit_transform(data.view()).unwrap();
        assert_eq!(scaler.scale()[0], 1.0);
        assert_eq!(z.column(0).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_two_point_exact() {
        let data = array![[0.0], [2.0]];
        let (_, z) = Standardizer::fit_transform(data.view()).unwrap();
        assert_eq!(z, array![[-1.0], [1.0]]);
    }

    #[test]
    fn test_balanced_two_value_column_exact() {
        let data = array![[0.0], [0.0], [0.0], [2.0], [2.0], [2.0]];
        let (scaler, z) = Standardizer::fit_transform(data.view()).unwrap();
        assert_eq!(scaler.mean()[0], 1.0);
        assert_eq!(scaler.scale()[0], 1.0);
        assert_eq!(z.column(0).to_vec(), vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = Standardizer::fit(array![[1.0, 2.0]].view()).unwrap();
        assert!(scaler.transform(array![[1.0]].view()).is_err());
    }
}
