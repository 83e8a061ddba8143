//! Scalar Scaler

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// 平均・母分散による標準化（分散ゼロの場合スケール 1）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarScaler {
    pub mean: f64,
    pub scale: f64,
}

impl Default for ScalarScaler {
    fn default() -> Self {
        Self {
            mean: 0.0,
            scale: 1.0,
        }
    }
}

impl ScalarScaler {
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mean = values.iter().mean();
        let variance = values.iter().population_variance();
        let scale = if variance.is_finite() && variance > 0.0 {
            variance.sqrt()
        } else {
            1.0
        };

        Self { mean, scale }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardizes_values() {
        let scaler = ScalarScaler::fit(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((scaler.mean - 5.0).abs() < 1e-12);
        assert!((scaler.scale - 2.0).abs() < 1e-12);
        assert!((scaler.transform(9.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_uses_unit_scale() {
        let scaler = ScalarScaler::fit(&[3.0, 3.0, 3.0]);
        assert_eq!(scaler.scale, 1.0);
        assert_eq!(scaler.transform(3.0), 0.0);
        assert_eq!(scaler.transform(4.0), 1.0);
    }
}
