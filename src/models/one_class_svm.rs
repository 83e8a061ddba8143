//! One-Class SVM
//!
//! RBF カーネルの ν-One-Class SVM。双対問題を SMO（二次情報による作業集合選択）で解く。

use super::{common_dimension, OutlierDetector, TrainedModel};
use crate::config::OneClassSvmConfig;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 非正定値の二次項を置き換える値
const TAU: f64 = 1e-12;
/// 双対変数の上限
const UPPER_BOUND: f64 = 1.0;

/// One-Class SVM 検知器
#[derive(Debug, Clone)]
pub struct OneClassSvm {
    config: OneClassSvmConfig,
    seed: u64,
}

impl OneClassSvm {
    pub const NAME: &'static str = "one_class_svm";

    pub fn new(config: OneClassSvmConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// "scale" 設定のガンマ: 1 / (次元数 * 全要素の分散)
    fn scale_gamma(data: &Array2<f64>) -> f64 {
        let variance = data.var(0.0);
        if variance > 0.0 && variance.is_finite() {
            1.0 / (data.ncols() as f64 * variance)
        } else {
            1.0
        }
    }
}

impl OutlierDetector for OneClassSvm {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fit(&self, samples: &[FeatureVector]) -> Result<TrainedModel> {
        if samples.len() < 2 {
            return Err(Error::model(
                Self::NAME,
                format!("at least 2 samples required, got {}", samples.len()),
            ));
        }
        let dimension = common_dimension("one_class_svm fit", samples)?;
        if dimension == 0 {
            return Err(Error::model(Self::NAME, "feature vectors are empty"));
        }

        let rows: Vec<&FeatureVector> = if samples.len() > self.config.max_training_samples {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let mut picked =
                index::sample(&mut rng, samples.len(), self.config.max_training_samples).into_vec();
            picked.sort_unstable();
            debug!(
                "One-class SVM sub-sampling {} of {} training rows",
                picked.len(),
                samples.len()
            );
            picked.into_iter().map(|i| &samples[i]).collect()
        } else {
            samples.iter().collect()
        };

        let n = rows.len();
        let data = Array2::from_shape_fn((n, dimension), |(i, j)| rows[i][j]);
        if data.iter().any(|v| !v.is_finite()) {
            return Err(Error::model(Self::NAME, "non-finite feature value"));
        }

        let gamma = self.config.gamma.unwrap_or_else(|| Self::scale_gamma(&data));
        let kernel = rbf_gram(&data, gamma);

        let solution = SmoSolver {
            kernel: &kernel,
            tolerance: self.config.tolerance,
            max_iterations: self.config.max_iterations,
        }
        .solve(self.config.nu);

        if solution.hit_iteration_cap {
            warn!(
                "One-class SVM reached the iteration cap ({}) before converging",
                self.config.max_iterations
            );
        }
        if !solution.rho.is_finite() {
            return Err(Error::model(Self::NAME, "solver produced a non-finite offset"));
        }

        let (support_vectors, coefficients): (Vec<Vec<f64>>, Vec<f64>) = solution
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, &alpha)| alpha > 0.0)
            .map(|(i, &alpha)| (data.row(i).to_vec(), alpha))
            .unzip();

        if support_vectors.is_empty() {
            return Err(Error::model(Self::NAME, "no support vectors found"));
        }

        debug!(
            "One-class SVM fitted: {} support vectors of {} rows, gamma {:.6}, rho {:.6}, {} iterations",
            support_vectors.len(),
            n,
            gamma,
            solution.rho,
            solution.iterations
        );

        Ok(TrainedModel::OneClassSvm(OneClassSvmModel {
            support_vectors,
            coefficients,
            rho: solution.rho,
            gamma,
            dimension,
        }))
    }
}

/// RBF カーネル行列 K(i, j) = exp(-γ ||x_i - x_j||²)
fn rbf_gram(data: &Array2<f64>, gamma: f64) -> Array2<f64> {
    let gram = data.dot(&data.t());
    let norms: Array1<f64> = data.map_axis(Axis(1), |row| row.dot(&row));
    let n = data.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let distance = (norms[i] + norms[j] - 2.0 * gram[[i, j]]).max(0.0);
        (-gamma * distance).exp()
    })
}

struct SmoSolution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
    hit_iteration_cap: bool,
}

/// ラベルが全て +1 の双対問題 min ½αᵀQα, 0 ≤ α ≤ 1, Σα = νl を解く
struct SmoSolver<'a> {
    kernel: &'a Array2<f64>,
    tolerance: f64,
    max_iterations: usize,
}

impl SmoSolver<'_> {
    fn solve(&self, nu: f64) -> SmoSolution {
        let l = self.kernel.nrows();
        let total = nu * l as f64;
        let full = (total.floor() as usize).min(l);

        let mut alpha = vec![0.0; l];
        for a in alpha.iter_mut().take(full) {
            *a = UPPER_BOUND;
        }
        if full < l {
            alpha[full] = total - full as f64;
        }

        // G = Qα
        let alpha_view = Array1::from(alpha.clone());
        let mut gradient: Vec<f64> = self.kernel.dot(&alpha_view).to_vec();

        let mut iterations = 0;
        let mut hit_iteration_cap = false;
        while let Some((i, j)) = self.select_working_set(&alpha, &gradient) {
            if iterations >= self.max_iterations {
                hit_iteration_cap = true;
                break;
            }
            iterations += 1;

            let q_ii = self.kernel[[i, i]];
            let q_jj = self.kernel[[j, j]];
            let q_ij = self.kernel[[i, j]];
            let old_i = alpha[i];
            let old_j = alpha[j];

            let mut quad = q_ii + q_jj - 2.0 * q_ij;
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (gradient[i] - gradient[j]) / quad;
            let sum = old_i + old_j;
            let mut new_i = old_i - delta;
            let mut new_j = old_j + delta;

            if sum > UPPER_BOUND {
                if new_i > UPPER_BOUND {
                    new_i = UPPER_BOUND;
                    new_j = sum - UPPER_BOUND;
                }
            } else if new_j < 0.0 {
                new_j = 0.0;
                new_i = sum;
            }
            if sum > UPPER_BOUND {
                if new_j > UPPER_BOUND {
                    new_j = UPPER_BOUND;
                    new_i = sum - UPPER_BOUND;
                }
            } else if new_i < 0.0 {
                new_i = 0.0;
                new_j = sum;
            }

            alpha[i] = new_i;
            alpha[j] = new_j;

            let delta_i = new_i - old_i;
            let delta_j = new_j - old_j;
            let column_i = self.kernel.column(i);
            let column_j = self.kernel.column(j);
            for (k, g) in gradient.iter_mut().enumerate() {
                *g += column_i[k] * delta_i + column_j[k] * delta_j;
            }
        }

        let rho = Self::compute_rho(&alpha, &gradient);
        SmoSolution {
            alpha,
            rho,
            iterations,
            hit_iteration_cap,
        }
    }

    /// 最大違反ペアを二次情報で選択（収束済みなら None）
    fn select_working_set(&self, alpha: &[f64], gradient: &[f64]) -> Option<(usize, usize)> {
        let mut g_max = f64::NEG_INFINITY;
        let mut selected_i = None;
        for (t, (&a, &g)) in alpha.iter().zip(gradient).enumerate() {
            if a < UPPER_BOUND && -g >= g_max {
                g_max = -g;
                selected_i = Some(t);
            }
        }
        let i = selected_i?;

        let q_ii = self.kernel[[i, i]];
        let mut g_max2 = f64::NEG_INFINITY;
        let mut selected_j = None;
        let mut best_objective = f64::INFINITY;
        for (t, (&a, &g)) in alpha.iter().zip(gradient).enumerate() {
            if a <= 0.0 {
                continue;
            }
            if g >= g_max2 {
                g_max2 = g;
            }
            let grad_diff = g_max + g;
            if grad_diff > 0.0 {
                let quad = q_ii + self.kernel[[t, t]] - 2.0 * self.kernel[[i, t]];
                let objective = if quad > 0.0 {
                    -(grad_diff * grad_diff) / quad
                } else {
                    -(grad_diff * grad_diff) / TAU
                };
                if objective <= best_objective {
                    best_objective = objective;
                    selected_j = Some(t);
                }
            }
        }

        if g_max + g_max2 < self.tolerance {
            return None;
        }
        selected_j.map(|j| (i, j))
    }

    fn compute_rho(alpha: &[f64], gradient: &[f64]) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_count = 0usize;
        let mut free_sum = 0.0;

        for (&a, &g) in alpha.iter().zip(gradient) {
            if a >= UPPER_BOUND {
                lower = lower.max(g);
            } else if a <= 0.0 {
                upper = upper.min(g);
            } else {
                free_count += 1;
                free_sum += g;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

/// 学習済み One-Class SVM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneClassSvmModel {
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    rho: f64,
    gamma: f64,
    dimension: usize,
}

impl OneClassSvmModel {
    pub fn dimensionality(&self) -> usize {
        self.dimension
    }

    pub fn support_vector_count(&self) -> usize {
        self.support_vectors.len()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// f(x) = Σ αᵢ K(xᵢ, x) − ρ（正なら正常）
    pub fn decision_function(&self, sample: &[f64]) -> f64 {
        let x = ArrayView1::from(sample);
        let total: f64 = self
            .support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, &alpha)| {
                let distance: f64 = ArrayView1::from(sv.as_slice())
                    .iter()
                    .zip(x.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                alpha * (-self.gamma * distance).exp()
            })
            .sum();
        total - self.rho
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Vec<FeatureVector> {
        (0..60)
            .map(|i| {
                let angle = i as f64 * 0.37;
                let radius = 0.2 + (i % 5) as f64 * 0.05;
                vec![radius * angle.cos(), radius * angle.sin()]
            })
            .collect()
    }

    fn fit(config: OneClassSvmConfig, samples: &[FeatureVector]) -> OneClassSvmModel {
        match OneClassSvm::new(config, 42).fit(samples).unwrap() {
            TrainedModel::OneClassSvm(model) => model,
            other => panic!("unexpected model: {other:?}"),
        }
    }

    #[test]
    fn test_far_point_scores_below_zero() {
        let model = fit(OneClassSvmConfig::default(), &cluster());
        assert!(model.decision_function(&[5.0, 5.0]) < 0.0);
        assert!(model.decision_function(&[0.0, 0.0]) > model.decision_function(&[5.0, 5.0]));
    }

    #[test]
    fn test_nu_bounds_training_outliers() {
        let config = OneClassSvmConfig::default();
        let samples = cluster();
        let model = fit(config.clone(), &samples);
        let bound = config.nu * samples.len() as f64;

        // 上限に張り付いた α の数は νl 以下、α の総和は νl
        let at_upper = model
            .coefficients
            .iter()
            .filter(|&&alpha| alpha >= UPPER_BOUND)
            .count();
        assert!(at_upper as f64 <= bound, "bounded support vectors: {at_upper}");
        let alpha_sum: f64 = model.coefficients.iter().sum();
        assert!((alpha_sum - bound).abs() < 1e-9);

        // 停止許容誤差を超えて境界の外側にある学習点も νl 以下
        let margin_errors = samples
            .iter()
            .filter(|s| model.decision_function(s) < -config.tolerance)
            .count();
        assert!(margin_errors as f64 <= bound, "margin errors: {margin_errors}");
        assert!(model.support_vector_count() >= 6);
    }

    #[test]
    fn test_scale_gamma() {
        let data = Array2::from_shape_vec((2, 2), vec![0.0, 0.0, 2.0, 2.0]).unwrap();
        // 全要素の分散 = 1, 次元数 = 2
        assert!((OneClassSvm::scale_gamma(&data) - 0.5).abs() < 1e-12);

        let constant = Array2::from_elem((3, 2), 4.0);
        assert_eq!(OneClassSvm::scale_gamma(&constant), 1.0);
    }

    #[test]
    fn test_subsampling_is_deterministic() {
        let config = OneClassSvmConfig {
            max_training_samples: 20,
            ..Default::default()
        };
        let samples = cluster();
        assert_eq!(fit(config.clone(), &samples), fit(config, &samples));
    }

    #[test]
    fn test_fixed_gamma_is_kept() {
        let config = OneClassSvmConfig {
            gamma: Some(0.25),
            ..Default::default()
        };
        assert_eq!(fit(config, &cluster()).gamma(), 0.25);
    }
}
