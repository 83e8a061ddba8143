//! Isolation Forest
//!
//! ランダムな分割で特徴空間を区切り、少ない分割で孤立するサンプルを異常とみなす。
//!
//! Liu, F. T., Ting, K. M., & Zhou, Z. H. (2008). Isolation forest.

use super::{common_dimension, OutlierDetector, TrainedModel};
use crate::config::IsolationForestConfig;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// 二分探索木の平均失敗探索長 c(n)
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation Tree のノード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationNode {
    fn path_length(&self, sample: &[f64], depth: usize) -> f64 {
        match self {
            IsolationNode::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
            IsolationNode::Leaf { size } => depth as f64 + average_path_length(*size),
        }
    }
}

/// 木の構築コンテキスト
struct TreeBuilder<'a> {
    samples: &'a [FeatureVector],
    dimension: usize,
    max_depth: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> IsolationNode {
        if depth >= self.max_depth || indices.len() <= 1 {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        // 値が一定でない特徴量が見つかるまで重複なしで抽選
        let mut candidates: Vec<usize> = (0..self.dimension).collect();
        let mut remaining = candidates.len();
        while remaining > 0 {
            let pick = rng.gen_range(0..remaining);
            let feature = candidates[pick];
            candidates.swap(pick, remaining - 1);
            remaining -= 1;

            let (min, max) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &i| {
                let value = self.samples[i][feature];
                (acc.0.min(value), acc.1.max(value))
            });
            if max <= min {
                continue;
            }

            let threshold = rng.gen_range(min..max);
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| self.samples[i][feature] <= threshold);

            return IsolationNode::Internal {
                feature,
                threshold,
                left: Box::new(self.build(left, depth + 1, rng)),
                right: Box::new(self.build(right, depth + 1, rng)),
            };
        }

        IsolationNode::Leaf {
            size: indices.len(),
        }
    }
}

/// Isolation Forest 検知器
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    seed: u64,
}

impl IsolationForest {
    pub const NAME: &'static str = "isolation_forest";

    pub fn new(config: IsolationForestConfig, seed: u64) -> Self {
        Self { config, seed }
    }
}

impl OutlierDetector for IsolationForest {
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
        let dimension = common_dimension("isolation_forest fit", samples)?;
        if dimension == 0 {
            return Err(Error::model(Self::NAME, "feature vectors are empty"));
        }
        if samples.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::model(Self::NAME, "non-finite feature value"));
        }

        let sample_size = self.config.max_samples.min(samples.len());
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let builder = TreeBuilder {
            samples,
            dimension,
            max_depth,
        };
        let trees = (0..self.config.n_estimators)
            .map(|_| {
                let subsample = index::sample(&mut rng, samples.len(), sample_size).into_vec();
                builder.build(subsample, 0, &mut rng)
            })
            .collect();

        let mut model = IsolationForestModel {
            trees,
            sample_size,
            offset: 0.0,
            dimension,
        };

        // 学習スコアの contamination 分位点をしきい値にする
        let mut training_scores: Vec<f64> = samples.iter().map(|s| model.score_samples(s)).collect();
        model.offset = percentile(&mut training_scores, self.config.contamination);

        debug!(
            "Isolation forest fitted: {} trees, sub-sample {}, depth limit {}, offset {:.4}",
            self.config.n_estimators, sample_size, max_depth, model.offset
        );

        Ok(TrainedModel::IsolationForest(model))
    }
}

/// 学習済み Isolation Forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestModel {
    trees: Vec<IsolationNode>,
    sample_size: usize,
    offset: f64,
    dimension: usize,
}

impl IsolationForestModel {
    pub fn dimensionality(&self) -> usize {
        self.dimension
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// 異常スコア `-2^(-E[h(x)] / c(ψ))`（-1 に近いほど異常）
    pub fn score_samples(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return -0.5;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size).max(f64::EPSILON);
        -(2f64.powf(-mean_depth / normalizer))
    }

    /// 生スコア（負なら外れ値）
    pub fn decision_function(&self, sample: &[f64]) -> f64 {
        self.score_samples(sample) - self.offset
    }
}

/// 線形補間による分位点（q は 0..=1）
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let position = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    values[lower] + (values[upper] - values[lower]) * (position - lower as f64)
}
