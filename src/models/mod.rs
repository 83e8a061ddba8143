//! Anomaly Detection Models
//!
//! 同一の特徴空間上で独立に学習する教師なし外れ値検知モデル群。

mod ensemble;
mod isolation_forest;
mod one_class_svm;

pub use ensemble::{ModelEnsemble, TrainedEnsemble};
pub use isolation_forest::{IsolationForest, IsolationForestModel};
pub use one_class_svm::{OneClassSvm, OneClassSvmModel};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// モデルごとの判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Inlier,
    Outlier,
}

impl Vote {
    pub fn is_outlier(&self) -> bool {
        matches!(self, Vote::Outlier)
    }
}

/// 1モデルの1レコードに対する出力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// モデル名
    pub model: String,
    /// 判定
    pub vote: Vote,
    /// 生スコア（負ほど異常）
    pub score: f64,
}

/// 外れ値検知器
///
/// 実装は独立に学習し、互いの状態を参照しない。
pub trait OutlierDetector: Send + Sync {
    /// モデル名
    fn name(&self) -> &str;

    /// 特徴量ベクトルから学習
    fn fit(&self, samples: &[FeatureVector]) -> Result<TrainedModel>;
}

/// 学習済みモデル（学習後は不変）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    IsolationForest(IsolationForestModel),
    OneClassSvm(OneClassSvmModel),
}

impl TrainedModel {
    pub fn name(&self) -> &'static str {
        match self {
            TrainedModel::IsolationForest(_) => IsolationForest::NAME,
            TrainedModel::OneClassSvm(_) => OneClassSvm::NAME,
        }
    }

    /// 学習時の入力次元
    pub fn dimensionality(&self) -> usize {
        match self {
            TrainedModel::IsolationForest(model) => model.dimensionality(),
            TrainedModel::OneClassSvm(model) => model.dimensionality(),
        }
    }

    /// 1ベクトルを採点
    pub fn score(&self, sample: &[f64]) -> Result<ModelOutput> {
        if sample.len() != self.dimensionality() {
            return Err(Error::DimensionMismatch {
                stage: format!("{} scoring", self.name()),
                expected: self.dimensionality(),
                actual: sample.len(),
            });
        }

        let (vote, score) = match self {
            TrainedModel::IsolationForest(model) => {
                let score = model.decision_function(sample);
                let vote = if score < 0.0 {
                    Vote::Outlier
                } else {
                    Vote::Inlier
                };
                (vote, score)
            }
            TrainedModel::OneClassSvm(model) => {
                let score = model.decision_function(sample);
                let vote = if score > 0.0 {
                    Vote::Inlier
                } else {
                    Vote::Outlier
                };
                (vote, score)
            }
        };

        Ok(ModelOutput {
            model: self.name().to_string(),
            vote,
            score,
        })
    }
}

/// 学習結果の概要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// 学習サンプル数
    pub samples_trained: usize,
    /// 特徴量次元数
    pub feature_dimensionality: usize,
    /// 特徴量名
    pub feature_names: Vec<String>,
    /// 学習に成功したモデル
    pub models_trained: Vec<String>,
    /// 学習に失敗して除外されたモデル
    pub failed_models: Vec<String>,
    /// 学習時刻 (UTC)
    pub trained_at: DateTime<Utc>,
}

/// 全ベクトルが同じ次元であることを確認し、その次元を返す
pub(crate) fn common_dimension(stage: &str, samples: &[FeatureVector]) -> Result<usize> {
    let dimension = samples.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = samples.iter().find(|s| s.len() != dimension) {
        return Err(Error::DimensionMismatch {
            stage: stage.to_string(),
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(dimension)
}
