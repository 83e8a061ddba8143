//! Model Ensemble

use super::{
    common_dimension, IsolationForest, ModelOutput, OneClassSvm, OutlierDetector, TrainedModel,
    TrainingSummary,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 検知器の集合
pub struct ModelEnsemble {
    detectors: Vec<Box<dyn OutlierDetector>>,
    min_training_samples: usize,
}

impl ModelEnsemble {
    /// 設定で有効な検知器から構築
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut detectors: Vec<Box<dyn OutlierDetector>> = Vec::new();
        if config.isolation_forest.enabled {
            detectors.push(Box::new(IsolationForest::new(
                config.isolation_forest.clone(),
                config.random_seed,
            )));
        }
        if config.one_class_svm.enabled {
            detectors.push(Box::new(OneClassSvm::new(
                config.one_class_svm.clone(),
                config.random_seed,
            )));
        }
        Self::with_detectors(detectors, config.min_training_samples)
    }

    /// 任意の検知器から構築
    pub fn with_detectors(
        detectors: Vec<Box<dyn OutlierDetector>>,
        min_training_samples: usize,
    ) -> Self {
        Self {
            detectors,
            min_training_samples: min_training_samples.max(2),
        }
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.detectors.iter().map(|d| d.name().to_string()).collect()
    }

    /// 全検知器を同一入力で独立に学習
    ///
    /// 失敗した検知器はこのサイクルから除外される。全て失敗した場合は `InsufficientData`。
    pub fn train(
        &self,
        features: &[FeatureVector],
        feature_names: &[String],
    ) -> Result<(TrainedEnsemble, TrainingSummary)> {
        if features.len() < self.min_training_samples {
            return Err(Error::InsufficientData(format!(
                "{} training samples provided, at least {} required",
                features.len(),
                self.min_training_samples
            )));
        }
        let dimension = common_dimension("ensemble training", features)?;
        if dimension != feature_names.len() {
            return Err(Error::DimensionMismatch {
                stage: "ensemble training".to_string(),
                expected: feature_names.len(),
                actual: dimension,
            });
        }
        if self.detectors.is_empty() {
            return Err(Error::InsufficientData(
                "no detectors are configured".to_string(),
            ));
        }

        let mut models = Vec::new();
        let mut failures = Vec::new();
        for detector in &self.detectors {
            match detector.fit(features) {
                Ok(model) => models.push(model),
                Err(e) => {
                    warn!("Detector '{}' failed to train: {}", detector.name(), e);
                    failures.push((detector.name().to_string(), e.to_string()));
                }
            }
        }

        if models.is_empty() {
            let reasons = failures
                .iter()
                .map(|(name, reason)| format!("{}: {}", name, reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::InsufficientData(format!(
                "every detector failed to train ({})",
                reasons
            )));
        }

        let summary = TrainingSummary {
            samples_trained: features.len(),
            feature_dimensionality: dimension,
            feature_names: feature_names.to_vec(),
            models_trained: models.iter().map(|m| m.name().to_string()).collect(),
            failed_models: failures.into_iter().map(|(name, _)| name).collect(),
            trained_at: Utc::now(),
        };

        info!(
            "Ensemble trained on {} samples x {} features: {:?} (failed: {:?})",
            summary.samples_trained,
            summary.feature_dimensionality,
            summary.models_trained,
            summary.failed_models
        );

        Ok((
            TrainedEnsemble {
                models,
                dimension,
            },
            summary,
        ))
    }
}

/// 学習済みアンサンブル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedEnsemble {
    models: Vec<TrainedModel>,
    dimension: usize,
}

impl TrainedEnsemble {
    pub fn models(&self) -> &[TrainedModel] {
        &self.models
    }

    pub fn dimensionality(&self) -> usize {
        self.dimension
    }

    /// 各ベクトルを全モデルで採点
    pub fn score(&self, features: &[FeatureVector]) -> Result<Vec<Vec<ModelOutput>>> {
        features
            .iter()
            .map(|vector| {
                self.models
                    .iter()
                    .map(|model| model.score(vector))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vote;

    struct FailingDetector;

    impl OutlierDetector for FailingDetector {
        fn name(&self) -> &str {
            "failing"
        }

        fn fit(&self, _samples: &[FeatureVector]) -> Result<TrainedModel> {
            Err(Error::model("failing", "always fails"))
        }
    }

    fn samples() -> Vec<FeatureVector> {
        (0..40)
            .map(|i| vec![(i % 8) as f64, (i % 5) as f64 * 0.5])
            .collect()
    }

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn test_trains_both_default_detectors() {
        let ensemble = ModelEnsemble::from_config(&EngineConfig::default());
        let (trained, summary) = ensemble.train(&samples(), &names()).unwrap();

        assert_eq!(trained.models().len(), 2);
        assert_eq!(summary.models_trained, vec!["isolation_forest", "one_class_svm"]);
        assert!(summary.failed_models.is_empty());

        let outputs = trained
            .score(&[vec![100.0, 100.0], vec![3.0, 1.0]])
            .unwrap();
        assert_eq!(outputs[0].len(), 2);
        assert_eq!(outputs[0][1].model, "one_class_svm");
        assert_eq!(outputs[0][1].vote, Vote::Outlier);
        // 遠い点ほどスコアが低い
        assert!(outputs[0][0].score < outputs[1][0].score);
        assert!(outputs[0][1].score < outputs[1][1].score);
    }

    #[test]
    fn test_failed_detector_is_dropped() {
        let config = EngineConfig::default();
        let ensemble = ModelEnsemble::with_detectors(
            vec![
                Box::new(FailingDetector),
                Box::new(IsolationForest::new(
                    config.isolation_forest.clone(),
                    config.random_seed,
                )),
            ],
            2,
        );
        let (trained, summary) = ensemble.train(&samples(), &names()).unwrap();
        assert_eq!(trained.models().len(), 1);
        assert_eq!(summary.failed_models, vec!["failing"]);
    }

    #[test]
    fn test_all_detectors_failing_is_insufficient_data() {
        let ensemble = ModelEnsemble::with_detectors(vec![Box::new(FailingDetector)], 2);
        let err = ensemble.train(&samples(), &names()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
        assert!(err.to_string().contains("failing: "));
    }

    #[test]
    fn test_too_few_samples() {
        let ensemble = ModelEnsemble::from_config(&EngineConfig::default());
        let err = ensemble.train(&[vec![1.0, 2.0]], &names()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
    }
}
