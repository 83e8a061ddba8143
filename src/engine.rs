//! Anomaly Engine
//!
//! 特徴量抽出 → アンサンブル学習/採点 → 判定統合 → 説明文生成 を束ねる。
//!
//! 学習は不変の [`EnsembleState`] を返すだけで、所有者がそれを丸ごと差し替える。
//! エンジン自体は同期・CPU バウンドで内部ロックを持たない。

use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionCombiner, Severity};
use crate::error::{Error, Result};
use crate::explain::{ExplanationGenerator, ThreatCategory};
use crate::features::{FeatureExtractor, FeatureSchema};
use crate::models::{ModelEnsemble, ModelOutput, TrainedEnsemble, TrainingSummary};
use crate::record::LogRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// モデルブロブの形式バージョン
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// 学習済み状態（抽出器 + モデル群 + 学習概要）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleState {
    extractor: FeatureExtractor,
    ensemble: TrainedEnsemble,
    summary: TrainingSummary,
}

impl EnsembleState {
    pub fn summary(&self) -> &TrainingSummary {
        &self.summary
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn ensemble(&self) -> &TrainedEnsemble {
        &self.ensemble
    }

    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.extractor.schema()
    }
}

/// レコードごとの判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// バッチ内の位置
    pub index: usize,
    pub is_anomaly: bool,
    pub confidence_score: f64,
    pub severity: Severity,
    pub threat_category: ThreatCategory,
    pub explanation: String,
    /// モデルごとの投票
    pub votes: Vec<ModelOutput>,
    /// 元のレコード
    pub record: LogRecord,
}

/// 永続化形式
#[derive(Debug, Serialize, Deserialize)]
struct ModelBlob {
    format_version: u32,
    fingerprint: String,
    categorical_fields: Vec<String>,
    state: EnsembleState,
}

/// 異常検知エンジン
#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    config: Arc<EngineConfig>,
    combiner: DecisionCombiner,
    explainer: ExplanationGenerator,
    state: Option<Arc<EnsembleState>>,
}

impl AnomalyEngine {
    /// 設定を検証してエンジンを作成
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            combiner: DecisionCombiner::new(config.decision.clone()),
            explainer: ExplanationGenerator::new(config.explanation.clone(), &config.features),
            config: Arc::new(config),
            state: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    /// 現在の学習済み状態
    pub fn state(&self) -> Option<&Arc<EnsembleState>> {
        self.state.as_ref()
    }

    /// 学習して新しい状態を返す（自身の状態は変更しない）
    pub fn train(&self, records: &[LogRecord]) -> Result<EnsembleState> {
        self.train_with(records, &ModelEnsemble::from_config(&self.config))
    }

    /// 指定した検知器群で学習
    pub fn train_with(
        &self,
        records: &[LogRecord],
        ensemble: &ModelEnsemble,
    ) -> Result<EnsembleState> {
        if records.len() < self.config.min_training_samples {
            return Err(Error::InsufficientData(format!(
                "{} training records provided, at least {} required",
                records.len(),
                self.config.min_training_samples
            )));
        }

        info!("Training anomaly engine on {} records", records.len());

        let mut extractor = FeatureExtractor::new(self.config.features.clone());
        let vectors = extractor.fit_transform(records)?;
        let feature_names = extractor
            .schema()
            .map(|schema| schema.names().to_vec())
            .unwrap_or_default();

        let (ensemble, summary) = ensemble.train(&vectors, &feature_names)?;

        Ok(EnsembleState {
            extractor,
            ensemble,
            summary,
        })
    }

    /// 学習済み状態を差し替え
    pub fn install(&mut self, state: EnsembleState) -> Arc<EnsembleState> {
        let state = Arc::new(state);
        self.state = Some(Arc::clone(&state));
        state
    }

    /// 学習して状態を差し替え
    pub fn fit(&mut self, records: &[LogRecord]) -> Result<TrainingSummary> {
        let state = self.train(records)?;
        let summary = state.summary.clone();
        self.install(state);
        Ok(summary)
    }

    /// レコードを採点して判定を返す
    pub fn predict(&self, records: &[LogRecord]) -> Result<Vec<Verdict>> {
        let state = self.state.as_ref().ok_or_else(|| {
            Error::NotTrained("predict called before a successful training run".to_string())
        })?;
        self.predict_with(state, records)
    }

    /// 指定した状態で採点
    pub fn predict_with(&self, state: &EnsembleState, records: &[LogRecord]) -> Result<Vec<Verdict>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = state.extractor.transform(records)?;
        let outputs = state.ensemble.score(&vectors)?;

        let verdicts: Vec<Verdict> = records
            .iter()
            .zip(outputs)
            .enumerate()
            .map(|(index, (record, votes))| {
                let decision = self.combiner.combine(&votes);
                self.verdict(index, record, decision, votes)
            })
            .collect();

        debug!(
            "Scored {} records, {} anomalous",
            verdicts.len(),
            verdicts.iter().filter(|v| v.is_anomaly).count()
        );

        Ok(verdicts)
    }

    fn verdict(
        &self,
        index: usize,
        record: &LogRecord,
        decision: Decision,
        votes: Vec<ModelOutput>,
    ) -> Verdict {
        Verdict {
            index,
            is_anomaly: decision.is_anomaly,
            confidence_score: decision.confidence_score,
            severity: decision.severity,
            threat_category: self.explainer.categorize(record, &decision),
            explanation: self.explainer.explain(record, &decision),
            votes,
            record: record.clone(),
        }
    }

    /// 学習済み状態を JSON ブロブに変換
    pub fn to_blob(&self) -> Result<String> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::NotTrained("no trained state to serialize".to_string()))?;
        let schema = state
            .schema()
            .ok_or_else(|| Error::NotTrained("feature extractor is not fitted".to_string()))?;

        let blob = ModelBlob {
            format_version: MODEL_FORMAT_VERSION,
            fingerprint: schema.fingerprint(),
            categorical_fields: self.config.features.categorical_fields.clone(),
            state: EnsembleState::clone(state),
        };
        Ok(serde_json::to_string(&blob)?)
    }

    /// JSON ブロブから状態を復元（現在の設定との互換性を検証）
    pub fn load_blob(&self, blob: &str) -> Result<EnsembleState> {
        let blob: ModelBlob = serde_json::from_str(blob)
            .map_err(|e| Error::Load(format!("model blob is not readable: {}", e)))?;

        if blob.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::Load(format!(
                "unsupported model format version {} (expected {})",
                blob.format_version, MODEL_FORMAT_VERSION
            )));
        }

        let expected_fields = &self.config.features.categorical_fields;
        if &blob.categorical_fields != expected_fields
            || &blob.state.extractor.config().categorical_fields != expected_fields
        {
            return Err(Error::Load(format!(
                "categorical fields {:?} do not match configured {:?}",
                blob.categorical_fields, expected_fields
            )));
        }

        if blob.state.extractor.config() != &self.config.features {
            return Err(Error::Load(
                "feature extraction settings in blob do not match the configured extractor"
                    .to_string(),
            ));
        }

        let schema = blob
            .state
            .schema()
            .ok_or_else(|| Error::Load("feature extractor in blob is not fitted".to_string()))?;
        if schema.fingerprint() != blob.fingerprint
            || schema.names() != blob.state.summary.feature_names.as_slice()
        {
            return Err(Error::Load(
                "feature names do not match the stored fingerprint".to_string(),
            ));
        }

        if blob.state.extractor.encoders().iter().any(|encoder| {
            !expected_fields.iter().any(|field| field == encoder.field())
        }) {
            return Err(Error::Load(
                "blob contains encoders for unconfigured fields".to_string(),
            ));
        }

        let dimension = schema.dimensionality();
        if blob.state.ensemble.models().is_empty() {
            return Err(Error::Load("blob contains no trained models".to_string()));
        }
        if blob.state.ensemble.dimensionality() != dimension
            || blob
                .state
                .ensemble
                .models()
                .iter()
                .any(|model| model.dimensionality() != dimension)
        {
            return Err(Error::Load(format!(
                "model dimensionality does not match the {}-dimensional feature schema",
                dimension
            )));
        }

        info!(
            "Loaded model state: {} features, models {:?}",
            dimension, blob.state.summary.models_trained
        );
        Ok(blob.state)
    }

    /// ブロブをファイルに保存
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        let blob = self.to_blob()?;
        std::fs::write(path.as_ref(), blob)?;
        info!("Model saved to {}", path.as_ref().display());
        Ok(())
    }

    /// ファイルからブロブを読み込んで状態を差し替え
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<TrainingSummary> {
        let blob = std::fs::read_to_string(path.as_ref())?;
        let state = self.load_blob(&blob)?;
        let summary = state.summary.clone();
        self.install(state);
        Ok(summary)
    }
}
