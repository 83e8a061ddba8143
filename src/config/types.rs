use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detection engine configuration
    pub engine: EngineConfig,

    /// Logging configuration
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// 設定値の範囲を検証
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.logging.validate()
    }
}

/// 検知エンジン設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 乱数シード（同一入力 + 同一シードで同一モデル）
    pub random_seed: u64,
    /// 学習に必要な最小サンプル数（2以上）
    pub min_training_samples: usize,
    /// 特徴量抽出設定
    pub features: FeatureConfig,
    /// Isolation Forest 設定
    pub isolation_forest: IsolationForestConfig,
    /// One-Class SVM 設定
    pub one_class_svm: OneClassSvmConfig,
    /// 判定設定
    pub decision: DecisionConfig,
    /// 説明文生成設定
    pub explanation: ExplanationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            min_training_samples: 2,
            features: FeatureConfig::default(),
            isolation_forest: IsolationForestConfig::default(),
            one_class_svm: OneClassSvmConfig::default(),
            decision: DecisionConfig::default(),
            explanation: ExplanationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 設定値の範囲を検証
    pub fn validate(&self) -> Result<()> {
        if self.min_training_samples < 2 {
            return Err(Error::Config(format!(
                "engine.min_training_samples must be at least 2, got {}",
                self.min_training_samples
            )));
        }
        if !self.isolation_forest.enabled && !self.one_class_svm.enabled {
            return Err(Error::Config(
                "at least one detector (isolation_forest, one_class_svm) must be enabled"
                    .to_string(),
            ));
        }
        self.features.validate()?;
        self.isolation_forest.validate()?;
        self.one_class_svm.validate()?;
        self.decision.validate()?;
        self.explanation.validate()
    }
}

/// 特徴量抽出設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// カテゴリ特徴量として扱うフィールド（宣言順 = 特徴量順）
    pub categorical_fields: Vec<String>,
    /// 自由テキストフィールド（最初に存在するものを使用）
    pub text_fields: Vec<String>,
    /// TF-IDF 特徴量の有効化
    pub tfidf_enabled: bool,
    /// TF-IDF 語彙の上限
    pub tfidf_max_features: usize,
    /// n-gram の最小長
    pub ngram_min: usize,
    /// n-gram の最大長
    pub ngram_max: usize,
    /// エラー指標キーワード
    pub error_keywords: Vec<String>,
    /// 内部 IP とみなすプレフィックス
    pub internal_ip_prefixes: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            categorical_fields: strings(&["user", "action", "ip_address", "status"]),
            text_fields: strings(&["message", "raw_log", "request"]),
            tfidf_enabled: true,
            tfidf_max_features: 1000,
            ngram_min: 1,
            ngram_max: 2,
            error_keywords: strings(&[
                "error",
                "fail",
                "exception",
                "denied",
                "timeout",
                "refused",
                "404",
                "500",
                "503",
            ]),
            internal_ip_prefixes: strings(&["192.168.", "10.", "172."]),
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<()> {
        if self.tfidf_max_features == 0 {
            return Err(Error::Config(
                "features.tfidf_max_features must be positive".to_string(),
            ));
        }
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(Error::Config(format!(
                "features.ngram range ({}, {}) is invalid",
                self.ngram_min, self.ngram_max
            )));
        }
        Ok(())
    }
}

/// Isolation Forest 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    /// 有効化フラグ
    pub enabled: bool,
    /// ツリー数
    pub n_estimators: usize,
    /// ツリーごとのサブサンプル上限
    pub max_samples: usize,
    /// 学習データ中の想定異常割合 (0, 0.5]
    pub contamination: f64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_estimators: 200,
            max_samples: 256,
            contamination: 0.1,
        }
    }
}

impl IsolationForestConfig {
    fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(Error::Config(format!(
                "isolation_forest.contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 || self.max_samples < 2 {
            return Err(Error::Config(format!(
                "isolation_forest requires n_estimators >= 1 and max_samples >= 2, got {} / {}",
                self.n_estimators, self.max_samples
            )));
        }
        Ok(())
    }
}

/// One-Class SVM 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneClassSvmConfig {
    /// 有効化フラグ
    pub enabled: bool,
    /// 学習データ外れ値割合の上限 (0, 1]
    pub nu: f64,
    /// RBF カーネル係数（未指定時は "scale" = 1 / (次元数 * 分散)）
    pub gamma: Option<f64>,
    /// SMO 停止許容誤差
    pub tolerance: f64,
    /// SMO 最大反復回数
    pub max_iterations: usize,
    /// 学習に使う最大サンプル数（超過時はシード付きでサブサンプル）
    pub max_training_samples: usize,
}

impl Default for OneClassSvmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nu: 0.1,
            gamma: None,
            tolerance: 1e-3,
            max_iterations: 100_000,
            max_training_samples: 2048,
        }
    }
}

impl OneClassSvmConfig {
    fn validate(&self) -> Result<()> {
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(Error::Config(format!(
                "one_class_svm.nu must be in (0, 1], got {}",
                self.nu
            )));
        }
        if let Some(gamma) = self.gamma {
            if !(gamma > 0.0 && gamma.is_finite()) {
                return Err(Error::Config(format!(
                    "one_class_svm.gamma must be positive, got {}",
                    gamma
                )));
            }
        }
        if self.tolerance <= 0.0 || self.max_iterations == 0 || self.max_training_samples < 2 {
            return Err(Error::Config(
                "one_class_svm tolerance, max_iterations and max_training_samples must be positive"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// 重大度判定のしきい値
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// この値未満の信頼度スコアは High
    pub high_severity_below: f64,
    /// この値未満の信頼度スコアは Medium
    pub medium_severity_below: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            high_severity_below: -0.5,
            medium_severity_below: -0.2,
        }
    }
}

impl DecisionConfig {
    fn validate(&self) -> Result<()> {
        if self.high_severity_below > self.medium_severity_below {
            return Err(Error::Config(format!(
                "decision.high_severity_below ({}) must not exceed medium_severity_below ({})",
                self.high_severity_below, self.medium_severity_below
            )));
        }
        Ok(())
    }
}

/// 説明文生成設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// この時刻より前の活動は不審
    pub active_hours_start: u32,
    /// この時刻より後の活動は不審
    pub active_hours_end: u32,
    /// 長すぎるメッセージの文字数
    pub long_message_threshold: usize,
    /// 信頼度ラベルを説明文に含める
    pub confidence_label: bool,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            active_hours_start: 6,
            active_hours_end: 22,
            long_message_threshold: 500,
            confidence_label: true,
        }
    }
}

impl ExplanationConfig {
    fn validate(&self) -> Result<()> {
        if self.active_hours_start > 23
            || self.active_hours_end > 23
            || self.active_hours_start > self.active_hours_end
        {
            return Err(Error::Config(format!(
                "explanation active hours {}..{} are invalid",
                self.active_hours_start, self.active_hours_end
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    /// ログディレクトリ（未指定時は既定の場所）
    pub log_dir: Option<PathBuf>,
    /// ローテーション (daily, hourly, never)
    pub rotation: String,
    /// コンソール出力
    pub console: bool,
    /// ファイル出力
    pub file: bool,
    /// JSON 形式で出力
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            rotation: "daily".to_string(),
            console: true,
            file: false,
            json: false,
        }
    }
}

impl LoggingSettings {
    fn validate(&self) -> Result<()> {
        match self.rotation.as_str() {
            "daily" | "hourly" | "never" => Ok(()),
            other => Err(Error::Config(format!(
                "logging.rotation must be daily, hourly or never, got '{}'",
                other
            ))),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
