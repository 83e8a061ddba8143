//! Feature Extraction
//!
//! ログレコードから固定長の数値特徴量ベクトルを抽出します。
//!
//! ブロック順: 時刻 → カテゴリ → テキスト (TF-IDF) → 数値。

use super::encoder::{placeholder, CategoricalEncoder};
use super::scaler::ScalarScaler;
use super::schema::{FeatureSchema, FALLBACK_DIMENSION};
use super::temporal::{parse_timestamp, TemporalParts};
use super::text::TfidfVectorizer;
use super::FeatureVector;
use crate::config::FeatureConfig;
use crate::error::{Error, Result};
use crate::record::{fields, LogRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 数値特徴量の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericFeature {
    MessageLength,
    WordCount,
    ContainsErrorKeywords,
    IsWeekend,
    IsInternalIp,
    IsErrorStatus,
}

impl NumericFeature {
    pub fn name(&self) -> &'static str {
        match self {
            NumericFeature::MessageLength => "message_length",
            NumericFeature::WordCount => "word_count",
            NumericFeature::ContainsErrorKeywords => "contains_error_keywords",
            NumericFeature::IsWeekend => "is_weekend",
            NumericFeature::IsInternalIp => "is_internal_ip",
            NumericFeature::IsErrorStatus => "is_error_status",
        }
    }
}

/// 学習済みの数値特徴量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScaledFeature {
    feature: NumericFeature,
    scaler: ScalarScaler,
}

/// 学習で確定したレイアウト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedLayout {
    schema: FeatureSchema,
    temporal: bool,
    encoders: Vec<CategoricalEncoder>,
    tfidf: Option<TfidfVectorizer>,
    numeric: Vec<ScaledFeature>,
}

/// 1レコードから読み取った生の値
struct RawRecord<'a> {
    temporal: TemporalParts,
    text: Option<std::borrow::Cow<'a, str>>,
    ip_address: Option<std::borrow::Cow<'a, str>>,
    status_code: Option<std::borrow::Cow<'a, str>>,
}

/// 特徴量抽出器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtractor {
    /// 設定
    config: FeatureConfig,
    /// 学習済みレイアウト
    layout: Option<FittedLayout>,
}

impl FeatureExtractor {
    /// 未学習の特徴量抽出器を作成
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            layout: None,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.layout.is_some()
    }

    /// 学習済みスキーマ
    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.layout.as_ref().map(|layout| &layout.schema)
    }

    /// 学習済みエンコーダ
    pub fn encoders(&self) -> &[CategoricalEncoder] {
        self.layout
            .as_ref()
            .map(|layout| layout.encoders.as_slice())
            .unwrap_or(&[])
    }

    /// 学習モード: スキーマ・エンコーダ・スケーラ・語彙を学習して変換
    pub fn fit_transform(&mut self, records: &[LogRecord]) -> Result<Vec<FeatureVector>> {
        let raw: Vec<RawRecord<'_>> = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.read_raw(index, record))
            .collect();

        let temporal = records.iter().any(|r| r.contains(fields::TIMESTAMP));

        let encoders: Vec<CategoricalEncoder> = self
            .config
            .categorical_fields
            .iter()
            .filter(|field| records.iter().any(|r| r.contains(field)))
            .map(|field| {
                CategoricalEncoder::fit(
                    field.as_str(),
                    records.iter().map(|r| categorical_value(r, field)),
                )
            })
            .collect();

        let has_text = raw.iter().any(|r| r.text.is_some());
        let tfidf = if self.config.tfidf_enabled && has_text {
            let documents: Vec<&str> = raw.iter().filter_map(|r| r.text.as_deref()).collect();
            let mut vectorizer = TfidfVectorizer::new(
                self.config.tfidf_max_features,
                (self.config.ngram_min, self.config.ngram_max),
            );
            vectorizer.fit(&documents);
            if vectorizer.is_empty() {
                debug!("TF-IDF vocabulary is empty, content block not declared");
                None
            } else {
                Some(vectorizer)
            }
        } else {
            None
        };

        let mut declared = Vec::new();
        if has_text {
            declared.extend([
                NumericFeature::MessageLength,
                NumericFeature::WordCount,
                NumericFeature::ContainsErrorKeywords,
            ]);
        }
        if temporal {
            declared.push(NumericFeature::IsWeekend);
        }
        if records.iter().any(|r| r.contains(fields::IP_ADDRESS)) {
            declared.push(NumericFeature::IsInternalIp);
        }
        if records.iter().any(|r| r.contains(fields::STATUS_CODE)) {
            declared.push(NumericFeature::IsErrorStatus);
        }

        let numeric = declared
            .into_iter()
            .map(|feature| {
                let values: Vec<f64> = raw.iter().map(|r| self.numeric_value(feature, r)).collect();
                ScaledFeature {
                    feature,
                    scaler: ScalarScaler::fit(&values),
                }
            })
            .collect::<Vec<_>>();

        let mut names = Vec::new();
        if temporal {
            names.push("hour_of_day".to_string());
            names.push("day_of_week".to_string());
        }
        names.extend(encoders.iter().map(CategoricalEncoder::feature_name));
        if let Some(vectorizer) = &tfidf {
            names.extend(vectorizer.feature_names());
        }
        names.extend(numeric.iter().map(|n| n.feature.name().to_string()));

        let schema = if names.is_empty() {
            warn!("No feature block applies to the training batch, using fallback schema");
            FeatureSchema::fallback()
        } else {
            FeatureSchema::new(names)
        };

        debug!(
            "Fitted feature schema: {} dimensions ({} categorical, {} tfidf terms, {} numeric)",
            schema.dimensionality(),
            encoders.len(),
            tfidf.as_ref().map(TfidfVectorizer::len).unwrap_or(0),
            numeric.len()
        );

        let layout = FittedLayout {
            schema,
            temporal,
            encoders,
            tfidf,
            numeric,
        };
        let vectors = records
            .iter()
            .zip(&raw)
            .map(|(record, raw)| self.vectorize(&layout, record, raw))
            .collect::<Result<Vec<_>>>()?;

        self.layout = Some(layout);
        Ok(vectors)
    }

    /// 予測モード: 学習済みレイアウトをそのまま使って変換
    pub fn transform(&self, records: &[LogRecord]) -> Result<Vec<FeatureVector>> {
        let layout = self.layout.as_ref().ok_or_else(|| {
            Error::NotTrained("feature extractor has not been fitted".to_string())
        })?;

        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let raw = self.read_raw(index, record);
                self.vectorize(layout, record, &raw)
            })
            .collect()
    }

    fn read_raw<'a>(&self, index: usize, record: &'a LogRecord) -> RawRecord<'a> {
        let temporal = match record.timestamp() {
            Some(value) => parse_timestamp(value).unwrap_or_else(|| {
                warn!(
                    "Record {}: unparseable timestamp '{}', defaulting to noon Monday",
                    index,
                    value.as_text()
                );
                TemporalParts::default()
            }),
            None => TemporalParts::default(),
        };

        RawRecord {
            temporal,
            text: record.text_content(&self.config.text_fields),
            ip_address: record.ip_address(),
            status_code: record.status_code(),
        }
    }

    fn vectorize(
        &self,
        layout: &FittedLayout,
        record: &LogRecord,
        raw: &RawRecord<'_>,
    ) -> Result<FeatureVector> {
        if layout.schema.is_fallback() {
            return Ok(vec![0.0; FALLBACK_DIMENSION]);
        }

        let mut vector = Vec::with_capacity(layout.schema.dimensionality());

        if layout.temporal {
            vector.push(raw.temporal.hour as f64);
            vector.push(raw.temporal.day_of_week as f64);
        }

        for encoder in &layout.encoders {
            vector.push(encoder.encode(&categorical_value(record, encoder.field())));
        }

        if let Some(vectorizer) = &layout.tfidf {
            vector.extend(vectorizer.transform(raw.text.as_deref().unwrap_or("")));
        }

        for scaled in &layout.numeric {
            vector.push(scaled.scaler.transform(self.numeric_value(scaled.feature, raw)));
        }

        layout.schema.check_dimension("feature extraction", vector.len())?;
        Ok(vector)
    }

    fn numeric_value(&self, feature: NumericFeature, raw: &RawRecord<'_>) -> f64 {
        let text = raw.text.as_deref().unwrap_or("");
        match feature {
            NumericFeature::MessageLength => text.chars().count() as f64,
            NumericFeature::WordCount => text.split_whitespace().count() as f64,
            NumericFeature::ContainsErrorKeywords => {
                flag(contains_error_keyword(text, &self.config.error_keywords))
            }
            NumericFeature::IsWeekend => flag(raw.temporal.is_weekend()),
            NumericFeature::IsInternalIp => {
                let ip = raw
                    .ip_address
                    .as_deref()
                    .unwrap_or(placeholder(fields::IP_ADDRESS));
                flag(
                    self.config
                        .internal_ip_prefixes
                        .iter()
                        .any(|prefix| ip.starts_with(prefix.as_str())),
                )
            }
            NumericFeature::IsErrorStatus => flag(
                raw.status_code
                    .as_deref()
                    .map(is_error_status)
                    .unwrap_or(false),
            ),
        }
    }
}

/// テキストにエラー指標キーワードが含まれるか（大文字小文字を区別しない）
pub fn contains_error_keyword<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lowered.contains(&keyword.as_ref().to_lowercase()))
}

/// HTTP ステータスコードが 4xx / 5xx か
pub fn is_error_status(code: &str) -> bool {
    let code = code.trim();
    code.starts_with('4') || code.starts_with('5')
}

fn categorical_value(record: &LogRecord, field: &str) -> String {
    record
        .text(field)
        .map(|value| value.into_owned())
        .unwrap_or_else(|| placeholder(field).to_string())
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hour: u32, user: &str, message: &str) -> LogRecord {
        LogRecord::new()
            .with("timestamp", format!("2024-01-17T{:02}:15:00", hour))
            .with("user", user)
            .with("action", "login")
            .with("ip_address", "192.168.1.10")
            .with("status", "success")
            .with("message", message)
    }

    fn training_batch() -> Vec<LogRecord> {
        vec![
            record(9, "alice", "user logged in"),
            record(10, "bob", "file downloaded successfully"),
            record(11, "alice", "report generated"),
            record(14, "carol", "connection timeout error"),
        ]
    }

    #[test]
    fn test_schema_block_order() {
        let mut extractor = FeatureExtractor::new(FeatureConfig::default());
        extractor.fit_transform(&training_batch()).unwrap();

        let names = extractor.schema().unwrap().names();
        assert_eq!(names[0], "hour_of_day");
        assert_eq!(names[1], "day_of_week");
        assert_eq!(names[2], "user_encoded");
        assert_eq!(names[5], "status_encoded");
        assert!(names[6].starts_with("tfidf:"));
        let tail: Vec<&str> = names[names.len() - 5..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "message_length",
                "word_count",
                "contains_error_keywords",
                "is_weekend",
                "is_internal_ip",
            ]
        );
    }

    #[test]
    fn test_transform_requires_fit() {
        let extractor = FeatureExtractor::new(FeatureConfig::default());
        assert!(matches!(
            extractor.transform(&training_batch()),
            Err(Error::NotTrained(_))
        ));
    }

    #[test]
    fn test_unseen_category_encodes_to_sentinel() {
        let mut extractor = FeatureExtractor::new(FeatureConfig::default());
        extractor.fit_transform(&training_batch()).unwrap();

        let vectors = extractor
            .transform(&[record(12, "mallory", "user logged in")])
            .unwrap();
        let index = extractor.schema().unwrap().index_of("user_encoded").unwrap();
        assert_eq!(vectors[0][index], -1.0);
    }

    #[test]
    fn test_missing_categorical_fields_keep_dimension() {
        let mut extractor = FeatureExtractor::new(FeatureConfig::default());
        extractor.fit_transform(&training_batch()).unwrap();
        let dimension = extractor.schema().unwrap().dimensionality();

        let sparse = LogRecord::new().with("timestamp", "2024-01-17T12:00:00");
        let vectors = extractor.transform(&[sparse]).unwrap();
        assert_eq!(vectors[0].len(), dimension);
    }

    #[test]
    fn test_fallback_when_no_block_applies() {
        let mut extractor = FeatureExtractor::new(FeatureConfig::default());
        let records = vec![
            LogRecord::new().with("severity", "low"),
            LogRecord::new().with("severity", "high"),
        ];
        let vectors = extractor.fit_transform(&records).unwrap();
        assert!(extractor.schema().unwrap().is_fallback());
        assert_eq!(vectors[0], vec![0.0; FALLBACK_DIMENSION]);
    }

    #[test]
    fn test_unparseable_timestamp_defaults_to_noon() {
        let mut extractor = FeatureExtractor::new(FeatureConfig::default());
        extractor.fit_transform(&training_batch()).unwrap();

        let broken = record(9, "alice", "user logged in").with("timestamp", "not a time");
        let vectors = extractor.transform(&[broken]).unwrap();
        assert_eq!(vectors[0][0], 12.0);
        assert_eq!(vectors[0][1], 0.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let mut first = FeatureExtractor::new(FeatureConfig::default());
        let mut second = FeatureExtractor::new(FeatureConfig::default());
        let a = first.fit_transform(&training_batch()).unwrap();
        let b = second.fit_transform(&training_batch()).unwrap();
        assert_eq!(a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn test_error_status_helpers() {
        assert!(is_error_status("404"));
        assert!(is_error_status("503"));
        assert!(!is_error_status("200"));
        assert!(contains_error_keyword("Connection REFUSED", &["refused"]));
    }
}
