//! Feature Pipeline
//!
//! 異種・部分欠損のログフィールドを一貫した数値表現に変換する。

mod encoder;
mod extractor;
mod scaler;
mod schema;
mod temporal;
mod text;

pub use encoder::{placeholder, CategoricalEncoder, UNSEEN_CODE};
pub use extractor::{contains_error_keyword, is_error_status, FeatureExtractor, NumericFeature};
pub use scaler::ScalarScaler;
pub use schema::{FeatureSchema, FALLBACK_DIMENSION};
pub use temporal::{parse_timestamp, TemporalParts};
pub use text::TfidfVectorizer;

/// 特徴量ベクトル（スキーマの次元・順序に従う）
pub type FeatureVector = Vec<f64>;
