//! Configuration
//!
//! 既定値 → 設定ファイル（TOML）→ 環境変数 の順に重ね合わせる。

mod loader;
mod types;

pub use loader::{generate_sample_config, ConfigLoader};
pub use types::{
    AppConfig, DecisionConfig, EngineConfig, ExplanationConfig, FeatureConfig,
    IsolationForestConfig, LoggingSettings, OneClassSvmConfig,
};
