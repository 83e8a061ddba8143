use crate::config::LoggingSettings;
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const LOG_FILE_NAME: &str = "log-anomaly.log";

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error) または EnvFilter 式
    pub level: String,
    /// ログディレクトリ
    pub log_dir: PathBuf,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// ファイル出力有効
    pub file_enabled: bool,
    /// JSON 形式
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl LogRotation {
    fn parse(value: &str) -> Self {
        match value {
            "hourly" => LogRotation::Hourly,
            "never" => LogRotation::Never,
            _ => LogRotation::Daily,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: get_default_log_dir(),
            rotation: LogRotation::Daily,
            console_enabled: true,
            file_enabled: false,
            json: false,
        }
    }
}

impl LogConfig {
    /// アプリケーション設定からログ設定を作成
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            log_dir: settings
                .log_dir
                .clone()
                .unwrap_or_else(get_default_log_dir),
            rotation: LogRotation::parse(&settings.rotation),
            console_enabled: settings.console,
            file_enabled: settings.file,
            json: settings.json,
        }
    }

    /// ログレベルを上書き
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// ファイル出力制御
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }
}

/// デフォルトログディレクトリを取得
/// 優先順位：
/// 1. カレントディレクトリの logs フォルダ
/// 2. システムテンプディレクトリの log-anomaly フォルダ
fn get_default_log_dir() -> PathBuf {
    let current_log_dir = PathBuf::from("logs");
    if current_log_dir.is_dir() {
        return current_log_dir;
    }

    std::env::temp_dir().join("log-anomaly").join("logs")
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// ログシステムを初期化
///
/// ファイル出力が有効な場合、返されたガードが破棄されるまでバッファがフラッシュされる。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    // RUST_LOG が設定されていればそちらを優先
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if config.console_enabled || !config.file_enabled {
        // コンソール出力は stderr（stdout はレポート出力用）
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);
        if config.json {
            layers.push(console.json().boxed());
        } else {
            layers.push(console.boxed());
        }
    }

    if config.file_enabled {
        ensure_log_dir(&config.log_dir)?;
        let file_appender = match config.rotation {
            LogRotation::Daily => rolling::daily(&config.log_dir, LOG_FILE_NAME),
            LogRotation::Hourly => rolling::hourly(&config.log_dir, LOG_FILE_NAME),
            LogRotation::Never => rolling::never(&config.log_dir, LOG_FILE_NAME),
        };
        let (writer, file_guard) = non_blocking(file_appender);
        guard = Some(file_guard);

        let file = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        if config.json {
            layers.push(file.json().boxed());
        } else {
            layers.push(file.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    tracing::debug!(
        level = %config.level,
        console = config.console_enabled,
        file = config.file_enabled,
        log_dir = %config.log_dir.display(),
        "logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_log_config_from_settings() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            log_dir: Some(PathBuf::from("/var/log/anomaly")),
            rotation: "hourly".to_string(),
            console: false,
            file: true,
            json: true,
        };

        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir, PathBuf::from("/var/log/anomaly"));
        assert_eq!(config.rotation, LogRotation::Hourly);
        assert!(config.file_enabled);
        assert!(config.json);
    }

    #[test]
    fn test_ensure_log_dir() {
        let temp_dir = tempdir().unwrap();
        let log_dir = temp_dir.path().join("test_logs");

        assert!(ensure_log_dir(&log_dir).is_ok());
        assert!(log_dir.exists());
    }
}
