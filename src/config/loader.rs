use super::types::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from environment variables
    /// (`LOG_ANOMALY_ENGINE__ISOLATION_FOREST__CONTAMINATION=0.05`)
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<AppConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            // Try to load from standard locations
            builder = builder
                .add_source(File::with_name("log-anomaly").required(false))
                .add_source(File::with_name("config/log-anomaly").required(false));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("LOG_ANOMALY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a commented sample configuration file
pub fn generate_sample_config() -> Result<String> {
    let toml_content = toml::to_string_pretty(&AppConfig::default())
        .context("Failed to render sample configuration")?;

    Ok(format!(
        r#"# log-anomaly configuration
#
# Save as log-anomaly.toml. Environment variables override file values,
# e.g. LOG_ANOMALY_ENGINE__ISOLATION_FOREST__CONTAMINATION=0.05
#
# [engine.isolation_forest]  contamination = expected outlier share of training data
# [engine.one_class_svm]     gamma omitted = "scale" (1 / (dims * variance))
# [engine.decision]          severity ladder on the ensemble confidence score

{}"#,
        toml_content
    ))
}
