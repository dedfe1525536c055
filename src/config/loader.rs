use super::types::{PipelineConfig, WordPressConfig};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use tracing::debug;

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
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&PipelineConfig::default())?);

        if let Some(config_path) = &self.config_file {
            // 明示指定されたファイルは必須
            builder = builder.add_source(File::with_name(config_path).required(true));
        } else {
            // Try to load from standard locations
            builder = builder
                .add_source(File::with_name("contentflow").required(false))
                .add_source(File::with_name("config/contentflow").required(false));
        }

        if self.load_env {
            // 例: CONTENTFLOW_LIFECYCLE__SLA_DAYS=3
            builder = builder.add_source(
                Environment::with_prefix("CONTENTFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("links.affiliate_domains"),
            );
        }

        let mut config: PipelineConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if self.load_env {
            apply_wordpress_env(&mut config, |key| std::env::var(key).ok());
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid configuration")?;

        debug!(
            sla_days = config.lifecycle.sla_days,
            batch = config.lifecycle.batch_size(),
            publish_enabled = config.wordpress.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// WORDPRESS_URL / WORDPRESS_USERNAME / WORDPRESS_PASSWORD による上書き
pub(crate) fn apply_wordpress_env<F>(config: &mut PipelineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(url) = lookup("WORDPRESS_URL") else {
        return;
    };

    match config.wordpress {
        None => {
            config.wordpress = Some(WordPressConfig {
                url,
                username: lookup("WORDPRESS_USERNAME").unwrap_or_default(),
                password: lookup("WORDPRESS_PASSWORD").unwrap_or_default(),
                post_status: "publish".to_string(),
                enabled: Some(true),
                timeout_seconds: Some(30),
            });
        }
        Some(ref mut wp) => {
            wp.url = url;
            if let Some(username) = lookup("WORDPRESS_USERNAME") {
                wp.username = username;
            }
            if let Some(password) = lookup("WORDPRESS_PASSWORD") {
                wp.password = password;
            }
        }
    }
}
