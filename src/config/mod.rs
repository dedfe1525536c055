//! Pipeline configuration
//!
//! 既定値 → TOMLファイル → 環境変数 の順に設定を重ねる

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    DuplicateConfig, LifecycleConfig, LinkConfig, LoggingSettings, PipelineConfig,
    ValidationConfig, WordPressConfig, MAX_SWEEP_BATCH,
};

use crate::error::{Error, Result};
use std::path::Path;

impl PipelineConfig {
    /// 設定ファイルから読み込み、環境変数で上書き
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        ConfigLoader::new().load_from_file(path).load_from_env().build()
    }

    /// Reject values the pipeline cannot operate with
    pub fn validate(&self) -> Result<()> {
        let lifecycle = &self.lifecycle;
        if lifecycle.sla_days == 0 {
            return Err(Error::Config("lifecycle.sla_days must be at least 1".into()));
        }
        if lifecycle.sweep_batch_size == 0 || lifecycle.sweep_batch_size > MAX_SWEEP_BATCH {
            return Err(Error::Config(format!(
                "lifecycle.sweep_batch_size must be between 1 and {}",
                MAX_SWEEP_BATCH
            )));
        }
        if lifecycle.item_timeout_seconds == 0 {
            return Err(Error::Config(
                "lifecycle.item_timeout_seconds must be at least 1".into(),
            ));
        }

        let validation = &self.validation;
        if validation.title_min_chars > validation.title_max_chars {
            return Err(Error::Config(
                "validation.title_min_chars exceeds validation.title_max_chars".into(),
            ));
        }

        let duplicates = &self.duplicates;
        for (name, value) in [
            ("keyword_overlap_threshold", duplicates.keyword_overlap_threshold),
            ("title_similarity_threshold", duplicates.title_similarity_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Config(format!(
                    "duplicates.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if let Some(wp) = &self.wordpress {
            let parsed = url::Url::parse(&wp.url)
                .map_err(|e| Error::Config(format!("wordpress.url is invalid: {}", e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config("wordpress.url must be http or https".into()));
            }
        }

        Ok(())
    }

    /// Publish target, when configured and enabled
    pub fn publish_target(&self) -> Option<&WordPressConfig> {
        self.wordpress.as_ref().filter(|wp| wp.is_enabled())
    }

    /// サンプル設定ファイルを生成
    pub fn generate_sample_config(path: &Path) -> anyhow::Result<()> {
        let mut sample = PipelineConfig::default();
        sample.links.site_domain = "your-site.com".to_string();
        sample.links.affiliate_domains = vec!["partner.example.org".to_string()];
        sample.wordpress = Some(WordPressConfig {
            url: "https://your-wordpress-site.com".to_string(),
            username: "your_username".to_string(),
            password: "your_application_password".to_string(),
            post_status: "publish".to_string(),
            enabled: Some(true),
            timeout_seconds: Some(30),
        });

        let toml_content = toml::to_string_pretty(&sample)?;
        let content = format!(
            r#"# contentflow configuration
#
# Save as contentflow.toml. Environment overrides use the CONTENTFLOW_ prefix
# and `__` between sections, e.g. CONTENTFLOW_LIFECYCLE__SLA_DAYS=3.
# WORDPRESS_URL / WORDPRESS_USERNAME / WORDPRESS_PASSWORD are also honoured.

{}
# [lifecycle]
# sla_days             = days before an unreviewed article is decided by the sweep
# sweep_batch_size     = items per sweep (max {})
# item_timeout_seconds = processing budget per item
#
# [validation]
# min_word_count = hard minimum for approval
# type_minimums  = per content type overrides, e.g. {{ listicle = 800 }}
#
# [wordpress]
# password = Application Password (Users > Profile > Application Passwords)
"#,
            toml_content, MAX_SWEEP_BATCH
        );

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.lifecycle.sla_days, 5);
        assert_eq!(config.lifecycle.batch_size(), 50);
        assert_eq!(config.validation.min_word_count, 1000);
        assert!(config.wordpress.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.lifecycle.sweep_batch_size = 500;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.duplicates.keyword_overlap_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.wordpress = Some(WordPressConfig {
            url: "ftp://cms".to_string(),
            username: String::new(),
            password: String::new(),
            post_status: "draft".to_string(),
            enabled: None,
            timeout_seconds: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_type_minimums() {
        let mut config = ValidationConfig::default();
        config.type_minimums.insert("listicle".to_string(), 800);
        assert_eq!(config.minimum_for("listicle"), 800);
        assert_eq!(config.minimum_for("article"), 1000);
    }
}
