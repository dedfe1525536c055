use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hard upper bound on items handled by one sweep invocation
pub const MAX_SWEEP_BATCH: usize = 50;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Logging configuration
    pub logging: LoggingSettings,

    /// Lifecycle / SLA sweep settings
    pub lifecycle: LifecycleConfig,

    /// Content validation thresholds
    pub validation: ValidationConfig,

    /// Link classification settings
    pub links: LinkConfig,

    /// Duplicate detection heuristics
    pub duplicates: DuplicateConfig,

    /// Publish target; publishing is disabled when absent
    pub wordpress: Option<WordPressConfig>,
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// ログレベル (trace, debug, info, warn, error) or an EnvFilter directive
    pub level: String,
    /// ログディレクトリ (未指定ならデフォルト)
    pub log_dir: Option<String>,
    /// ファイル出力有効
    pub file_enabled: bool,
    /// JSON形式で出力
    pub json: bool,
    /// daily | hourly | never
    pub rotation: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_enabled: false,
            json: false,
            rotation: "daily".to_string(),
        }
    }
}

/// ライフサイクル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Days an article may sit in pending_review before the sweep decides
    pub sla_days: u32,
    /// Items per sweep invocation (capped at [`MAX_SWEEP_BATCH`])
    pub sweep_batch_size: usize,
    /// Per-item processing budget in seconds
    pub item_timeout_seconds: u64,
    /// Publish immediately after approval when a target is configured
    pub publish_on_approve: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sla_days: 5,
            sweep_batch_size: MAX_SWEEP_BATCH,
            item_timeout_seconds: 60,
            publish_on_approve: true,
        }
    }
}

impl LifecycleConfig {
    pub fn batch_size(&self) -> usize {
        self.sweep_batch_size.clamp(1, MAX_SWEEP_BATCH)
    }
}

/// バリデーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Hard minimum word count for approval
    pub min_word_count: usize,
    /// Per content-type overrides of `min_word_count`
    pub type_minimums: BTreeMap<String, usize>,
    pub meta_description_min_chars: usize,
    pub title_min_chars: usize,
    pub title_max_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_word_count: 1000,
            type_minimums: BTreeMap::new(),
            meta_description_min_chars: 120,
            title_min_chars: 30,
            title_max_chars: 70,
        }
    }
}

impl ValidationConfig {
    /// Minimum word count for a declared content type
    pub fn minimum_for(&self, content_type: &str) -> usize {
        self.type_minimums
            .get(content_type)
            .copied()
            .unwrap_or(self.min_word_count)
    }
}

/// リンク分類設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Own site host, e.g. `geteducated.com`
    pub site_domain: String,
    /// Partner hosts treated as monetizable links
    pub affiliate_domains: Vec<String>,
    /// Outbound links open in a new tab when rendered
    pub new_tab: bool,
    /// Outbound links carry rel="nofollow" when rendered
    pub nofollow: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            site_domain: String::new(),
            affiliate_domains: vec![],
            new_tab: true,
            nofollow: true,
        }
    }
}

/// 重複検出設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Leading title characters compared against existing titles
    pub title_prefix_len: usize,
    /// Fraction of candidate keywords already covered by the corpus
    pub keyword_overlap_threshold: f64,
    /// Title-token Jaccard similarity against any single existing title
    pub title_similarity_threshold: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            title_prefix_len: 30,
            keyword_overlap_threshold: 0.8,
            title_similarity_threshold: 0.75,
        }
    }
}

/// WordPress 接続設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    pub url: String,
    pub username: String,
    pub password: String, // Application Password
    #[serde(default = "default_post_status")]
    pub post_status: String,
    pub enabled: Option<bool>,
    pub timeout_seconds: Option<u64>,
}

fn default_post_status() -> String {
    "publish".to_string()
}

impl WordPressConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}
