//! Publish adapters
//!
//! 外部CMSへの公開。アダプタ自体はリトライせず、失敗は `PublishError` として返す。
//! 再試行はライフサイクルエンジンの次回スイープが担う。

mod wordpress;

pub use wordpress::{PublishHealth, WordPressPublisher};

use async_trait::async_trait;

use crate::error::PublishError;
use crate::lifecycle::{Article, PublishedPost};

/// Remote publication target
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Create a live post for an approved article
    async fn create_post(&self, article: &Article) -> Result<PublishedPost, PublishError>;

    /// Adapter name used in logs
    fn name(&self) -> &str {
        "publisher"
    }
}
