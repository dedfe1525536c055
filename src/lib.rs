//! # contentflow-rs
//!
//! Content lifecycle and validation pipeline for AI-assisted publishing.
//!
//! Articles move from an idea through generation and human review to a live
//! WordPress post. The crate provides:
//!
//! - [`content`]: text metrics, keyword density, link shortcodes, validation
//!   and duplicate checks
//! - [`lifecycle`]: the article state machine, the SLA auto-approval sweep and
//!   the content store contract
//! - [`publish`]: the publish adapter trait and the WordPress REST publisher
//! - [`config`] / [`logging`]: layered configuration and tracing setup

pub mod config;
pub mod content;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod publish;

pub use config::PipelineConfig;
pub use content::{classify_duplicate, ContentValidator, ShortcodeCodec, ValidationReport};
pub use error::{Error, ErrorKind, PublishError, Result};
pub use lifecycle::{
    Article, ArticleStatus, ArticleStore, LifecycleEngine, MemoryArticleStore, SweepReport,
};
pub use publish::{PublishAdapter, WordPressPublisher};
