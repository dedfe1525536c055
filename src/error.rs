//! Error types for the content pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::lifecycle::ArticleStatus;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level pipeline error
#[derive(Debug, Error)]
pub enum Error {
    /// Article or idea does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transition is not part of the lifecycle table
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ArticleStatus,
        to: ArticleStatus,
    },

    /// Another actor changed the article first
    #[error(
        "State conflict on {id}: expected {expected} (rev {expected_revision}), \
         found {actual} (rev {actual_revision})"
    )]
    StateConflict {
        id: String,
        expected: ArticleStatus,
        expected_revision: u64,
        actual: ArticleStatus,
        actual_revision: u64,
    },

    /// Another worker holds the publish lease
    #[error("Publication of {0} already in progress")]
    PublishInProgress(String),

    /// Candidate idea looks like existing content (advisory)
    #[error("Duplicate content: {0}")]
    DuplicateContent(String),

    /// Idea was already consumed into an article
    #[error("Idea {idea_id} already consumed by article {article_id}")]
    IdeaConsumed { idea_id: String, article_id: String },

    /// Idea is not in a state that can start generation
    #[error("Idea {idea_id} is not available for generation (status: {status})")]
    IdeaUnavailable { idea_id: String, status: String },

    /// Validation blocked an operation
    #[error("Validation failed: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Remote CMS failure
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Content store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Per-item deadline exceeded
    #[error("Timed out: {0}")]
    Timeout(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 競合エラーかどうか（呼び出し側ではno-opとして扱う）
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::StateConflict { .. } | Error::PublishInProgress(_))
    }

    /// Short machine-readable kind, used for sweep reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Publish(_) => ErrorKind::Publish,
            Error::StateConflict { .. } | Error::PublishInProgress(_) => ErrorKind::StateConflict,
            Error::DuplicateContent(_) => ErrorKind::DuplicateContent,
            Error::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error category reported per sweep item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Publish,
    StateConflict,
    DuplicateContent,
    Timeout,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Publish => "publish",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::DuplicateContent => "duplicate_content",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// バリデーションエラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// 本文が最低語数に満たない
    WordCount,
    /// タイトルが空
    EmptyTitle,
    /// 本文が空
    EmptyBody,
    /// ショートコード構文エラー
    ShortcodeSyntax,
    /// 読みやすさが低い
    Readability,
    /// キーワード密度が範囲外
    KeywordDensity,
    /// メタディスクリプション不足
    MetaDescription,
    /// タイトル長が範囲外
    TitleLength,
}

/// A single structured validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    /// Blocking errors fail the hard validity gate; the rest are advisory
    pub blocking: bool,
}

impl ValidationError {
    pub fn blocking(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            blocking: true,
        }
    }

    pub fn advisory(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            blocking: false,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Remote CMS errors; fatal to the publish step, never to a sweep batch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// Connection refused, DNS failure, TLS error, ...
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// 401/403 from the CMS
    #[error("authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// Any other non-success status
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 2xx with a body we could not understand
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Article cannot be published in its current form
    #[error("unpublishable article: {0}")]
    Unpublishable(String),
}

impl PublishError {
    /// Remote HTTP status, when the CMS answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            PublishError::Authentication { status, .. } | PublishError::Rejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// 次回スイープで再試行する価値があるか
    pub fn is_transient(&self) -> bool {
        match self {
            PublishError::Network(_) | PublishError::Timeout(_) => true,
            PublishError::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PublishError::Timeout(err.to_string())
        } else if err.is_decode() {
            PublishError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            PublishError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            PublishError::Network(err.to_string())
        }
    }
}
