use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::content::ValidationReport;
use crate::error::{ErrorKind, ValidationError};

/// 記事ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    /// アイデアから作成された直後
    Idea,
    /// AI生成中
    Generating,
    /// 下書き
    Draft,
    /// レビュー待ち（SLA期限あり）
    PendingReview,
    /// 承認済み（未公開の可能性あり）
    Approved,
    /// 修正依頼
    NeedsRevision,
    /// 却下（終端）
    Rejected,
    /// 公開済み（終端）
    Published,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 8] = [
        ArticleStatus::Idea,
        ArticleStatus::Generating,
        ArticleStatus::Draft,
        ArticleStatus::PendingReview,
        ArticleStatus::Approved,
        ArticleStatus::NeedsRevision,
        ArticleStatus::Rejected,
        ArticleStatus::Published,
    ];

    /// States reachable in one step
    pub fn allowed_next(&self) -> &'static [ArticleStatus] {
        use ArticleStatus::*;
        match self {
            Idea => &[Generating],
            Generating => &[Draft],
            Draft => &[PendingReview],
            PendingReview => &[Approved, NeedsRevision, Rejected],
            NeedsRevision => &[Draft],
            Approved => &[Published],
            Rejected | Published => &[],
        }
    }

    pub fn can_transition_to(&self, next: ArticleStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Idea => "idea",
            ArticleStatus::Generating => "generating",
            ArticleStatus::Draft => "draft",
            ArticleStatus::PendingReview => "pending_review",
            ArticleStatus::Approved => "approved",
            ArticleStatus::NeedsRevision => "needs_revision",
            ArticleStatus::Rejected => "rejected",
            ArticleStatus::Published => "published",
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    #[default]
    Unchecked,
}

/// Reference to the post created on the remote CMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub post_id: u64,
    pub url: String,
}

/// 記事エンティティ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub idea_id: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub target_keywords: Vec<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub featured_image_url: Option<String>,
    pub status: ArticleStatus,
    #[serde(default)]
    pub word_count: usize,
    /// SEO score of the last validation (0-100)
    #[serde(default)]
    pub editor_score: Option<u8>,
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
    /// Set only while `status == PendingReview`
    pub auto_approve_at: Option<DateTime<Utc>>,
    pub published: Option<PublishedPost>,
    /// Last publish failure, cleared on success
    #[serde(default)]
    pub publish_error: Option<String>,
    #[serde(default)]
    pub publish_attempts: u32,
    /// Lease held while a publish call is in flight
    #[serde(default)]
    pub publish_claimed_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every write
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

fn default_content_type() -> String {
    "article".to_string()
}

impl Article {
    /// 新規記事を作成（ステータスは Idea）
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            idea_id: None,
            title: title.into(),
            body: body.into(),
            meta_description: None,
            target_keywords: vec![],
            content_type: default_content_type(),
            featured_image_url: None,
            status: ArticleStatus::Idea,
            word_count: 0,
            editor_score: None,
            risk_flags: BTreeSet::new(),
            validation_status: ValidationStatus::Unchecked,
            validation_errors: vec![],
            auto_approve_at: None,
            published: None,
            publish_error: None,
            publish_attempts: 0,
            publish_claimed_at: None,
            revision: 0,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.target_keywords = keywords;
        self
    }

    pub fn with_meta_description(mut self, meta: impl Into<String>) -> Self {
        self.meta_description = Some(meta.into());
        self
    }

    pub fn with_featured_image(mut self, url: impl Into<String>) -> Self {
        self.featured_image_url = Some(url.into());
        self
    }

    /// テスト・インポート用: 状態と期限を直接設定
    pub fn with_status(
        mut self,
        status: ArticleStatus,
        auto_approve_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.status = status;
        self.auto_approve_at = if status == ArticleStatus::PendingReview {
            auto_approve_at
        } else {
            None
        };
        self
    }

    /// SLA期限を過ぎたレビュー待ち記事か
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ArticleStatus::PendingReview
            && self.auto_approve_at.is_some_and(|deadline| deadline <= now)
    }

    /// Copy the summary fields of a report onto the article
    pub fn apply_validation(&mut self, report: &ValidationReport) {
        self.word_count = report.word_count;
        self.editor_score = Some(report.seo_score);
        self.risk_flags = report.risk_flags.clone();
        if report.valid {
            self.validation_status = ValidationStatus::Valid;
            self.validation_errors.clear();
        } else {
            self.validation_status = ValidationStatus::Invalid;
            self.validation_errors = report.errors.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

/// コンテンツアイデア
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIdea {
    pub id: String,
    pub title: String,
    pub keywords: BTreeSet<String>,
    pub status: IdeaStatus,
    pub article_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContentIdea {
    pub fn new(
        title: impl Into<String>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            status: IdeaStatus::Pending,
            article_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn approved(mut self) -> Self {
        self.status = IdeaStatus::Approved;
        self
    }
}

/// Who performed a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// SLA sweep / automation
    System,
    Reviewer(String),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("system"),
            Actor::Reviewer(name) => write!(f, "reviewer:{}", name),
        }
    }
}

/// 状態遷移の監査記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub article_id: String,
    pub from: ArticleStatus,
    pub to: ArticleStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Store query
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub status: Option<ArticleStatus>,
    /// `auto_approve_at <= due_before`
    pub due_before: Option<DateTime<Utc>>,
    /// Only articles without a published reference
    pub unpublished_only: bool,
    pub limit: Option<usize>,
}

impl ArticleFilter {
    pub fn status(status: ArticleStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, article: &Article) -> bool {
        if let Some(status) = self.status {
            if article.status != status {
                return false;
            }
        }
        if let Some(due) = self.due_before {
            match article.auto_approve_at {
                Some(deadline) if deadline <= due => {}
                _ => return false,
            }
        }
        if self.unpublished_only && article.published.is_some() {
            return false;
        }
        true
    }
}

/// Human review decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    RequestRevision { note: String },
    Reject { reason: String },
}

/// Result of a human-triggered transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition was applied; carries the stored article
    Applied(Article),
    /// Another actor moved the article first; nothing was changed
    Conflict,
}

impl TransitionOutcome {
    pub fn article(&self) -> Option<&Article> {
        match self {
            TransitionOutcome::Applied(article) => Some(article),
            TransitionOutcome::Conflict => None,
        }
    }
}

/// Output of the generation step
#[derive(Debug, Clone, Default)]
pub struct GeneratedDraft {
    pub title: Option<String>,
    pub body: String,
    pub meta_description: Option<String>,
    pub keywords: Vec<String>,
    pub featured_image_url: Option<String>,
}

/// Per-item failure in a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepItemError {
    pub article_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// SLAスイープ結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// pending_review → approved
    pub approved: usize,
    /// pending_review → rejected (validation), or processing error
    pub failed: usize,
    /// Already moved by a concurrent actor
    pub skipped: usize,
    /// Successfully published during this sweep
    pub published: usize,
    /// Approved-but-unpublished articles retried this sweep
    pub publish_retried: usize,
    pub errors: Vec<SweepItemError>,
}

impl SweepReport {
    pub(crate) fn push_error(
        &mut self,
        article_id: &str,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(SweepItemError {
            article_id: article_id.to_string(),
            kind,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_transition_table() {
        use ArticleStatus::*;
        assert!(Idea.can_transition_to(Generating));
        assert!(PendingReview.can_transition_to(Rejected));
        assert!(NeedsRevision.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Approved));
        assert!(!PendingReview.can_transition_to(Published));
        assert!(Rejected.is_terminal());
        assert!(Published.is_terminal());
        assert_eq!(
            ArticleStatus::ALL.iter().filter(|s| s.is_terminal()).count(),
            2
        );
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ArticleStatus::PendingReview).unwrap();
        assert_eq!(json, "\"pending_review\"");
        assert_eq!(ArticleStatus::NeedsRevision.to_string(), "needs_revision");
    }

    #[test]
    fn test_deadline_only_for_pending_review() {
        let now = Utc::now();
        let article = Article::new("t", "b").with_status(ArticleStatus::Approved, Some(now));
        assert!(article.auto_approve_at.is_none());

        let pending = Article::new("t", "b")
            .with_status(ArticleStatus::PendingReview, Some(now - Duration::hours(1)));
        assert!(pending.is_due(now));
        assert!(!pending.is_due(now - Duration::hours(2)));
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let article = Article::new("t", "b")
            .with_status(ArticleStatus::PendingReview, Some(now - Duration::minutes(5)));
        let filter = ArticleFilter {
            status: Some(ArticleStatus::PendingReview),
            due_before: Some(now),
            ..Default::default()
        };
        assert!(filter.matches(&article));
        assert!(!ArticleFilter::status(ArticleStatus::Draft).matches(&article));
    }
}
