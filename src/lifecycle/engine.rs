//! Lifecycle Engine
//!
//! 記事ステータスと `auto_approve_at` を変更する唯一のコンポーネント。
//! 全ての遷移は `(status, revision)` に対する compare-and-swap で行い、
//! 競合は呼び出し側に対して no-op として扱う。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::store::ArticleStore;
use super::types::{
    Actor, Article, ArticleFilter, ArticleStatus, AuditRecord, ContentIdea, GeneratedDraft,
    IdeaStatus, ReviewAction, SweepReport, TransitionOutcome,
};
use crate::config::{LifecycleConfig, PipelineConfig};
use crate::content::{ContentValidator, DuplicateCorpus, DuplicateDetector, ShortcodeCodec};
use crate::error::{Error, ErrorKind, PublishError, Result};
use crate::publish::PublishAdapter;

/// Outcome of one publish attempt
#[derive(Debug)]
enum PublishOutcome {
    Published(Article),
    Failed(Article, PublishError),
}

/// Outcome of one overdue article
#[derive(Debug)]
enum SweepDecision {
    Approved(Article),
    Rejected(Article),
}

fn publish_error_kind(err: &PublishError) -> ErrorKind {
    match err {
        PublishError::Timeout(_) => ErrorKind::Timeout,
        _ => ErrorKind::Publish,
    }
}

pub struct LifecycleEngine {
    store: Arc<dyn ArticleStore>,
    validator: ContentValidator,
    detector: DuplicateDetector,
    codec: ShortcodeCodec,
    publisher: Option<Arc<dyn PublishAdapter>>,
    config: LifecycleConfig,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn ArticleStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            validator: ContentValidator::new(config.validation.clone()),
            detector: DuplicateDetector::new(config.duplicates.clone()),
            codec: ShortcodeCodec::from_config(&config.links),
            publisher: None,
            config: config.lifecycle.clone(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn PublishAdapter>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    pub fn validator(&self) -> &ContentValidator {
        &self.validator
    }

    fn sla(&self) -> Duration {
        Duration::days(i64::from(self.config.sla_days))
    }

    /// An unreleased lease older than this is considered abandoned
    fn publish_lease(&self) -> Duration {
        Duration::seconds(self.config.item_timeout_seconds as i64 * 2)
    }

    fn item_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.item_timeout_seconds)
    }

    async fn load(&self, article_id: &str) -> Result<Article> {
        self.store
            .get_article(article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("article {}", article_id)))
    }

    /// Create an article from an idea and move it into generation.
    ///
    /// A duplicate verdict returns [`Error::DuplicateContent`]; nothing is written.
    pub async fn start_generation(
        &self,
        idea_id: &str,
        corpus: &DuplicateCorpus,
    ) -> Result<Article> {
        let idea = self
            .store
            .get_idea(idea_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("idea {}", idea_id)))?;

        if let Some(article_id) = &idea.article_id {
            return Err(Error::IdeaConsumed {
                idea_id: idea.id.clone(),
                article_id: article_id.clone(),
            });
        }
        if !matches!(idea.status, IdeaStatus::Pending | IdeaStatus::Approved) {
            return Err(Error::IdeaUnavailable {
                idea_id: idea.id.clone(),
                status: format!("{:?}", idea.status).to_lowercase(),
            });
        }

        let verdict = self.detector.check_idea(&idea, corpus);
        if verdict.is_duplicate {
            warn!(
                idea_id = %idea.id,
                title = %idea.title,
                reason = %verdict.describe(),
                "duplicate idea skipped"
            );
            return Err(Error::DuplicateContent(verdict.describe()));
        }

        let mut article = Article::new(idea.title.clone(), String::new())
            .with_keywords(idea.keywords.iter().cloned().collect());
        article.idea_id = Some(idea.id.clone());

        // リンクを先に確定させ、二重消費を防ぐ
        self.store.link_idea(&idea.id, &article.id).await?;
        let article_id = article.id.clone();
        let article = match self.store.insert_article(article).await {
            Ok(article) => article,
            Err(e) => {
                if let Err(unlink) = self.store.unlink_idea(&idea.id, &article_id).await {
                    warn!(idea_id = %idea.id, error = %unlink, "failed to release idea link");
                }
                return Err(e);
            }
        };
        info!(idea_id = %idea.id, article_id = %article.id, "article created from idea");

        self.transition(&article, ArticleStatus::Generating, Actor::System, None, |_| {})
            .await
    }

    /// Store the generated draft and queue it for review
    pub async fn complete_generation(
        &self,
        article_id: &str,
        draft: GeneratedDraft,
    ) -> Result<Article> {
        let article = self.load(article_id).await?;
        let (body, stats) = self.codec.transform_links(&draft.body);
        debug!(
            article_id,
            internal = stats.internal,
            affiliate = stats.affiliate,
            external = stats.external,
            skipped = stats.skipped,
            "links encoded"
        );

        let drafted = self
            .transition(&article, ArticleStatus::Draft, Actor::System, None, |a| {
                if let Some(title) = draft.title.filter(|t| !t.trim().is_empty()) {
                    a.title = title;
                }
                a.body = body;
                if draft.meta_description.is_some() {
                    a.meta_description = draft.meta_description;
                }
                if !draft.keywords.is_empty() {
                    a.target_keywords = draft.keywords;
                }
                if draft.featured_image_url.is_some() {
                    a.featured_image_url = draft.featured_image_url;
                }
            })
            .await?;

        let pending = self.queue_for_review(drafted).await?;

        if let Some(idea_id) = &pending.idea_id {
            if let Err(e) = self.store.update_idea_status(idea_id, IdeaStatus::Completed).await {
                warn!(idea_id = %idea_id, error = %e, "failed to mark idea completed");
            }
        }
        Ok(pending)
    }

    /// Replace the body of an article sent back for revision and re-queue it
    pub async fn submit_revision(&self, article_id: &str, body: &str) -> Result<Article> {
        let article = self.load(article_id).await?;
        let (body, _) = self.codec.transform_links(body);
        let note = Some("revision submitted".to_string());
        let drafted = self
            .transition(&article, ArticleStatus::Draft, Actor::System, note, |a| {
                a.body = body;
            })
            .await?;
        self.queue_for_review(drafted).await
    }

    async fn queue_for_review(&self, article: Article) -> Result<Article> {
        let report = self.validator.validate(&article);
        let deadline = Utc::now() + self.sla();
        self.transition(&article, ArticleStatus::PendingReview, Actor::System, None, |a| {
            a.apply_validation(&report);
            a.auto_approve_at = Some(deadline);
        })
        .await
    }

    /// Apply a human review decision.
    ///
    /// Returns [`TransitionOutcome::Conflict`] when the article was already
    /// decided by someone else, including the SLA sweep.
    pub async fn review(
        &self,
        article_id: &str,
        action: ReviewAction,
        reviewer: &str,
    ) -> Result<TransitionOutcome> {
        let article = self.load(article_id).await?;
        let actor = Actor::Reviewer(reviewer.to_string());

        match article.status {
            ArticleStatus::PendingReview => {}
            ArticleStatus::Approved
            | ArticleStatus::NeedsRevision
            | ArticleStatus::Rejected
            | ArticleStatus::Published => {
                info!(
                    article_id,
                    status = %article.status,
                    reviewer,
                    "review skipped, already decided"
                );
                return Ok(TransitionOutcome::Conflict);
            }
            other => {
                let to = match action {
                    ReviewAction::Approve => ArticleStatus::Approved,
                    ReviewAction::RequestRevision { .. } => ArticleStatus::NeedsRevision,
                    ReviewAction::Reject { .. } => ArticleStatus::Rejected,
                };
                return Err(Error::InvalidTransition {
                    id: article.id,
                    from: other,
                    to,
                });
            }
        }

        let result = match action {
            ReviewAction::Approve => self.approve(&article, actor).await,
            ReviewAction::RequestRevision { note } => {
                self.transition(&article, ArticleStatus::NeedsRevision, actor, Some(note), |_| {})
                    .await
            }
            ReviewAction::Reject { reason } => {
                self.transition(&article, ArticleStatus::Rejected, actor, Some(reason), |_| {})
                    .await
            }
        };

        match result {
            Ok(article) => Ok(TransitionOutcome::Applied(article)),
            Err(e) if e.is_conflict() => {
                info!(article_id, error = %e, "review lost a concurrent transition");
                Ok(TransitionOutcome::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    /// Validate, then approve or reject; publishes on approval when configured
    async fn approve(&self, article: &Article, actor: Actor) -> Result<Article> {
        let report = self.validator.validate(article);
        if !report.valid {
            let note = report
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return self
                .transition(article, ArticleStatus::Rejected, actor, Some(note), |a| {
                    a.apply_validation(&report);
                })
                .await;
        }

        let approved = self
            .transition(article, ArticleStatus::Approved, actor, None, |a| {
                a.apply_validation(&report);
            })
            .await?;

        if !self.config.publish_on_approve {
            return Ok(approved);
        }
        match self.publish_within_budget(&approved).await {
            Ok(Some(PublishOutcome::Published(article))) => Ok(article),
            Ok(Some(PublishOutcome::Failed(article, _))) => Ok(article),
            Ok(None) => Ok(approved),
            // 公開の取り合いに負けても承認自体は成立している
            Err(e) if e.is_conflict() => Ok(approved),
            Err(e) => Err(e),
        }
    }

    /// Explicitly publish an approved article
    pub async fn publish(&self, article_id: &str) -> Result<Article> {
        let article = self.load(article_id).await?;
        if article.status != ArticleStatus::Approved {
            return Err(Error::InvalidTransition {
                id: article.id,
                from: article.status,
                to: ArticleStatus::Published,
            });
        }

        match self.publish_within_budget(&article).await? {
            Some(PublishOutcome::Published(article)) => Ok(article),
            Some(PublishOutcome::Failed(_, err)) => Err(Error::Publish(err)),
            None => Err(Error::Config("no publish target configured".to_string())),
        }
    }

    /// Run [`Self::publish_with_claim`] under the per-item budget.
    ///
    /// A timeout records `publish_error` and keeps the lease, so the article
    /// is retried once the lease expires.
    async fn publish_within_budget(&self, article: &Article) -> Result<Option<PublishOutcome>> {
        match tokio::time::timeout(self.item_timeout(), self.publish_with_claim(article)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = PublishError::Timeout(format!(
                    "publish exceeded {}s item budget",
                    self.config.item_timeout_seconds
                ));
                warn!(
                    article_id = %article.id,
                    error = %err,
                    "publish timed out, article stays approved"
                );
                let recorded = self.record_publish_error(&article.id, &err).await?;
                Ok(Some(PublishOutcome::Failed(recorded, err)))
            }
        }
    }

    /// Store `err` on an approved, unpublished article
    async fn record_publish_error(&self, article_id: &str, err: &PublishError) -> Result<Article> {
        let current = self.load(article_id).await?;
        if current.status != ArticleStatus::Approved || current.published.is_some() {
            return Ok(current);
        }
        let mut next = current.clone();
        next.publish_error = Some(err.to_string());
        match self
            .store
            .compare_and_swap(ArticleStatus::Approved, current.revision, next)
            .await
        {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_conflict() => self.load(article_id).await,
            Err(e) => Err(e),
        }
    }

    /// Claim the article, then call the CMS.
    ///
    /// The claim bumps `publish_attempts` and takes a lease through one
    /// compare-and-swap; only the claimant talks to the CMS. A held lease or a
    /// lost claim returns [`Error::PublishInProgress`]. Returns `None` when no
    /// publisher is configured.
    async fn publish_with_claim(&self, article: &Article) -> Result<Option<PublishOutcome>> {
        let Some(publisher) = &self.publisher else {
            return Ok(None);
        };

        let now = Utc::now();
        if article
            .publish_claimed_at
            .is_some_and(|claimed_at| now - claimed_at < self.publish_lease())
        {
            return Err(Error::PublishInProgress(article.id.clone()));
        }

        let mut claim = article.clone();
        claim.publish_attempts += 1;
        claim.publish_claimed_at = Some(now);
        let claimed = match self
            .store
            .compare_and_swap(ArticleStatus::Approved, article.revision, claim)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => return Err(Error::PublishInProgress(article.id.clone())),
            Err(e) => return Err(e),
        };

        debug!(
            article_id = %claimed.id,
            attempt = claimed.publish_attempts,
            publisher = publisher.name(),
            "publishing"
        );

        match publisher.create_post(&claimed).await {
            Ok(post) => {
                let now = Utc::now();
                let note = Some(format!("post {} at {}", post.post_id, post.url));
                let published = self
                    .transition(&claimed, ArticleStatus::Published, Actor::System, note, |a| {
                        a.published = Some(post);
                        a.published_at = Some(now);
                        a.publish_error = None;
                        a.publish_claimed_at = None;
                    })
                    .await?;
                Ok(Some(PublishOutcome::Published(published)))
            }
            Err(err) => {
                warn!(
                    article_id = %claimed.id,
                    attempt = claimed.publish_attempts,
                    status = ?err.status(),
                    transient = err.is_transient(),
                    error = %err,
                    "publish failed, article stays approved"
                );
                let mut failed = claimed.clone();
                failed.publish_error = Some(err.to_string());
                failed.publish_claimed_at = None;
                let recorded = self
                    .store
                    .compare_and_swap(ArticleStatus::Approved, claimed.revision, failed)
                    .await?;
                Ok(Some(PublishOutcome::Failed(recorded, err)))
            }
        }
    }

    /// Decide every overdue `pending_review` article, then retry pending
    /// publications. Items fail independently; only a store failure while
    /// listing aborts the sweep.
    pub async fn run_sla_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let batch = self.config.batch_size();
        let mut report = SweepReport::default();
        let mut touched = HashSet::new();

        let due = self
            .store
            .list_articles(&ArticleFilter {
                status: Some(ArticleStatus::PendingReview),
                due_before: Some(now),
                unpublished_only: false,
                limit: Some(batch),
            })
            .await?;
        info!(due = due.len(), batch, %now, "SLA sweep started");

        for article in due {
            touched.insert(article.id.clone());
            let decision =
                tokio::time::timeout(self.item_timeout(), self.auto_decide(&article)).await;
            match decision {
                Ok(Ok(SweepDecision::Approved(approved))) => {
                    report.approved += 1;
                    if self.config.publish_on_approve {
                        self.publish_approved(&approved, &mut report).await;
                    }
                }
                Ok(Ok(SweepDecision::Rejected(rejected))) => {
                    report.failed += 1;
                    let err = Error::Validation(rejected.validation_errors);
                    report.push_error(&article.id, err.kind(), err.to_string());
                }
                Ok(Err(e)) if e.is_conflict() => {
                    debug!(article_id = %article.id, "already moved by another actor");
                    report.skipped += 1;
                }
                Ok(Err(e)) => {
                    warn!(article_id = %article.id, error = %e, "sweep item failed");
                    report.failed += 1;
                    report.push_error(&article.id, e.kind(), e.to_string());
                }
                Err(_) => {
                    warn!(
                        article_id = %article.id,
                        timeout = ?self.item_timeout(),
                        "sweep item timed out"
                    );
                    report.failed += 1;
                    let err = Error::Timeout(format!(
                        "decision exceeded {}s item budget",
                        self.config.item_timeout_seconds
                    ));
                    report.push_error(&article.id, err.kind(), err.to_string());
                }
            }
        }

        if self.publisher.is_some() && self.config.publish_on_approve {
            self.retry_publications(&touched, batch, &mut report).await?;
        }

        info!(
            approved = report.approved,
            failed = report.failed,
            skipped = report.skipped,
            published = report.published,
            publish_retried = report.publish_retried,
            "SLA sweep finished"
        );
        Ok(report)
    }

    async fn auto_decide(&self, article: &Article) -> Result<SweepDecision> {
        let report = self.validator.validate(article);
        if !report.valid {
            let note = report
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let rejected = self
                .transition(article, ArticleStatus::Rejected, Actor::System, Some(note), |a| {
                    a.apply_validation(&report);
                })
                .await?;
            return Ok(SweepDecision::Rejected(rejected));
        }

        let approved = self
            .transition(
                article,
                ArticleStatus::Approved,
                Actor::System,
                Some("auto-approved after review deadline".to_string()),
                |a| a.apply_validation(&report),
            )
            .await?;
        Ok(SweepDecision::Approved(approved))
    }

    /// Publish a freshly approved article; failures stay on the article
    async fn publish_approved(&self, approved: &Article, report: &mut SweepReport) {
        match self.publish_within_budget(approved).await {
            Ok(Some(PublishOutcome::Published(_))) => report.published += 1,
            Ok(Some(PublishOutcome::Failed(_, err))) => {
                report.push_error(&approved.id, publish_error_kind(&err), err.to_string())
            }
            Ok(None) => {}
            Err(e) if e.is_conflict() => {
                debug!(article_id = %approved.id, "publication claimed by another worker");
            }
            Err(e) => {
                warn!(article_id = %approved.id, error = %e, "publish step failed");
                report.push_error(&approved.id, e.kind(), e.to_string());
            }
        }
    }

    async fn retry_publications(
        &self,
        touched: &HashSet<String>,
        batch: usize,
        report: &mut SweepReport,
    ) -> Result<()> {
        let waiting = self
            .store
            .list_articles(&ArticleFilter {
                status: Some(ArticleStatus::Approved),
                due_before: None,
                unpublished_only: true,
                limit: None,
            })
            .await?;

        for article in waiting
            .into_iter()
            .filter(|a| !touched.contains(&a.id))
            .take(batch)
        {
            match self.publish_within_budget(&article).await {
                Ok(Some(PublishOutcome::Published(_))) => {
                    report.publish_retried += 1;
                    report.published += 1;
                }
                Ok(Some(PublishOutcome::Failed(_, err))) => {
                    report.publish_retried += 1;
                    report.push_error(&article.id, publish_error_kind(&err), err.to_string());
                }
                Ok(None) => {}
                Err(e) if e.is_conflict() => report.skipped += 1,
                Err(e) => report.push_error(&article.id, e.kind(), e.to_string()),
            }
        }
        Ok(())
    }

    /// Apply one lifecycle step through a single compare-and-swap
    async fn transition<F>(
        &self,
        current: &Article,
        to: ArticleStatus,
        actor: Actor,
        note: Option<String>,
        mutate: F,
    ) -> Result<Article>
    where
        F: FnOnce(&mut Article) + Send,
    {
        let from = current.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                id: current.id.clone(),
                from,
                to,
            });
        }

        let mut next = current.clone();
        mutate(&mut next);
        next.status = to;
        if to != ArticleStatus::PendingReview {
            next.auto_approve_at = None;
        }

        let stored = self
            .store
            .compare_and_swap(from, current.revision, next)
            .await?;

        let record = AuditRecord {
            article_id: stored.id.clone(),
            from,
            to,
            actor: actor.clone(),
            note,
            at: stored.updated_at,
        };
        if let Err(e) = self.store.record_audit(record).await {
            warn!(article_id = %stored.id, error = %e, "failed to record audit entry");
        }

        info!(
            article_id = %stored.id,
            from = %from,
            to = %to,
            actor = %actor,
            revision = stored.revision,
            "article transitioned"
        );
        Ok(stored)
    }
}

/// Collect titles and keywords of stored articles and of other open ideas
pub async fn corpus_from_store(
    store: &dyn ArticleStore,
    exclude_idea: Option<&str>,
) -> Result<DuplicateCorpus> {
    let ideas: Vec<ContentIdea> = store.list_ideas().await?;
    let mut corpus = DuplicateCorpus::from_ideas(
        ideas
            .iter()
            .filter(|i| i.article_id.is_none() && Some(i.id.as_str()) != exclude_idea),
    );
    for article in store.list_articles(&ArticleFilter::default()).await? {
        if article.status != ArticleStatus::Rejected {
            corpus.add(article.title, &article.target_keywords);
        }
    }
    Ok(corpus)
}
