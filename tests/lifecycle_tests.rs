//! ライフサイクル（SLAスイープ・公開・競合）の統合テスト

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use contentflow_rs::config::PipelineConfig;
use contentflow_rs::content::DuplicateCorpus;
use contentflow_rs::error::{Error, ErrorKind, PublishError, Result as StoreResult, ValidationCode};
use contentflow_rs::lifecycle::{
    Article, ArticleFilter, ArticleStatus, ArticleStore, AuditRecord, ContentIdea, IdeaStatus,
    LifecycleEngine, MemoryArticleStore, PublishedPost, ReviewAction, TransitionOutcome,
    ValidationStatus,
};
use contentflow_rs::publish::PublishAdapter;

/// Publisher double that counts calls and can be told to fail
#[derive(Debug, Default)]
struct CountingPublisher {
    calls: AtomicUsize,
    next_id: AtomicU64,
    failure: Mutex<Option<PublishError>>,
    delay_ms: u64,
}

impl CountingPublisher {
    fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Default::default()
        }
    }

    fn fail_with(&self, err: Option<PublishError>) {
        *self.failure.lock().unwrap() = err;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishAdapter for CountingPublisher {
    async fn create_post(&self, article: &Article) -> Result<PublishedPost, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let post_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        Ok(PublishedPost {
            post_id,
            url: format!("https://cms.example.com/{}", article.id),
        })
    }
}

/// Publisher that never answers for titles starting with "Slow" while `hang` is set
#[derive(Debug)]
struct HangingPublisher {
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl HangingPublisher {
    fn new() -> Self {
        Self {
            hang: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PublishAdapter for HangingPublisher {
    async fn create_post(&self, article: &Article) -> Result<PublishedPost, PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        if article.title.starts_with("Slow") && self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        Ok(PublishedPost {
            post_id: 500 + call,
            url: format!("https://cms.example.com/{}", article.id),
        })
    }
}

/// Memory store whose article inserts always fail
#[derive(Debug, Default)]
struct FailingInsertStore {
    inner: MemoryArticleStore,
}

#[async_trait]
impl ArticleStore for FailingInsertStore {
    async fn get_article(&self, id: &str) -> StoreResult<Option<Article>> {
        self.inner.get_article(id).await
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<Article>> {
        self.inner.list_articles(filter).await
    }

    async fn insert_article(&self, _article: Article) -> StoreResult<Article> {
        Err(Error::Store("disk full".to_string()))
    }

    async fn compare_and_swap(
        &self,
        expected_status: ArticleStatus,
        expected_revision: u64,
        next: Article,
    ) -> StoreResult<Article> {
        self.inner
            .compare_and_swap(expected_status, expected_revision, next)
            .await
    }

    async fn get_idea(&self, id: &str) -> StoreResult<Option<ContentIdea>> {
        self.inner.get_idea(id).await
    }

    async fn list_ideas(&self) -> StoreResult<Vec<ContentIdea>> {
        self.inner.list_ideas().await
    }

    async fn insert_idea(&self, idea: ContentIdea) -> StoreResult<ContentIdea> {
        self.inner.insert_idea(idea).await
    }

    async fn link_idea(&self, idea_id: &str, article_id: &str) -> StoreResult<ContentIdea> {
        self.inner.link_idea(idea_id, article_id).await
    }

    async fn unlink_idea(&self, idea_id: &str, article_id: &str) -> StoreResult<ContentIdea> {
        self.inner.unlink_idea(idea_id, article_id).await
    }

    async fn update_idea_status(
        &self,
        idea_id: &str,
        status: IdeaStatus,
    ) -> StoreResult<ContentIdea> {
        self.inner.update_idea_status(idea_id, status).await
    }

    async fn record_audit(&self, record: AuditRecord) -> StoreResult<()> {
        self.inner.record_audit(record).await
    }

    async fn audit_log(&self, article_id: &str) -> StoreResult<Vec<AuditRecord>> {
        self.inner.audit_log(article_id).await
    }
}

fn body(words: usize) -> String {
    let sentence = "Students compare online degree programs before they apply.";
    let per = sentence.split_whitespace().count();
    let mut body = String::from("<p>");
    for _ in 0..words.div_ceil(per) {
        body.push_str(sentence);
        body.push(' ');
    }
    body.push_str("</p>");
    body
}

fn overdue(title: &str, words: usize) -> Article {
    Article::new(title, body(words))
        .with_status(ArticleStatus::PendingReview, Some(Utc::now() - Duration::hours(1)))
}

fn setup() -> (Arc<MemoryArticleStore>, LifecycleEngine) {
    let store = Arc::new(MemoryArticleStore::new());
    let engine = LifecycleEngine::new(store.clone(), &PipelineConfig::default());
    (store, engine)
}

#[tokio::test]
async fn test_sweep_twice_second_run_is_noop() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    for i in 0..3 {
        store.insert_article(overdue(&format!("Long article {}", i), 1100)).await?;
    }
    store.insert_article(overdue("Short article", 200)).await?;

    let first = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(first.approved, 3);
    assert_eq!(first.failed, 1);

    let second = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(second.approved, 0);
    assert_eq!(second.failed, 0);
    assert!(second.errors.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_short_article_rejected_for_word_count() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let article = store.insert_article(overdue("Five hundred words", 500)).await?;

    let report = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Validation);

    let stored = store.get_article(&article.id).await?.expect("article exists");
    assert_eq!(stored.status, ArticleStatus::Rejected);
    assert_eq!(stored.validation_status, ValidationStatus::Invalid);
    assert!(stored.auto_approve_at.is_none());
    assert!(stored
        .validation_errors
        .iter()
        .any(|e| e.code == ValidationCode::WordCount && e.blocking));

    Ok(())
}

#[tokio::test]
async fn test_sweep_respects_batch_bound() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryArticleStore::new());
    let mut config = PipelineConfig::default();
    config.lifecycle.sweep_batch_size = 2;
    let engine = LifecycleEngine::new(store.clone(), &config);

    for i in 0..5 {
        store.insert_article(overdue(&format!("Batch article {}", i), 1100)).await?;
    }

    let report = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(report.approved, 2);
    let report = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(report.approved, 2);
    let report = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(report.approved, 1);

    Ok(())
}

#[tokio::test]
async fn test_approved_article_is_published() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let publisher = Arc::new(CountingPublisher::default());
    let engine = engine.with_publisher(publisher.clone());
    let article = store.insert_article(overdue("Publish me", 1100)).await?;

    let report = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(report.approved, 1);
    assert_eq!(report.published, 1);

    let stored = store.get_article(&article.id).await?.expect("article exists");
    assert_eq!(stored.status, ArticleStatus::Published);
    assert_eq!(stored.published.as_ref().map(|p| p.post_id), Some(100));
    assert!(stored.published_at.is_some());
    assert_eq!(stored.publish_attempts, 1);
    assert_eq!(publisher.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_publish_failure_stays_approved() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let publisher = Arc::new(CountingPublisher::default());
    publisher.fail_with(Some(PublishError::Rejected {
        status: 500,
        message: "Internal Server Error".to_string(),
    }));
    let engine = engine.with_publisher(publisher.clone());
    let article = store.insert_article(overdue("Flaky CMS", 1100)).await?;

    let first = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(first.approved, 1);
    assert_eq!(first.published, 0);
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].kind, ErrorKind::Publish);

    let stored = store.get_article(&article.id).await?.expect("article exists");
    assert_eq!(stored.status, ArticleStatus::Approved);
    assert!(stored.publish_error.as_deref().unwrap_or_default().contains("500"));
    assert!(stored.publish_claimed_at.is_none());

    publisher.fail_with(None);
    let second = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(second.approved, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(second.publish_retried, 1);
    assert_eq!(second.published, 1);

    let stored = store.get_article(&article.id).await?.expect("article exists");
    assert_eq!(stored.status, ArticleStatus::Published);
    assert!(stored.publish_error.is_none());
    assert_eq!(stored.publish_attempts, 2);
    assert_eq!(publisher.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_sweeps_publish_once() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryArticleStore::new());
    let publisher = Arc::new(CountingPublisher::with_delay(20));
    let config = PipelineConfig::default();
    let first = LifecycleEngine::new(store.clone(), &config).with_publisher(publisher.clone());
    let second = LifecycleEngine::new(store.clone(), &config).with_publisher(publisher.clone());

    for i in 0..5 {
        store.insert_article(overdue(&format!("Concurrent article {}", i), 1100)).await?;
    }

    let now = Utc::now();
    let (a, b) = tokio::join!(first.run_sla_sweep(now), second.run_sla_sweep(now));
    let (a, b) = (a?, b?);

    assert_eq!(a.approved + b.approved, 5);
    assert_eq!(a.published + b.published, 5);
    assert_eq!(a.failed + b.failed, 0);
    assert_eq!(publisher.calls(), 5);

    let published = store
        .list_articles(&ArticleFilter::status(ArticleStatus::Published))
        .await?;
    assert_eq!(published.len(), 5);

    Ok(())
}

#[tokio::test]
async fn test_human_approval_after_sweep_is_conflict() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let article = store.insert_article(overdue("Raced article", 1100)).await?;

    engine.run_sla_sweep(Utc::now()).await?;
    let outcome = engine
        .review(&article.id, ReviewAction::Approve, "editor")
        .await?;
    assert_eq!(outcome, TransitionOutcome::Conflict);

    let audit = store.audit_log(&article.id).await?;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].to, ArticleStatus::Approved);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_review_and_sweep_decide_once() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let article = store.insert_article(overdue("Contended article", 1100)).await?;

    let (review, sweep) = tokio::join!(
        engine.review(
            &article.id,
            ReviewAction::Reject {
                reason: "off-brand".to_string()
            },
            "editor"
        ),
        engine.run_sla_sweep(Utc::now())
    );
    let (review, sweep) = (review?, sweep?);

    let stored = store.get_article(&article.id).await?.expect("article exists");
    match review {
        TransitionOutcome::Applied(_) => {
            assert_eq!(stored.status, ArticleStatus::Rejected);
            assert_eq!(sweep.approved, 0);
        }
        TransitionOutcome::Conflict => {
            assert_eq!(stored.status, ArticleStatus::Approved);
            assert_eq!(sweep.approved, 1);
        }
    }
    assert_eq!(store.audit_log(&article.id).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_human_approve_validates_first() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let article = store
        .insert_article(
            Article::new("Thin content", body(300))
                .with_status(ArticleStatus::PendingReview, Some(Utc::now() + Duration::days(3))),
        )
        .await?;

    let outcome = engine
        .review(&article.id, ReviewAction::Approve, "editor")
        .await?;
    let stored = outcome.article().expect("applied");
    assert_eq!(stored.status, ArticleStatus::Rejected);
    assert_eq!(stored.validation_status, ValidationStatus::Invalid);
    assert!(!stored.validation_errors.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_explicit_publish_requires_approved() -> Result<(), Box<dyn std::error::Error>> {
    let (store, engine) = setup();
    let engine = engine.with_publisher(Arc::new(CountingPublisher::default()));
    let article = store
        .insert_article(
            Article::new("Waiting", body(1100))
                .with_status(ArticleStatus::PendingReview, Some(Utc::now() + Duration::days(3))),
        )
        .await?;

    let err = engine.publish(&article.id).await.unwrap_err();
    assert!(err.to_string().contains("pending_review -> published"));

    Ok(())
}

fn short_budget() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.lifecycle.item_timeout_seconds = 1;
    config
}

#[tokio::test]
async fn test_hanging_publish_does_not_stall_batch() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryArticleStore::new());
    let publisher = Arc::new(HangingPublisher::new());
    let engine =
        LifecycleEngine::new(store.clone(), &short_budget()).with_publisher(publisher.clone());

    let slow = store.insert_article(overdue("Slow CMS article", 1100)).await?;
    store.insert_article(overdue("Quick article one", 1100)).await?;
    store.insert_article(overdue("Quick article two", 1100)).await?;

    let report = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        engine.run_sla_sweep(Utc::now()),
    )
    .await??;

    assert_eq!(report.approved, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.published, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].article_id, slow.id);
    assert_eq!(report.errors[0].kind, ErrorKind::Timeout);

    let stored = store.get_article(&slow.id).await?.expect("article exists");
    assert_eq!(stored.status, ArticleStatus::Approved);
    assert!(stored.published.is_none());
    assert!(stored
        .publish_error
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
    assert!(stored.publish_claimed_at.is_some());

    Ok(())
}

#[tokio::test]
async fn test_publish_resumes_after_lease_expires() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryArticleStore::new());
    let publisher = Arc::new(HangingPublisher::new());
    let engine =
        LifecycleEngine::new(store.clone(), &short_budget()).with_publisher(publisher.clone());
    let slow = store.insert_article(overdue("Slow lease article", 1100)).await?;

    engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    publisher.hang.store(false, Ordering::SeqCst);

    // リース保持中は再試行しない
    let held = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(held.skipped, 1);
    assert_eq!(held.publish_retried, 0);
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);

    let mut abandoned = store.get_article(&slow.id).await?.expect("article exists");
    abandoned.publish_claimed_at = Some(Utc::now() - Duration::minutes(10));
    store
        .compare_and_swap(ArticleStatus::Approved, abandoned.revision, abandoned)
        .await?;

    let resumed = engine.run_sla_sweep(Utc::now()).await?;
    assert_eq!(resumed.publish_retried, 1);
    assert_eq!(resumed.published, 1);

    let stored = store.get_article(&slow.id).await?.expect("article exists");
    assert_eq!(stored.status, ArticleStatus::Published);
    assert_eq!(stored.publish_attempts, 2);
    assert!(stored.publish_error.is_none());
    assert!(stored.publish_claimed_at.is_none());

    Ok(())
}

#[tokio::test]
async fn test_failed_insert_releases_idea() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(FailingInsertStore::default());
    let engine = LifecycleEngine::new(store.clone(), &PipelineConfig::default());
    let idea = store
        .insert_idea(ContentIdea::new("Online Accounting Degrees", ["online accounting"]))
        .await?;

    let err = engine
        .start_generation(&idea.id, &DuplicateCorpus::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));

    let idea = store.get_idea(&idea.id).await?.expect("idea exists");
    assert!(idea.article_id.is_none());

    Ok(())
}
