use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{Article, ArticleFilter, ArticleStatus, AuditRecord, ContentIdea, IdeaStatus};
use crate::error::{Error, Result};

/// Persistence contract for articles, ideas and the transition audit log.
///
/// `compare_and_swap` is the only way to change a stored article. It succeeds
/// only when the stored `(status, revision)` still equals the expected pair,
/// and the store assigns the next revision.
#[async_trait]
pub trait ArticleStore: Send + Sync + std::fmt::Debug {
    async fn get_article(&self, id: &str) -> Result<Option<Article>>;

    /// Matching articles, oldest deadline first, then oldest created
    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>>;

    async fn insert_article(&self, article: Article) -> Result<Article>;

    async fn compare_and_swap(
        &self,
        expected_status: ArticleStatus,
        expected_revision: u64,
        next: Article,
    ) -> Result<Article>;

    async fn get_idea(&self, id: &str) -> Result<Option<ContentIdea>>;

    async fn list_ideas(&self) -> Result<Vec<ContentIdea>>;

    async fn insert_idea(&self, idea: ContentIdea) -> Result<ContentIdea>;

    /// Attach an article to an idea; an idea is consumed at most once
    async fn link_idea(&self, idea_id: &str, article_id: &str) -> Result<ContentIdea>;

    /// Undo [`ArticleStore::link_idea`] when the article was never stored.
    /// Only clears a link that still points at `article_id`.
    async fn unlink_idea(&self, idea_id: &str, article_id: &str) -> Result<ContentIdea>;

    async fn update_idea_status(&self, idea_id: &str, status: IdeaStatus) -> Result<ContentIdea>;

    async fn record_audit(&self, record: AuditRecord) -> Result<()>;

    async fn audit_log(&self, article_id: &str) -> Result<Vec<AuditRecord>>;
}

/// Serializable store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub ideas: Vec<ContentIdea>,
    #[serde(default)]
    pub audit: Vec<AuditRecord>,
}

#[derive(Debug, Default)]
struct StoreState {
    articles: HashMap<String, Article>,
    ideas: HashMap<String, ContentIdea>,
    audit: Vec<AuditRecord>,
}

/// In-process store; one lock guards articles, ideas and audit together
#[derive(Debug, Clone)]
pub struct MemoryArticleStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let state = StoreState {
            articles: snapshot
                .articles
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            ideas: snapshot.ideas.into_iter().map(|i| (i.id.clone(), i)).collect(),
            audit: snapshot.audit,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        let mut articles: Vec<Article> = state.articles.values().cloned().collect();
        articles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut ideas: Vec<ContentIdea> = state.ideas.values().cloned().collect();
        ideas.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        StoreSnapshot {
            articles,
            ideas,
            audit: state.audit.clone(),
        }
    }

    /// JSONスナップショットから読み込み
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        debug!(
            path = %path.as_ref().display(),
            articles = snapshot.articles.len(),
            ideas = snapshot.ideas.len(),
            "store snapshot loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot().await;
        let raw = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path.as_ref(), raw).await?;
        Ok(())
    }
}

impl Default for MemoryArticleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let state = self.state.read().await;
        Ok(state.articles.get(id).cloned())
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let state = self.state.read().await;
        let mut result: Vec<Article> = state
            .articles
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();

        // 期限の古い順（期限なしは最後）
        result.sort_by(|a, b| {
            let deadline = match (a.auto_approve_at, b.auto_approve_at) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            deadline
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn insert_article(&self, article: Article) -> Result<Article> {
        let mut state = self.state.write().await;
        if state.articles.contains_key(&article.id) {
            return Err(Error::Store(format!("article {} already exists", article.id)));
        }
        state.articles.insert(article.id.clone(), article.clone());
        Ok(article)
    }

    async fn compare_and_swap(
        &self,
        expected_status: ArticleStatus,
        expected_revision: u64,
        mut next: Article,
    ) -> Result<Article> {
        let mut state = self.state.write().await;
        let current = state
            .articles
            .get(&next.id)
            .ok_or_else(|| Error::NotFound(format!("article {}", next.id)))?;

        if current.status != expected_status || current.revision != expected_revision {
            return Err(Error::StateConflict {
                id: next.id.clone(),
                expected: expected_status,
                expected_revision,
                actual: current.status,
                actual_revision: current.revision,
            });
        }

        next.revision = current.revision + 1;
        next.updated_at = Utc::now();
        state.articles.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    async fn get_idea(&self, id: &str) -> Result<Option<ContentIdea>> {
        let state = self.state.read().await;
        Ok(state.ideas.get(id).cloned())
    }

    async fn list_ideas(&self) -> Result<Vec<ContentIdea>> {
        let state = self.state.read().await;
        let mut ideas: Vec<ContentIdea> = state.ideas.values().cloned().collect();
        ideas.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(ideas)
    }

    async fn insert_idea(&self, idea: ContentIdea) -> Result<ContentIdea> {
        let mut state = self.state.write().await;
        if state.ideas.contains_key(&idea.id) {
            return Err(Error::Store(format!("idea {} already exists", idea.id)));
        }
        state.ideas.insert(idea.id.clone(), idea.clone());
        Ok(idea)
    }

    async fn link_idea(&self, idea_id: &str, article_id: &str) -> Result<ContentIdea> {
        let mut state = self.state.write().await;
        let idea = state
            .ideas
            .get_mut(idea_id)
            .ok_or_else(|| Error::NotFound(format!("idea {}", idea_id)))?;

        if let Some(existing) = &idea.article_id {
            return Err(Error::IdeaConsumed {
                idea_id: idea_id.to_string(),
                article_id: existing.clone(),
            });
        }
        idea.article_id = Some(article_id.to_string());
        Ok(idea.clone())
    }

    async fn unlink_idea(&self, idea_id: &str, article_id: &str) -> Result<ContentIdea> {
        let mut state = self.state.write().await;
        let idea = state
            .ideas
            .get_mut(idea_id)
            .ok_or_else(|| Error::NotFound(format!("idea {}", idea_id)))?;

        if idea.article_id.as_deref() == Some(article_id) {
            idea.article_id = None;
        }
        Ok(idea.clone())
    }

    async fn update_idea_status(&self, idea_id: &str, status: IdeaStatus) -> Result<ContentIdea> {
        let mut state = self.state.write().await;
        let idea = state
            .ideas
            .get_mut(idea_id)
            .ok_or_else(|| Error::NotFound(format!("idea {}", idea_id)))?;
        idea.status = status;
        Ok(idea.clone())
    }

    async fn record_audit(&self, record: AuditRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.audit.push(record);
        Ok(())
    }

    async fn audit_log(&self, article_id: &str) -> Result<Vec<AuditRecord>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|r| r.article_id == article_id)
            .cloned()
            .collect())
    }
}
