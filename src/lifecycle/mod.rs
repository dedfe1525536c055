//! Article lifecycle: state machine, SLA sweep and the content store contract.

mod engine;
mod store;
mod types;

pub use engine::{corpus_from_store, LifecycleEngine};
pub use store::{ArticleStore, MemoryArticleStore, StoreSnapshot};
pub use types::{
    Actor, Article, ArticleFilter, ArticleStatus, AuditRecord, ContentIdea, GeneratedDraft,
    IdeaStatus, PublishedPost, ReviewAction, SweepItemError, SweepReport, TransitionOutcome,
    ValidationStatus,
};
