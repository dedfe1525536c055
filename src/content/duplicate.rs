//! Duplicate Detector
//!
//! 生成キュー投入前の簡易重複チェック（助言的。誤検出は許容）

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::DuplicateConfig;
use crate::lifecycle::ContentIdea;

/// Existing titles and keywords supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCorpus {
    pub titles: Vec<String>,
    /// Union of all known keyword sets
    pub keywords: BTreeSet<String>,
}

impl DuplicateCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one known article or idea
    pub fn add(
        &mut self,
        title: impl Into<String>,
        keywords: impl IntoIterator<Item = impl AsRef<str>>,
    ) {
        self.titles.push(title.into());
        self.keywords
            .extend(keywords.into_iter().map(|k| normalize_keyword(k.as_ref())));
    }

    pub fn from_ideas<'a>(ideas: impl IntoIterator<Item = &'a ContentIdea>) -> Self {
        let mut corpus = Self::new();
        for idea in ideas {
            corpus.add(idea.title.clone(), &idea.keywords);
        }
        corpus
    }
}

/// Why a candidate was flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DuplicateReason {
    TitlePrefix { existing: String },
    KeywordOverlap { overlap: f64 },
    TitleSimilarity { existing: String, similarity: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub reason: Option<DuplicateReason>,
}

impl DuplicateVerdict {
    fn unique() -> Self {
        Self {
            is_duplicate: false,
            reason: None,
        }
    }

    fn duplicate(reason: DuplicateReason) -> Self {
        Self {
            is_duplicate: true,
            reason: Some(reason),
        }
    }

    pub fn describe(&self) -> String {
        match &self.reason {
            None => "no similar content found".to_string(),
            Some(DuplicateReason::TitlePrefix { existing }) => {
                format!("title prefix matches existing title '{}'", existing)
            }
            Some(DuplicateReason::KeywordOverlap { overlap }) => {
                format!("{:.0}% of keywords already covered", overlap * 100.0)
            }
            Some(DuplicateReason::TitleSimilarity { existing, similarity }) => {
                format!("title is {:.0}% similar to '{}'", similarity * 100.0, existing)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self { config }
    }

    pub fn check(
        &self,
        title: &str,
        keywords: &BTreeSet<String>,
        corpus: &DuplicateCorpus,
    ) -> DuplicateVerdict {
        let candidate = title.trim().to_lowercase();
        if candidate.is_empty() {
            return DuplicateVerdict::unique();
        }

        let prefix: String = candidate.chars().take(self.config.title_prefix_len).collect();
        if let Some(existing) = corpus
            .titles
            .iter()
            .find(|t| t.to_lowercase().contains(prefix.as_str()))
        {
            return DuplicateVerdict::duplicate(DuplicateReason::TitlePrefix {
                existing: existing.clone(),
            });
        }

        let normalized: BTreeSet<String> = keywords
            .iter()
            .map(|k| normalize_keyword(k))
            .filter(|k| !k.is_empty())
            .collect();
        if !normalized.is_empty() {
            let covered = normalized.intersection(&corpus.keywords).count();
            let overlap = covered as f64 / normalized.len() as f64;
            if overlap >= self.config.keyword_overlap_threshold {
                return DuplicateVerdict::duplicate(DuplicateReason::KeywordOverlap { overlap });
            }
        }

        let tokens = title_tokens(&candidate);
        if !tokens.is_empty() {
            for existing in &corpus.titles {
                let similarity = jaccard(&tokens, &title_tokens(&existing.to_lowercase()));
                if similarity >= self.config.title_similarity_threshold {
                    return DuplicateVerdict::duplicate(DuplicateReason::TitleSimilarity {
                        existing: existing.clone(),
                        similarity,
                    });
                }
            }
        }

        DuplicateVerdict::unique()
    }

    pub fn check_idea(&self, idea: &ContentIdea, corpus: &DuplicateCorpus) -> DuplicateVerdict {
        self.check(&idea.title, &idea.keywords, corpus)
    }
}

/// Advisory duplicate check with default thresholds
pub fn classify_duplicate(idea: &ContentIdea, corpus: &DuplicateCorpus) -> bool {
    DuplicateDetector::default().check_idea(idea, corpus).is_duplicate
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

const STOP_WORDS: [&str; 12] = [
    "a", "an", "and", "the", "of", "for", "to", "in", "on", "with", "your", "how",
];

fn title_tokens(title: &str) -> BTreeSet<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
