//! Keyword Density
//!
//! ターゲットキーワードの出現率（総語数比, %）

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metrics::count_words;

/// 推奨密度の下限 (%)
pub const MIN_DENSITY: f64 = 0.5;
/// 推奨密度の上限 (%)
pub const MAX_DENSITY: f64 = 3.0;

/// Mean-density verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityVerdict {
    /// No target keywords supplied
    NotApplicable,
    TooSparse,
    Optimal,
    Stuffed,
}

/// Per-keyword densities for one text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordDensity {
    pub densities: BTreeMap<String, f64>,
    pub total_words: usize,
}

impl KeywordDensity {
    /// Compute `(occurrences / total_words) × 100` for every keyword.
    ///
    /// Matching is case-insensitive on whole words; multi-word keywords match
    /// as a phrase with any whitespace between the words.
    pub fn compute(text: &str, keywords: &[String]) -> Self {
        let total_words = count_words(text);
        let densities = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|keyword| {
                let occurrences = count_occurrences(text, keyword);
                let density = occurrences as f64 * 100.0 / total_words as f64;
                (keyword.clone(), density)
            })
            .collect();

        Self {
            densities,
            total_words,
        }
    }

    /// Arithmetic mean across keywords, `None` when there are none
    pub fn mean(&self) -> Option<f64> {
        if self.densities.is_empty() {
            return None;
        }
        Some(self.densities.values().sum::<f64>() / self.densities.len() as f64)
    }

    pub fn verdict(&self) -> DensityVerdict {
        match self.mean() {
            None => DensityVerdict::NotApplicable,
            Some(m) if m < MIN_DENSITY => DensityVerdict::TooSparse,
            Some(m) if m > MAX_DENSITY => DensityVerdict::Stuffed,
            Some(_) => DensityVerdict::Optimal,
        }
    }
}

fn count_occurrences(text: &str, keyword: &str) -> usize {
    let phrase = keyword
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    match Regex::new(&format!(r"(?i)\b{}\b", phrase)) {
        Ok(re) => re.find_iter(text).count(),
        Err(_) => {
            let lower = keyword.to_lowercase();
            text.to_lowercase().matches(&lower).count()
        }
    }
}
