//! Text Metrics
//!
//! プレーンテキストの語数・文数・音節数とFlesch Reading Easeスコア

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn vowel_group_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)[aeiouy]+").expect("valid vowel regex"))
}

/// 計測結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextMetrics {
    /// 語数（最低1）
    pub words: usize,
    /// 文数（最低1）
    pub sentences: usize,
    /// 音節数（1語あたり最低1）
    pub syllables: usize,
    /// Flesch Reading Ease (0.0-100.0)
    pub readability: f64,
}

impl TextMetrics {
    /// プレーンテキストから計測
    pub fn measure(text: &str) -> Self {
        let words = count_words(text);
        let sentences = count_sentences(text);
        let syllables = count_syllables(text);
        Self {
            words,
            sentences,
            syllables,
            readability: flesch_reading_ease(words, sentences, syllables),
        }
    }

    /// 読みやすさラベル
    pub fn grade(&self) -> &'static str {
        readability_grade(self.readability)
    }
}

/// Whitespace-delimited tokens, never less than 1
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

/// `.!?`-delimited non-empty segments, never less than 1
pub fn count_sentences(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|segment| !segment.trim().is_empty())
        .count()
        .max(1)
}

/// Vowel groups per word, at least one per word
pub fn count_syllables(text: &str) -> usize {
    let total: usize = text
        .split_whitespace()
        .map(|word| vowel_group_pattern().find_iter(word).count().max(1))
        .sum();
    total.max(1)
}

/// `206.835 − 1.015·(words/sentences) − 84.6·(syllables/words)`, clamped to [0,100]
pub fn flesch_reading_ease(words: usize, sentences: usize, syllables: usize) -> f64 {
    let words = words.max(1) as f64;
    let sentences = sentences.max(1) as f64;
    let syllables = syllables.max(1) as f64;

    let score = 206.835 - 1.015 * (words / sentences) - 84.6 * (syllables / words);
    score.clamp(0.0, 100.0)
}

/// Flesch score band label
pub fn readability_grade(score: f64) -> &'static str {
    match score {
        s if s >= 90.0 => "Very Easy",
        s if s >= 80.0 => "Easy",
        s if s >= 70.0 => "Fairly Easy",
        s if s >= 60.0 => "Standard",
        s if s >= 50.0 => "Fairly Difficult",
        s if s >= 30.0 => "Difficult",
        _ => "Very Difficult",
    }
}
