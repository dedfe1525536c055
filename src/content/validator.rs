//! Content Validator
//!
//! 記事本文の長さ・読みやすさ・キーワード密度・リンク構文を検査し、
//! SEOスコアと改善提案を含むレポートを生成する

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::keywords::{DensityVerdict, KeywordDensity, MAX_DENSITY, MIN_DENSITY};
use super::markup::strip_markup;
use super::metrics::TextMetrics;
use super::shortcode::ShortcodeCodec;
use crate::config::ValidationConfig;
use crate::error::{ValidationCode, ValidationError};
use crate::lifecycle::Article;

/// SEO penalty table
pub mod penalty {
    pub const VERY_SHORT: u8 = 20;
    pub const SHORT: u8 = 10;
    pub const LOW_READABILITY: u8 = 15;
    pub const FAIR_READABILITY: u8 = 5;
    pub const KEYWORD_DENSITY: u8 = 15;
    pub const META_DESCRIPTION: u8 = 10;
    pub const TITLE_LENGTH: u8 = 10;
}

const AFFIRMATIVE: &str = "Content meets all quality checks and is ready for publication.";

/// 提案カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionCategory {
    /// コンテンツ長
    ContentLength,
    /// 読みやすさ
    Readability,
    /// キーワード
    Keywords,
    /// メタデータ
    Metadata,
    /// リンク構文
    Links,
}

/// SEO改善提案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoSuggestion {
    pub category: SuggestionCategory,
    /// 重要度 (1-5)
    pub priority: u8,
    pub message: String,
}

/// 検証レポート（毎回計算し直す）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub word_count: usize,
    pub sentence_count: usize,
    pub syllable_count: usize,
    pub readability_score: f64,
    pub readability_grade: String,
    pub keyword_density: BTreeMap<String, f64>,
    pub mean_keyword_density: Option<f64>,
    /// 0-100
    pub seo_score: u8,
    pub recommendations: Vec<String>,
    pub suggestions: Vec<SeoSuggestion>,
    /// Blocking findings; non-empty iff `valid == false`
    pub errors: Vec<ValidationError>,
    /// Advisory findings
    pub warnings: Vec<ValidationError>,
    pub risk_flags: BTreeSet<String>,
    pub valid: bool,
}

impl ValidationReport {
    pub fn has_error(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Pure validator; never mutates the article
#[derive(Debug, Clone, Default)]
pub struct ContentValidator {
    config: ValidationConfig,
}

impl ContentValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate(&self, article: &Article) -> ValidationReport {
        let mut builder = ReportBuilder::default();

        let text = strip_markup(&article.body);
        let metrics = TextMetrics::measure(&text);
        let density = KeywordDensity::compute(&text, &article.target_keywords);
        let title = article.title.trim();

        if title.is_empty() {
            builder.block(ValidationCode::EmptyTitle, "Article title is empty.");
        }
        if text.is_empty() {
            builder.block(ValidationCode::EmptyBody, "Article body is empty.");
        }

        let words = if text.is_empty() { 0 } else { metrics.words };
        self.check_length(&mut builder, words, &article.content_type);
        self.check_readability(&mut builder, metrics.readability);
        self.check_keywords(&mut builder, &density);
        self.check_metadata(&mut builder, title, article.meta_description.as_deref());

        for err in ShortcodeCodec::validate(&article.body) {
            builder.block(ValidationCode::ShortcodeSyntax, format!("Link syntax: {}.", err));
            builder.suggest(
                SuggestionCategory::Links,
                5,
                format!("Fix link markup: {}.", err),
            );
        }

        builder.finish(ReportMetrics {
            words,
            metrics,
            keyword_density: density.densities.clone(),
            mean_density: density.mean(),
        })
    }

    fn check_length(&self, builder: &mut ReportBuilder, words: usize, content_type: &str) {
        if words < 300 {
            builder.penalize(penalty::VERY_SHORT);
            builder.flag("thin_content");
            builder.suggest(
                SuggestionCategory::ContentLength,
                4,
                format!(
                    "Content is very short ({} words); expand it to at least 600 words.",
                    words
                ),
            );
        } else if words < 600 {
            builder.penalize(penalty::SHORT);
            builder.suggest(
                SuggestionCategory::ContentLength,
                3,
                format!("Content is short ({} words); consider expanding past 600 words.", words),
            );
        }

        let minimum = self.config.minimum_for(content_type);
        if words < minimum {
            builder.block(
                ValidationCode::WordCount,
                format!(
                    "Word count {} is below the required minimum of {}.",
                    words, minimum
                ),
            );
        }
    }

    fn check_readability(&self, builder: &mut ReportBuilder, readability: f64) {
        if readability < 50.0 {
            builder.penalize(penalty::LOW_READABILITY);
            builder.flag("low_readability");
            builder.advise(
                ValidationCode::Readability,
                format!(
                    "Readability score {:.1} is difficult; \
                     use shorter sentences and simpler words.",
                    readability
                ),
                SuggestionCategory::Readability,
                4,
            );
        } else if readability < 60.0 {
            builder.penalize(penalty::FAIR_READABILITY);
            builder.advise(
                ValidationCode::Readability,
                format!(
                    "Readability score {:.1} is fairly difficult; simplify some sentences.",
                    readability
                ),
                SuggestionCategory::Readability,
                2,
            );
        }
    }

    fn check_keywords(&self, builder: &mut ReportBuilder, density: &KeywordDensity) {
        let mean = density.mean().unwrap_or_default();
        match density.verdict() {
            DensityVerdict::TooSparse => {
                builder.penalize(penalty::KEYWORD_DENSITY);
                builder.flag("sparse_keywords");
                builder.advise(
                    ValidationCode::KeywordDensity,
                    format!(
                        "Average keyword density {:.2}% is below {}%; \
                         mention target keywords more often.",
                        mean, MIN_DENSITY
                    ),
                    SuggestionCategory::Keywords,
                    3,
                );
            }
            DensityVerdict::Stuffed => {
                builder.penalize(penalty::KEYWORD_DENSITY);
                builder.flag("keyword_stuffing");
                builder.advise(
                    ValidationCode::KeywordDensity,
                    format!(
                        "Average keyword density {:.2}% exceeds {}%; \
                         reduce repetition to avoid stuffing penalties.",
                        mean, MAX_DENSITY
                    ),
                    SuggestionCategory::Keywords,
                    4,
                );
            }
            DensityVerdict::Optimal | DensityVerdict::NotApplicable => {}
        }
    }

    fn check_metadata(&self, builder: &mut ReportBuilder, title: &str, meta: Option<&str>) {
        let meta_len = meta.map(|m| m.trim().chars().count()).unwrap_or(0);
        if meta_len < self.config.meta_description_min_chars {
            builder.penalize(penalty::META_DESCRIPTION);
            let message = if meta_len == 0 {
                "Meta description is missing; add a summary of at least 120 characters.".to_string()
            } else {
                format!(
                    "Meta description is {} characters; extend it to at least {}.",
                    meta_len, self.config.meta_description_min_chars
                )
            };
            builder.advise(
                ValidationCode::MetaDescription,
                message,
                SuggestionCategory::Metadata,
                3,
            );
        }

        let title_len = title.chars().count();
        if title_len < self.config.title_min_chars || title_len > self.config.title_max_chars {
            builder.penalize(penalty::TITLE_LENGTH);
            builder.advise(
                ValidationCode::TitleLength,
                format!(
                    "Title is {} characters; keep it between {} and {}.",
                    title_len, self.config.title_min_chars, self.config.title_max_chars
                ),
                SuggestionCategory::Metadata,
                3,
            );
        }
    }
}

struct ReportMetrics {
    words: usize,
    metrics: TextMetrics,
    keyword_density: BTreeMap<String, f64>,
    mean_density: Option<f64>,
}

#[derive(Default)]
struct ReportBuilder {
    penalty: u32,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
    suggestions: Vec<SeoSuggestion>,
    recommendations: Vec<String>,
    risk_flags: BTreeSet<String>,
}

impl ReportBuilder {
    fn penalize(&mut self, points: u8) {
        self.penalty += u32::from(points);
    }

    fn flag(&mut self, flag: &str) {
        self.risk_flags.insert(flag.to_string());
    }

    fn block(&mut self, code: ValidationCode, message: impl Into<String>) {
        let message = message.into();
        self.recommendations.push(message.clone());
        self.errors.push(ValidationError::blocking(code, message));
    }

    fn advise(
        &mut self,
        code: ValidationCode,
        message: String,
        category: SuggestionCategory,
        priority: u8,
    ) {
        self.warnings.push(ValidationError::advisory(code, message.clone()));
        self.suggest(category, priority, message);
    }

    fn suggest(&mut self, category: SuggestionCategory, priority: u8, message: String) {
        if category != SuggestionCategory::Links {
            self.recommendations.push(message.clone());
        }
        self.suggestions.push(SeoSuggestion {
            category,
            priority,
            message,
        });
    }

    fn finish(mut self, m: ReportMetrics) -> ValidationReport {
        if self.recommendations.is_empty() {
            self.recommendations.push(AFFIRMATIVE.to_string());
        }
        let seo_score = 100u32.saturating_sub(self.penalty).min(100) as u8;

        ValidationReport {
            word_count: m.words,
            sentence_count: m.metrics.sentences,
            syllable_count: m.metrics.syllables,
            readability_score: m.metrics.readability,
            readability_grade: m.metrics.grade().to_string(),
            keyword_density: m.keyword_density,
            mean_keyword_density: m.mean_density,
            seo_score,
            recommendations: self.recommendations,
            suggestions: self.suggestions,
            valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
            risk_flags: self.risk_flags,
        }
    }
}
