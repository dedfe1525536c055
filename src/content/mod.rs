//! Content processing: text metrics, link shortcodes, validation and duplicate checks.
//!
//! Everything here is pure and synchronous; the lifecycle engine calls into it.

pub mod duplicate;
pub mod keywords;
pub mod links;
pub mod markup;
pub mod metrics;
pub mod shortcode;
pub mod validator;

pub use duplicate::{
    classify_duplicate, DuplicateCorpus, DuplicateDetector, DuplicateReason, DuplicateVerdict,
};
pub use keywords::{DensityVerdict, KeywordDensity};
pub use links::{LinkClassifier, LinkType};
pub use markup::strip_markup;
pub use metrics::TextMetrics;
pub use shortcode::{
    DecodeOptions, EncodeOptions, LinkStats, ShortcodeCodec, ShortcodeError, ShortcodeToken,
};
pub use validator::{ContentValidator, SeoSuggestion, SuggestionCategory, ValidationReport};
