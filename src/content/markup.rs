//! Markup stripping
//!
//! 本文のHTML・ショートコードを取り除き、計測用のプレーンテキストを得る

use ammonia::Builder;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn shortcode_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"\[/link\]"#,
            r#"|\[link(?:\s+[A-Za-z_-]+\s*=\s*"[^"]*")*\s*\]"#,
            r#"|\[link(?:\s[^\]]*)?\]"#,
        ))
        .expect("valid shortcode tag regex")
    })
}

fn block_boundary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)<\s*(?:br|/p|/h[1-6]|/li|/div|/blockquote|/tr)\b[^>]*>")
            .expect("valid block boundary regex")
    })
}

/// Strip HTML tags, script/style bodies and link shortcodes from `body`.
///
/// Block-level closing tags become whitespace so that words on either side
/// are not glued together. Entities are decoded back to plain characters.
pub fn strip_markup(body: &str) -> String {
    let without_shortcodes = shortcode_tag_pattern().replace_all(body, "");
    let spaced = block_boundary_pattern().replace_all(&without_shortcodes, " $0");

    let mut builder = Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    let cleaned = builder.clean(&spaced).to_string();

    decode_entities(&cleaned)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
