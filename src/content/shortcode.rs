//! Shortcode Codec
//!
//! `<a href>` マークアップと正規化されたリンクショートコード
//! `[link type="..." url="..."]text[/link]` の相互変換・構文検証

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use super::links::{is_skippable, LinkClassifier, LinkType, ResolvedLink};

/// Attributes carried over from `<a>` into a token
pub const PRESERVED_ATTRIBUTES: [&str; 5] = ["class", "id", "title", "target", "rel"];

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid anchor regex")
    })
}

fn anchor_open_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<a\b([^>]*)>").expect("valid anchor open regex"))
}

fn html_attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*"#,
            r#"(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#,
        ))
        .expect("valid attribute regex")
    })
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)\[link((?:\s+[A-Za-z_-]+\s*=\s*"[^"]*")*)\s*\](.*?)\[/link\]"#)
            .expect("valid token regex")
    })
}

/// Opening tag; quoted values may contain `]`, malformed tags still match
fn token_open_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\[link((?:\s+[A-Za-z_-]+\s*=\s*"[^"]*")*)\s*\]|\[link(\s[^\]]*)?\]"#)
            .expect("valid token open regex")
    })
}

fn token_close_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[/link\]").expect("valid token close regex"))
}

fn token_attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"([A-Za-z_-]+)\s*=\s*"([^"]*)""#).expect("valid token attribute regex")
    })
}

/// 分類済みリンクの正規表現
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcodeToken {
    pub link_type: LinkType,
    pub url: String,
    /// Inner markup between the tags
    pub text: String,
    /// Subset of [`PRESERVED_ATTRIBUTES`]
    pub attributes: BTreeMap<String, String>,
}

impl ShortcodeToken {
    /// Serialize as `[link type=".." url=".." ...]text[/link]`
    pub fn render(&self) -> String {
        let mut out = format!(
            r#"[link type="{}" url="{}""#,
            self.link_type,
            self.url.replace('"', "%22")
        );
        for name in PRESERVED_ATTRIBUTES {
            if let Some(value) = self.attributes.get(name) {
                out.push_str(&format!(r#" {}="{}""#, name, value.replace('"', "&quot;")));
            }
        }
        out.push(']');
        out.push_str(&self.text);
        out.push_str("[/link]");
        out
    }

    /// Render as an HTML anchor
    pub fn to_html(&self, options: &DecodeOptions) -> String {
        let mut out = format!(r#"<a href="{}""#, escape_html_attribute(&self.url));
        for name in ["class", "id", "title"] {
            if let Some(value) = self.attributes.get(name) {
                out.push_str(&format!(r#" {}="{}""#, name, escape_html_attribute(value)));
            }
        }

        let outbound = self.link_type.is_outbound();
        let target = match self.attributes.get("target") {
            Some(t) => Some(t.clone()),
            None if outbound && options.new_tab => Some("_blank".to_string()),
            None => None,
        };

        let mut rel: Vec<String> = self
            .attributes
            .get("rel")
            .map(|r| r.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        if outbound && options.nofollow {
            push_unique(&mut rel, "nofollow");
        }
        if outbound && target.as_deref() == Some("_blank") {
            push_unique(&mut rel, "noopener");
        }

        if let Some(target) = target {
            out.push_str(&format!(r#" target="{}""#, escape_html_attribute(&target)));
        }
        if !rel.is_empty() {
            out.push_str(&format!(r#" rel="{}""#, escape_html_attribute(&rel.join(" "))));
        }
        out.push('>');
        out.push_str(&self.text);
        out.push_str("</a>");
        out
    }

    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let attrs = parse_token_attributes(caps.get(1).map_or("", |m| m.as_str()));
        let link_type = attrs.get("type")?.parse::<LinkType>().ok()?;
        let url = attrs.get("url").filter(|u| !u.trim().is_empty())?.clone();
        let attributes = attrs
            .into_iter()
            .filter(|(k, _)| PRESERVED_ATTRIBUTES.contains(&k.as_str()))
            .collect();
        Some(Self {
            link_type,
            url,
            text: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            attributes,
        })
    }
}

/// Per-type link counts produced by [`ShortcodeCodec::encode`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub internal: usize,
    pub affiliate: usize,
    pub external: usize,
    /// Anchors and non-navigational links left as-is
    pub skipped: usize,
    /// Existing tokens kept untouched
    pub preserved: usize,
}

impl LinkStats {
    pub fn record(&mut self, link_type: LinkType) {
        match link_type {
            LinkType::Internal => self.internal += 1,
            LinkType::Affiliate => self.affiliate += 1,
            LinkType::External => self.external += 1,
        }
    }

    pub fn count(&self, link_type: LinkType) -> usize {
        match link_type {
            LinkType::Internal => self.internal,
            LinkType::Affiliate => self.affiliate,
            LinkType::External => self.external,
        }
    }

    /// Classified links (excludes skipped)
    pub fn total(&self) -> usize {
        self.internal + self.affiliate + self.external
    }

    /// `(internal, affiliate, external)`
    pub fn classification(&self) -> (usize, usize, usize) {
        (self.internal, self.affiliate, self.external)
    }
}

/// エンコードオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// 既存トークンを再分類せずにカウントのみ行う
    pub preserve_existing: bool,
}

/// デコードオプション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// 外部・アフィリエイトリンクに target="_blank" を付与
    pub new_tab: bool,
    /// 外部・アフィリエイトリンクに rel="nofollow" を付与
    pub nofollow: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            new_tab: true,
            nofollow: true,
        }
    }
}

/// ショートコード構文エラー
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ShortcodeError {
    #[error("unbalanced link shortcodes: {open} opening vs {close} closing tags")]
    UnbalancedTags { open: usize, close: usize },

    #[error("link shortcode #{position} has no url attribute")]
    MissingUrl { position: usize },

    #[error("link shortcode #{position} has invalid type '{value}'")]
    InvalidType { position: usize, value: String },

    #[error("{count} raw hyperlink(s) were not converted to shortcodes")]
    RawHyperlink { count: usize },
}

/// Bidirectional link transformer bound to one site configuration
#[derive(Debug, Clone)]
pub struct ShortcodeCodec {
    classifier: LinkClassifier,
    decode_options: DecodeOptions,
}

impl ShortcodeCodec {
    pub fn new(site_domain: &str, affiliate_domains: &[String]) -> Self {
        Self {
            classifier: LinkClassifier::new(site_domain, affiliate_domains),
            decode_options: DecodeOptions::default(),
        }
    }

    pub fn from_config(config: &crate::config::LinkConfig) -> Self {
        Self::new(&config.site_domain, &config.affiliate_domains).with_decode_options(
            DecodeOptions {
                new_tab: config.new_tab,
                nofollow: config.nofollow,
            },
        )
    }

    pub fn with_decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    pub fn classifier(&self) -> &LinkClassifier {
        &self.classifier
    }

    /// Convert raw `<a>` markup into tokens, keeping existing tokens.
    pub fn transform_links(&self, html: &str) -> (String, LinkStats) {
        self.encode(
            html,
            &EncodeOptions {
                preserve_existing: true,
            },
        )
    }

    /// Convert every hyperlink into a classified token.
    pub fn encode(&self, html: &str, options: &EncodeOptions) -> (String, LinkStats) {
        let mut stats = LinkStats::default();

        let with_tokens = token_pattern().replace_all(html, |caps: &Captures<'_>| {
            let original = caps[0].to_string();
            let Some(token) = ShortcodeToken::from_captures(caps) else {
                // 不正なトークンは validate() で報告する
                return original;
            };
            if options.preserve_existing {
                stats.record(token.link_type);
                stats.preserved += 1;
                return original;
            }
            let link_type = self.classifier.classify(&token.url).unwrap_or(token.link_type);
            stats.record(link_type);
            ShortcodeToken { link_type, ..token }.render()
        });

        let encoded = anchor_pattern().replace_all(&with_tokens, |caps: &Captures<'_>| {
            let original = caps[0].to_string();
            let attributes = parse_html_attributes(&caps[1]);
            let Some(href) = attributes.get("href") else {
                return original;
            };

            let (link_type, url) = match self.classifier.resolve(href) {
                Some(ResolvedLink::Skip) => {
                    stats.skipped += 1;
                    return original;
                }
                Some(ResolvedLink::Url(url)) => {
                    (self.classifier.classify_url(&url), url.to_string())
                }
                None => (LinkType::External, href.trim().to_string()),
            };
            debug!(url = %url, link_type = %link_type, "classified link");
            stats.record(link_type);

            ShortcodeToken {
                link_type,
                url,
                text: caps[2].to_string(),
                attributes: attributes
                    .into_iter()
                    .filter(|(k, _)| PRESERVED_ATTRIBUTES.contains(&k.as_str()))
                    .collect(),
            }
            .render()
        });

        (encoded.into_owned(), stats)
    }

    /// Render tokens back into HTML anchors using the codec's default options.
    pub fn render_html(&self, content: &str) -> String {
        Self::decode(content, &self.decode_options)
    }

    /// Render tokens back into HTML anchors.
    ///
    /// Malformed tokens are left in place so that `validate` still sees them.
    pub fn decode(content: &str, options: &DecodeOptions) -> String {
        token_pattern()
            .replace_all(content, |caps: &Captures<'_>| match ShortcodeToken::from_captures(caps) {
                Some(token) => token.to_html(options),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Parse every well-formed token in document order.
    pub fn parse_tokens(content: &str) -> Vec<ShortcodeToken> {
        token_pattern()
            .captures_iter(content)
            .filter_map(|caps| ShortcodeToken::from_captures(&caps))
            .collect()
    }

    /// Syntax check: tag balance, url presence, type enum, residual `<a href>`.
    pub fn validate(content: &str) -> Vec<ShortcodeError> {
        let mut errors = Vec::new();

        let open = token_open_pattern().find_iter(content).count();
        let close = token_close_pattern().find_iter(content).count();
        if open != close {
            errors.push(ShortcodeError::UnbalancedTags { open, close });
        }

        for (index, caps) in token_open_pattern().captures_iter(content).enumerate() {
            let position = index + 1;
            let raw_attrs = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            let attrs = parse_token_attributes(raw_attrs);

            match attrs.get("type") {
                Some(value) if value.parse::<LinkType>().is_ok() => {}
                Some(value) => errors.push(ShortcodeError::InvalidType {
                    position,
                    value: value.clone(),
                }),
                None => errors.push(ShortcodeError::InvalidType {
                    position,
                    value: String::new(),
                }),
            }

            if attrs.get("url").map_or(true, |u| u.trim().is_empty()) {
                errors.push(ShortcodeError::MissingUrl { position });
            }
        }

        let raw = anchor_open_pattern()
            .captures_iter(content)
            .filter(|caps| {
                parse_html_attributes(&caps[1])
                    .get("href")
                    .is_some_and(|href| !href.trim().is_empty() && !is_skippable(href))
            })
            .count();
        if raw > 0 {
            errors.push(ShortcodeError::RawHyperlink { count: raw });
        }

        errors
    }
}

fn parse_html_attributes(raw: &str) -> BTreeMap<String, String> {
    html_attribute_pattern()
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_ascii_lowercase(), unescape_html_attribute(value))
        })
        .collect()
}

fn parse_token_attributes(raw: &str) -> BTreeMap<String, String> {
    token_attribute_pattern()
        .captures_iter(raw)
        .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].replace("&quot;", "\"")))
        .collect()
}

fn escape_html_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn unescape_html_attribute(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        values.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> ShortcodeCodec {
        ShortcodeCodec::new("geteducated.com", &["partner-lms.org".to_string()])
    }

    const SAMPLE: &str = r##"<p>See <a href="/courses/mba" class="cta">our MBA list</a>,
        the <a href='https://partner-lms.org/course' title="Partner">partner course</a>
        and <a href="https://nces.gov/data" rel="external">federal data</a>.
        Jump to <a href="#faq">the FAQ</a>.</p>"##;

    #[test]
    fn test_encode_classifies_and_counts() {
        let (encoded, stats) = codec().encode(SAMPLE, &EncodeOptions::default());

        assert_eq!(stats.classification(), (1, 1, 1));
        assert_eq!(stats.skipped, 1);
        assert!(encoded.contains(concat!(
            r#"[link type="internal" url="https://geteducated.com/courses/mba" class="cta"]"#,
            "our MBA list[/link]",
        )));
        assert!(encoded.contains(concat!(
            r#"[link type="affiliate" url="https://partner-lms.org/course" title="Partner"]"#,
            "partner course[/link]",
        )));
        assert!(encoded.contains(r#"rel="external"]federal data[/link]"#));
        assert!(encoded.contains(r##"<a href="#faq">the FAQ</a>"##));
        assert!(ShortcodeCodec::validate(&encoded).is_empty());
    }

    #[test]
    fn test_decode_outbound_defaults() {
        let (encoded, _) = codec().encode(SAMPLE, &EncodeOptions::default());
        let html = ShortcodeCodec::decode(&encoded, &DecodeOptions::default());

        assert!(html.contains(
            r#"<a href="https://geteducated.com/courses/mba" class="cta">our MBA list</a>"#
        ));
        assert!(html.contains(concat!(
            r#"<a href="https://partner-lms.org/course" title="Partner" "#,
            r#"target="_blank" rel="nofollow noopener">partner course</a>"#,
        )));
        assert!(html.contains(r#"rel="external nofollow noopener""#));
    }

    #[test]
    fn test_decode_options_disabled() {
        let token = ShortcodeToken {
            link_type: LinkType::External,
            url: "https://nces.gov/data".to_string(),
            text: "data".to_string(),
            attributes: BTreeMap::new(),
        };
        let html = token.to_html(&DecodeOptions {
            new_tab: false,
            nofollow: false,
        });
        assert_eq!(html, r#"<a href="https://nces.gov/data">data</a>"#);
    }

    #[test]
    fn test_round_trip_preserves_classification() {
        let codec = codec();
        let (first, first_stats) = codec.encode(SAMPLE, &EncodeOptions::default());
        let html = codec.render_html(&first);
        let (_, second_stats) = codec.encode(&html, &EncodeOptions::default());

        assert_eq!(first_stats.classification(), second_stats.classification());
        assert_eq!(first_stats.skipped, second_stats.skipped);
    }

    #[test]
    fn test_preserve_existing_is_noop_on_shortcoded_content() {
        let codec = codec();
        let (encoded, _) = codec.encode(SAMPLE, &EncodeOptions::default());
        let (again, stats) = codec.transform_links(&encoded);

        assert_eq!(again, encoded);
        assert_eq!(stats.preserved, 3);
        assert_eq!(stats.classification(), (1, 1, 1));
    }

    #[test]
    fn test_reclassify_existing_tokens() {
        let content = r#"[link type="external" url="https://partner-lms.org/x"]x[/link]"#;
        let (encoded, stats) = codec().encode(content, &EncodeOptions::default());
        assert_eq!(stats.affiliate, 1);
        assert!(encoded.starts_with(r#"[link type="affiliate""#));
    }

    #[test]
    fn test_validate_reports_errors() {
        let content = r##"[link type="sponsored" url="https://a.com"]a[/link]
            [link type="external"]b[/link]
            [link type="internal" url="/x"]c
            <a href="https://nces.gov">raw</a> <a href="#top">top</a>"##;
        let errors = ShortcodeCodec::validate(content);

        assert!(errors.contains(&ShortcodeError::UnbalancedTags { open: 3, close: 2 }));
        assert!(errors.contains(&ShortcodeError::InvalidType {
            position: 1,
            value: "sponsored".to_string()
        }));
        assert!(errors.contains(&ShortcodeError::MissingUrl { position: 2 }));
        assert!(errors.contains(&ShortcodeError::RawHyperlink { count: 1 }));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_bracketed_query_encodes_to_valid_token() {
        let codec = codec();
        let html = r#"<p><a href="https://nces.gov/search?tags[]=mba" title="[1]">data</a></p>"#;
        let (encoded, stats) = codec.encode(html, &EncodeOptions::default());

        assert_eq!(stats.external, 1);
        assert!(encoded.contains(r#"url="https://nces.gov/search?tags[]=mba""#));
        assert_eq!(ShortcodeCodec::validate(&encoded), vec![]);

        let tokens = ShortcodeCodec::parse_tokens(&encoded);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].attributes.get("title").map(String::as_str), Some("[1]"));
    }

    #[test]
    fn test_bare_open_tag_still_counted() {
        let errors = ShortcodeCodec::validate("[link]orphan");
        assert!(errors.contains(&ShortcodeError::UnbalancedTags { open: 1, close: 0 }));
        assert!(errors.contains(&ShortcodeError::MissingUrl { position: 1 }));
    }

    #[test]
    fn test_ampersand_urls_survive_round_trip() {
        let codec = codec();
        let html = r#"<a href="https://nces.gov/q?a=1&amp;b=2">q</a>"#;
        let (encoded, _) = codec.encode(html, &EncodeOptions::default());
        assert!(encoded.contains(r#"url="https://nces.gov/q?a=1&b=2""#));

        let decoded = codec.render_html(&encoded);
        assert!(decoded.contains(r#"href="https://nces.gov/q?a=1&amp;b=2""#));
    }

    #[test]
    fn test_parse_tokens() {
        let (encoded, _) = codec().encode(SAMPLE, &EncodeOptions::default());
        let tokens = ShortcodeCodec::parse_tokens(&encoded);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].link_type, LinkType::Affiliate);
        assert_eq!(tokens[1].attributes.get("title").map(String::as_str), Some("Partner"));
    }
}
