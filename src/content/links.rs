//! Link Classifier
//!
//! URLをサイトドメイン・アフィリエイトドメイン設定に基づいて分類

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// リンク種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// 自サイト内リンク
    Internal,
    /// 提携先（収益化対象）リンク
    Affiliate,
    /// その他の外部リンク
    External,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Internal => "internal",
            LinkType::Affiliate => "affiliate",
            LinkType::External => "external",
        }
    }

    /// 外部向け（新規タブ・nofollow対象）か
    pub fn is_outbound(&self) -> bool {
        !matches!(self, LinkType::Internal)
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(LinkType::Internal),
            "affiliate" => Ok(LinkType::Affiliate),
            "external" => Ok(LinkType::External),
            other => Err(format!("unknown link type: {}", other)),
        }
    }
}

/// Outcome of resolving an `href`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLink {
    /// Absolute URL ready for classification
    Url(Url),
    /// In-page anchor or non-navigational scheme, left untouched
    Skip,
}

/// Classifies links against a site domain and a list of affiliate domains
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    site_host: String,
    base: Option<Url>,
    affiliate_domains: Vec<String>,
}

impl LinkClassifier {
    /// `site_domain` may be a bare host (`geteducated.com`) or a full origin.
    pub fn new(site_domain: &str, affiliate_domains: &[String]) -> Self {
        let base = parse_origin(site_domain);
        let site_host = base
            .as_ref()
            .and_then(|u| u.host_str())
            .map(normalize_host)
            .unwrap_or_else(|| normalize_host(site_domain));

        Self {
            site_host,
            base,
            affiliate_domains: affiliate_domains
                .iter()
                .map(|d| normalize_host(d.trim()))
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn site_host(&self) -> &str {
        &self.site_host
    }

    /// Resolve `href` to an absolute URL; relative links resolve against the site.
    pub fn resolve(&self, href: &str) -> Option<ResolvedLink> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        if is_skippable(href) {
            return Some(ResolvedLink::Skip);
        }

        match Url::parse(href) {
            Ok(url) => Some(ResolvedLink::Url(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .as_ref()
                .and_then(|base| base.join(href).ok())
                .map(ResolvedLink::Url),
            Err(_) => None,
        }
    }

    /// Classify an absolute URL.
    ///
    /// Host equal to the site domain (ignoring `www.`) is internal; a host
    /// matching or containing an affiliate domain is affiliate; anything else
    /// is external.
    pub fn classify_url(&self, url: &Url) -> LinkType {
        let host = match url.host_str() {
            Some(h) => normalize_host(h),
            None => return LinkType::External,
        };

        if !self.site_host.is_empty() && host == self.site_host {
            return LinkType::Internal;
        }
        if self
            .affiliate_domains
            .iter()
            .any(|domain| host == *domain || host.contains(domain.as_str()))
        {
            return LinkType::Affiliate;
        }
        LinkType::External
    }

    /// Resolve and classify; unresolvable links count as external.
    pub fn classify(&self, href: &str) -> Option<LinkType> {
        match self.resolve(href) {
            Some(ResolvedLink::Url(url)) => Some(self.classify_url(&url)),
            Some(ResolvedLink::Skip) => None,
            None => Some(LinkType::External),
        }
    }
}

/// `#anchor`, `mailto:`, `tel:` and `javascript:` links are never transformed
pub fn is_skippable(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    lower.starts_with('#')
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
}

fn parse_origin(site_domain: &str) -> Option<Url> {
    let trimmed = site_domain.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        format!("{}/", trimmed)
    } else {
        format!("https://{}/", trimmed)
    };
    Url::parse(&candidate).ok()
}

fn normalize_host(host: &str) -> String {
    let lower = host.trim().to_ascii_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}
