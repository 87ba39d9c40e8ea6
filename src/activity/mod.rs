//! Closed activity taxonomy and domain classification.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Media,
    Shopping,
    Browsing,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Media, Category::Shopping, Category::Browsing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Media => "media",
            Category::Shopping => "shopping",
            Category::Browsing => "browsing",
        }
    }

    /// Substrings checked against the domain, in match priority order.
    fn markers(&self) -> &'static [&'static str] {
        match self {
            Category::Media => MEDIA_MARKERS,
            Category::Shopping => SHOPPING_MARKERS,
            Category::Browsing => &[],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "media" => Ok(Category::Media),
            "shopping" => Ok(Category::Shopping),
            "browsing" => Ok(Category::Browsing),
            other => Err(anyhow!("unknown category '{other}'")),
        }
    }
}

const MEDIA_MARKERS: &[&str] = &[
    "youtube", "youtu.be", "netflix", "twitch", "vimeo", "disneyplus", "hulu", "primevideo",
    "dailymotion", "spotify", "soundcloud", "tiktok", "instagram", "facebook", "twitter",
    "reddit",
];

const SHOPPING_MARKERS: &[&str] = &[
    "amazon", "ebay", "etsy", "aliexpress", "walmart", "target.com", "bestbuy", "shopify",
    "zalando", "ikea", "temu", "shein",
];

/// Priority order used by [`categorize`]; `Browsing` is the fallback.
const PRIORITY: [Category; 2] = [Category::Media, Category::Shopping];

pub const UNKNOWN_PLATFORM: &str = "unknown";

/// Classifies a domain by substring so subdomains and regional TLDs match.
pub fn categorize(domain: &str) -> Category {
    let domain = domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return Category::Browsing;
    }

    PRIORITY
        .iter()
        .copied()
        .find(|category| category.markers().iter().any(|marker| domain.contains(marker)))
        .unwrap_or(Category::Browsing)
}

/// Reduces a URL-ish string to its host: scheme, credentials, `www.`, port and path removed.
pub fn platform_from_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_start_matches("www.").to_ascii_lowercase();

    if host.is_empty() {
        UNKNOWN_PLATFORM.to_string()
    } else {
        host
    }
}
