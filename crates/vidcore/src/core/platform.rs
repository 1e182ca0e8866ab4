//! URL validation and platform detection

use lazy_regex::regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use url::Url;

/// Media platform a URL belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Twitter,
    Tiktok,
    Vimeo,
    #[default]
    Unknown,
}

impl Platform {
    /// Detects the platform from the URL host
    pub fn detect(url: &Url) -> Self {
        let Some(host) = url.host_str() else {
            return Platform::Unknown;
        };
        let host = host.to_ascii_lowercase();
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if matches("youtube.com") || matches("youtu.be") {
            Platform::Youtube
        } else if matches("instagram.com") {
            Platform::Instagram
        } else if matches("twitter.com") || matches("x.com") {
            Platform::Twitter
        } else if matches("tiktok.com") {
            Platform::Tiktok
        } else if matches("vimeo.com") {
            Platform::Vimeo
        } else {
            Platform::Unknown
        }
    }

    pub fn is_supported(self) -> bool {
        self != Platform::Unknown
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::Twitter => "Twitter",
            Platform::Tiktok => "TikTok",
            Platform::Vimeo => "Vimeo",
            Platform::Unknown => "Unknown",
        }
    }
}

/// Parses `raw` and returns it only when it points to a supported platform
pub fn parse_supported_url(raw: &str) -> Option<(Url, Platform)> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let platform = Platform::detect(&url);
    platform.is_supported().then_some((url, platform))
}

pub fn is_supported_url(raw: &str) -> bool {
    parse_supported_url(raw).is_some()
}

/// Splits a message into candidate URLs (comma or newline separated)
pub fn split_urls(text: &str) -> Vec<String> {
    regex!(r"[\n,]+")
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when the message looks like it carries at least one link
pub fn looks_like_url(text: &str) -> bool {
    regex!(r"https?://\S+").is_match(text)
}
