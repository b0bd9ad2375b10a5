//! Key/session context: credential, endpoints and tuning read once from the environment.

use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

use tracing::{debug, warn};

use crate::query::Filter;

pub const DEFAULT_SEARCH_URL: &str = "https://api.nli.org.il/openlibrary/search";
pub const DEFAULT_IIIF_URL: &str = "https://iiif.nli.org.il/IIIFv21";
/// Shared key for anonymous visitors; the archive grants it reduced access.
const VISITOR_KEY: &str = "OHOwpHbdR3Kt6p4S7qjBHddpUam0jHBMsvF5gXPz";

const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_FALLBACK: usize = 5;
const DEFAULT_MEDIA_CONCURRENCY: usize = 4;
const DEFAULT_VISITOR_MAX_ROWS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be at most {max}, got '{value}'")]
    TooLarge {
        name: &'static str,
        value: String,
        max: u32,
    },

    #[error("{name} must be true or false, got '{value}'")]
    InvalidBool { name: &'static str, value: String },

    #[error("{name}: unknown filter '{value}'")]
    UnknownFilter { name: &'static str, value: String },

    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl { name: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessTier {
    Visitor,
    Personal,
}

#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// What the visitor key may not do. Kept as data because the archive does
/// not publish the exact boundary between tiers.
#[derive(Clone, Debug)]
pub struct AccessPolicy {
    pub visitor_max_rows: u32,
    pub elevated_filters: BTreeSet<Filter>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            visitor_max_rows: DEFAULT_VISITOR_MAX_ROWS,
            elevated_filters: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MediaSettings {
    pub concurrency: usize,
    pub inline_thumbnails: bool,
    /// Permit thumbnail fetches to loopback/private hosts (local mirrors, tests).
    pub allow_private_hosts: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_MEDIA_CONCURRENCY,
            inline_thumbnails: false,
            allow_private_hosts: false,
        }
    }
}

/// Read-only configuration shared by every request.
#[derive(Clone, Debug)]
pub struct Settings {
    pub api_key: ApiKey,
    pub tier: AccessTier,
    pub search_url: String,
    pub iiif_url: String,
    pub page_size: u32,
    pub max_fallback_attempts: usize,
    pub access: AccessPolicy,
    pub retry: RetryPolicy,
    pub media: MediaSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: ApiKey::new(VISITOR_KEY),
            tier: AccessTier::Visitor,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            iiif_url: DEFAULT_IIIF_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_fallback_attempts: DEFAULT_MAX_FALLBACK,
            access: AccessPolicy::default(),
            retry: RetryPolicy::default(),
            media: MediaSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Settings::default();

        match var("NLI_API_KEY") {
            Some(key) => {
                debug!("personal NLI API key configured");
                settings.api_key = ApiKey::new(key);
                settings.tier = AccessTier::Personal;
            }
            None => {
                warn!("NLI_API_KEY not set; using the shared visitor key with limited access");
            }
        }

        if let Some(url) = var("NLI_SEARCH_URL") {
            settings.search_url = parse_url("NLI_SEARCH_URL", &url)?;
        }
        if let Some(url) = var("NLI_IIIF_URL") {
            settings.iiif_url = parse_url("NLI_IIIF_URL", &url)?;
        }
        if let Some(v) = var("NLI_PAGE_SIZE") {
            settings.page_size = parse_positive_u32("NLI_PAGE_SIZE", &v)?.min(MAX_PAGE_SIZE);
        }
        if let Some(v) = var("NLI_MAX_FALLBACK") {
            settings.max_fallback_attempts = parse_positive("NLI_MAX_FALLBACK", &v)?;
        }
        if let Some(v) = var("NLI_MEDIA_CONCURRENCY") {
            settings.media.concurrency = parse_positive("NLI_MEDIA_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("NLI_INLINE_THUMBNAILS") {
            settings.media.inline_thumbnails = parse_bool("NLI_INLINE_THUMBNAILS", &v)?;
        }
        if let Some(v) = var("NLI_VISITOR_MAX_ROWS") {
            settings.access.visitor_max_rows = parse_positive_u32("NLI_VISITOR_MAX_ROWS", &v)?;
        }
        if let Some(v) = var("NLI_ELEVATED_FILTERS") {
            settings.access.elevated_filters = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Filter::from_param_name(s).ok_or_else(|| ConfigError::UnknownFilter {
                        name: "NLI_ELEVATED_FILTERS",
                        value: s.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        Ok(settings)
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_positive_u32(name: &'static str, value: &str) -> Result<u32, ConfigError> {
    let n = parse_positive(name, value)?;
    u32::try_from(n).map_err(|_| ConfigError::TooLarge {
        name,
        value: value.to_string(),
        max: u32::MAX,
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    match url::Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {
            Ok(value.trim_end_matches('/').to_string())
        }
        _ => Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        }),
    }
}
