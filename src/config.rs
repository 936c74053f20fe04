//! Access list configuration.
//!
//! Blacklist sources plus the static black and white lists, read from a JSON
//! file such as:
//!
//! ```json
//! {
//!   "sources": [
//!     { "url": "https://example.org/hosts.txt", "hash_url": "https://example.org/hosts.md5" },
//!     { "url": "/etc/nullroute/extra.txt", "format": "pattern" }
//!   ],
//!   "blacklist": ["ads.example.com"],
//!   "whitelist": ["cdn.example.com"]
//! }
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

const DEFAULT_SOURCE_URL: &str = "https://raw.githubusercontent.com/codescot/blackhole/master/default.txt";
const DEFAULT_SOURCE_HASH_URL: &str =
    "https://raw.githubusercontent.com/codescot/blackhole/master/default.md5";

/// How domains are pulled out of a list body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    /// One domain per line; hosts-file lines contribute every name after the address.
    #[default]
    Lines,
    /// Scan free-form text for anything shaped like a domain name.
    Pattern,
}

/// A remote or local blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    pub url: String,
    /// URL of the list's md5 digest, used to skip unchanged downloads.
    #[serde(default, alias = "md5")]
    pub hash_url: Option<String>,
    #[serde(default)]
    pub format: ListFormat,
}

impl Source {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            hash_url: None,
            format: ListFormat::default(),
        }
    }
}

/// Everything the blacklist loader needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessLists {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl AccessLists {
    /// Read access lists from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Lists used when no file is configured.
    pub fn builtin() -> Self {
        Self {
            sources: vec![Source {
                url: DEFAULT_SOURCE_URL.to_string(),
                hash_url: Some(DEFAULT_SOURCE_HASH_URL.to_string()),
                format: ListFormat::Lines,
            }],
            ..Self::default()
        }
    }
}
