//! Configuration for the evote client.
//!
//! ```toml
//! [api]
//! base_url = "https://vote.example.com/api"
//! timeout_seconds = 30
//! max_retries = 2
//!
//! [platform]
//! profile = "full"   # or "degraded"
//!
//! [storage]
//! credentials_path = "~/.evote/credentials.json"
//! ```
//!
//! String values support `${ENV_VAR}` expansion. `EVOTE_API_URL` and
//! `EVOTE_PLATFORM` override the file.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use evote_utils::{FileVisibility, atomic_write, ensure_private_dir};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Retries beyond this only delay the error the user will see anyway.
const MAX_RETRIES_CAP: u32 = 5;

pub const API_URL_ENV: &str = "EVOTE_API_URL";
pub const PLATFORM_ENV: &str = "EVOTE_PLATFORM";

#[derive(Debug, Default, Deserialize)]
pub struct EvoteConfig {
    pub api: Option<ApiConfig>,
    pub platform: Option<PlatformConfig>,
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write config at {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("could not determine home directory")]
    NoHome,
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Write { path, .. } => Some(path),
            ConfigError::NoHome => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// How much of secure voting mode the host platform can provide.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlatformProfile {
    /// Orientation lock, lifecycle monitoring and back interception.
    #[default]
    Full,
    /// No lifecycle hooks (e.g. web). Voting works without the restrictions.
    Degraded,
}

impl PlatformProfile {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" | "native" => Some(Self::Full),
            "degraded" | "web" => Some(Self::Degraded),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub profile: PlatformProfile,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    pub credentials_path: Option<String>,
}

/// Effective settings after defaults, env expansion and env overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub platform: PlatformProfile,
    pub credentials_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            platform: PlatformProfile::Full,
            credentials_path: default_credentials_path(),
        }
    }
}

/// Expand `${VAR}` references using `lookup`. Unknown vars become empty;
/// an unclosed `${` is kept verbatim.
fn expand_with(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, &|name| env::var(name).ok())
}

/// Expand a leading `~/` to the home directory.
fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

impl EvoteConfig {
    /// Load `~/.evote/config.toml`. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings_with(&|name| env::var(name).ok())
    }

    /// Resolve settings against an explicit environment (tests inject one).
    #[must_use]
    pub fn settings_with(&self, lookup: &dyn Fn(&str) -> Option<String>) -> Settings {
        let mut settings = Settings::default();

        if let Some(api) = &self.api {
            if let Some(url) = api.base_url.as_deref() {
                let url = expand_with(url, lookup);
                if !url.trim().is_empty() {
                    settings.api_base_url = url.trim().to_string();
                }
            }
            if let Some(secs) = api.timeout_seconds.filter(|secs| *secs > 0) {
                settings.request_timeout = Duration::from_secs(secs);
            }
            if let Some(retries) = api.max_retries {
                settings.max_retries = retries.min(MAX_RETRIES_CAP);
            }
        }

        if let Some(platform) = &self.platform {
            settings.platform = platform.profile;
        }

        if let Some(raw) = self
            .storage
            .as_ref()
            .and_then(|storage| storage.credentials_path.as_deref())
        {
            let expanded = expand_with(raw, lookup);
            if !expanded.trim().is_empty() {
                settings.credentials_path = Some(expand_home(expanded.trim()));
            }
        }

        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            settings.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(PLATFORM_ENV) {
            match PlatformProfile::parse(&raw) {
                Some(profile) => settings.platform = profile,
                None => tracing::warn!("Unknown {PLATFORM_ENV} value: {raw}"),
            }
        }

        settings.api_base_url = settings.api_base_url.trim_end_matches('/').to_string();
        settings
    }

    /// Persist the API base URL, preserving comments and formatting.
    pub fn persist_api_url(url: &str) -> Result<(), ConfigError> {
        let path = config_path().ok_or(ConfigError::NoHome)?;
        persist_api_url_at(&path, url)
    }
}

pub fn persist_api_url_at(path: &Path, url: &str) -> Result<(), ConfigError> {
    let write_err = |source: io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        ensure_private_dir(parent).map_err(write_err)?;
    }

    let content = if path.exists() {
        fs::read_to_string(path).map_err(write_err)?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    if !doc.contains_key("api") {
        doc["api"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc["api"]["base_url"] = toml_edit::value(url);

    atomic_write(path, doc.to_string().as_bytes(), FileVisibility::OwnerOnly).map_err(write_err)
}

/// `~/.evote`
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".evote"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("config.toml"))
}

#[must_use]
pub fn default_credentials_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("credentials.json"))
}
