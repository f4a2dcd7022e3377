use std::{
    fs,
    path::Path,
    time::Duration,
};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::{backoff::BackoffPolicy, error::ConfigError};

pub const DEFAULT_CONFIG_FILE: &str = "studio.toml";
/// Address the reverse proxy serves both the UI and the API from.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8000";
pub const EVENTS_PATH: &str = "/api/events";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base address. Unset or blank means same-origin requests
    /// against `origin`.
    pub api_url: Option<String>,
    pub origin: String,
    pub reconnect_floor_ms: u64,
    pub reconnect_ceiling_ms: u64,
    pub heartbeat_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub job_list_limit: u32,
    pub library_page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            origin: DEFAULT_ORIGIN.into(),
            reconnect_floor_ms: 1_000,
            reconnect_ceiling_ms: 30_000,
            heartbeat_timeout_secs: 75,
            request_timeout_secs: 30,
            job_list_limit: 50,
            library_page_size: 20,
        }
    }
}

impl ClientConfig {
    pub fn base_address(&self) -> Result<BaseAddress, ConfigError> {
        let raw = self
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.origin.trim());
        BaseAddress::parse(raw)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        let floor = Duration::from_millis(self.reconnect_floor_ms.max(1));
        let ceiling = Duration::from_millis(self.reconnect_ceiling_ms).max(floor);
        BackoffPolicy::new(floor, ceiling)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Loads configuration from `path` (or `studio.toml` when present), then
/// applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                ClientConfig::default()
            }
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ClientConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn apply_env_overrides(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("HEARTMULA_API_URL") {
        config.api_url = Some(v);
    }
    if let Some(v) = lookup("APP__API_URL") {
        config.api_url = Some(v);
    }
    if let Some(v) = lookup("APP__ORIGIN") {
        config.origin = v;
    }

    override_number(&lookup, "APP__RECONNECT_FLOOR_MS", &mut config.reconnect_floor_ms);
    override_number(
        &lookup,
        "APP__RECONNECT_CEILING_MS",
        &mut config.reconnect_ceiling_ms,
    );
    override_number(
        &lookup,
        "APP__HEARTBEAT_TIMEOUT_SECS",
        &mut config.heartbeat_timeout_secs,
    );
    override_number(
        &lookup,
        "APP__REQUEST_TIMEOUT_SECS",
        &mut config.request_timeout_secs,
    );
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key, value = %raw, "ignoring non-numeric config override"),
    }
}

/// Validated backend root, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseAddress {
    root: String,
}

impl BaseAddress {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|err| ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ConfigError::InvalidBaseUrl {
                url: raw.to_string(),
                reason: "query strings and fragments are not allowed".into(),
            });
        }
        Ok(Self {
            root: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.root
    }

    /// Resolves a server-relative path. Absolute URLs pass through.
    pub fn join(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.root)
        } else {
            format!("{}/{path}", self.root)
        }
    }

    pub fn events_url(&self) -> String {
        self.join(EVENTS_PATH)
    }
}
