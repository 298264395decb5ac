//! Application configuration structures.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the read API binds to
    #[serde(default = "defaults::listen_addr")]
    pub listen_addr: String,

    /// Steam Web API key
    #[serde(default)]
    pub steam_api_key: String,

    /// Database connection string
    #[serde(default = "defaults::dsn")]
    pub dsn: String,

    #[serde(default)]
    pub run_mode: RunMode,

    /// Log filter passed to the logger (`error` .. `trace`)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_file_enabled: bool,

    #[serde(default = "defaults::log_file_path")]
    pub log_file_path: String,

    #[serde(default)]
    pub sourcebans_scraper_enabled: bool,

    #[serde(default)]
    pub rgl_scraper_enabled: bool,

    #[serde(default)]
    pub etf2l_scraper_enabled: bool,

    #[serde(default)]
    pub logstf_scraper_enabled: bool,

    /// Route scraper traffic through the SOCKS5 tunnels below
    #[serde(default)]
    pub proxies_enabled: bool,

    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,

    /// SSH key used to authenticate every tunnel
    #[serde(default)]
    pub private_key_path: String,

    /// Cache scraped pages on disk
    #[serde(default)]
    pub enable_cache: bool,

    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: String,

    /// Floor between two page fetches of one site crawl
    #[serde(default = "defaults::scrape_delay_ms")]
    pub scrape_delay_ms: u64,

    /// Hard deadline for a single HTTP fetch
    #[serde(default = "defaults::http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Age after which cached pages are refetched
    #[serde(default = "defaults::cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "defaults::database_max_connections")]
    pub database_max_connections: u32,

    /// Deadline for downloading one BD list document
    #[serde(default = "defaults::bd_list_timeout_secs")]
    pub bd_list_timeout_secs: u64,
}

/// Deployment flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Release,
    Debug,
    Test,
}

/// One SOCKS5 tunnel established over SSH dynamic forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// SSH login on the remote host
    pub username: String,

    /// `host:port` of the SSH server
    pub remote_addr: String,

    /// Local `host:port` the SOCKS5 listener binds to
    pub local_addr: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env();
            config
        })
    }

    /// Environment variables win over the file.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("BDAPI_STEAM_API_KEY") {
            if !key.trim().is_empty() {
                self.steam_api_key = key;
            }
        }
        if let Ok(dsn) = std::env::var("DATABASE_URL") {
            if !dsn.trim().is_empty() {
                self.dsn = dsn;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(AppError::validation("dsn is empty"));
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(AppError::validation(format!(
                "listen_addr '{}' is not a socket address",
                self.listen_addr
            )));
        }
        if self.steam_api_key.trim().is_empty() {
            return Err(AppError::validation("steam_api_key is required"));
        }
        if self.proxies_enabled {
            if self.proxies.is_empty() {
                return Err(AppError::validation(
                    "proxies_enabled is set but no proxies are configured",
                ));
            }
            if self.private_key_path.trim().is_empty() {
                return Err(AppError::validation(
                    "private_key_path is required when proxies are enabled",
                ));
            }
            for proxy in &self.proxies {
                if proxy.local_addr.parse::<SocketAddr>().is_err() {
                    return Err(AppError::validation(format!(
                        "proxy local_addr '{}' is not a socket address",
                        proxy.local_addr
                    )));
                }
            }
        }
        if self.enable_cache && self.cache_dir.trim().is_empty() {
            return Err(AppError::validation("cache_dir is empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(AppError::validation("http_timeout_secs must be > 0"));
        }
        if self.database_max_connections == 0 {
            return Err(AppError::validation("database_max_connections must be > 0"));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 3600)
    }

    pub fn bd_list_timeout(&self) -> Duration {
        Duration::from_secs(self.bd_list_timeout_secs)
    }

    pub fn scrape_delay(&self) -> Duration {
        Duration::from_millis(self.scrape_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: defaults::listen_addr(),
            steam_api_key: String::new(),
            dsn: defaults::dsn(),
            run_mode: RunMode::default(),
            log_level: defaults::log_level(),
            log_file_enabled: false,
            log_file_path: defaults::log_file_path(),
            sourcebans_scraper_enabled: false,
            rgl_scraper_enabled: false,
            etf2l_scraper_enabled: false,
            logstf_scraper_enabled: false,
            proxies_enabled: false,
            proxies: Vec::new(),
            private_key_path: String::new(),
            enable_cache: false,
            cache_dir: defaults::cache_dir(),
            scrape_delay_ms: defaults::scrape_delay_ms(),
            http_timeout_secs: defaults::http_timeout_secs(),
            cache_ttl_hours: defaults::cache_ttl_hours(),
            database_max_connections: defaults::database_max_connections(),
            bd_list_timeout_secs: defaults::bd_list_timeout_secs(),
        }
    }
}

mod defaults {
    pub fn listen_addr() -> String {
        "127.0.0.1:8888".into()
    }
    pub fn dsn() -> String {
        "sqlite://bdapi.sqlite?mode=rwc".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn log_file_path() -> String {
        "bdapi.log".into()
    }
    pub fn cache_dir() -> String {
        ".cache".into()
    }
    pub fn scrape_delay_ms() -> u64 {
        1000
    }
    pub fn http_timeout_secs() -> u64 {
        10
    }
    pub fn cache_ttl_hours() -> u64 {
        24 * 7
    }
    pub fn database_max_connections() -> u32 {
        5
    }
    pub fn bd_list_timeout_secs() -> u64 {
        10
    }
}
