// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted user configuration.
//!
//! Settings live in `<config dir>/feedcast/settings.toml` as a flat table of
//! scalars. Missing keys fall back to their defaults. Every save rewrites the
//! file and notifies subscribers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use crate::error::SettingsError;
use crate::http::ProxyConfig;

pub const DEFAULT_API_BASE_URL: &str = "https://api.feedcast.app";
pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AI_LANGUAGE: &str = "English";
pub const DEFAULT_PROXY_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThemeMode::System => "system",
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        };
        f.write_str(name)
    }
}

impl FromStr for ThemeMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(ThemeMode::System),
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            _ => Err(SettingsError::InvalidValue {
                key: "theme_mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Every persisted configuration scalar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub backend_url: String,

    pub proxy_enabled: bool,
    pub proxy_host: String,
    pub proxy_port: u16,
    pub proxy_username: String,
    pub proxy_password: String,

    pub theme_mode: ThemeMode,

    pub ai_summarize: bool,
    pub ai_base_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    pub ai_language: String,

    pub feed_window_hours: u32,
    pub feed_query: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            backend_url: String::new(),
            proxy_enabled: false,
            proxy_host: String::new(),
            proxy_port: DEFAULT_PROXY_PORT,
            proxy_username: String::new(),
            proxy_password: String::new(),
            theme_mode: ThemeMode::System,
            ai_summarize: false,
            ai_base_url: DEFAULT_AI_BASE_URL.to_string(),
            ai_api_key: String::new(),
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_language: DEFAULT_AI_LANGUAGE.to_string(),
            feed_window_hours: 24,
            feed_query: String::new(),
        }
    }
}

/// Keys accepted by [`SettingsStore::get`] and [`SettingsStore::set`]
pub const KEYS: &[&str] = &[
    "api_base_url",
    "backend_url",
    "proxy_enabled",
    "proxy_host",
    "proxy_port",
    "proxy_username",
    "proxy_password",
    "theme_mode",
    "ai_summarize",
    "ai_base_url",
    "ai_api_key",
    "ai_model",
    "ai_language",
    "feed_window_hours",
    "feed_query",
];

impl Settings {
    /// Proxy the HTTP client should use, if one is enabled and complete
    pub fn proxy(&self) -> Option<ProxyConfig> {
        if !self.proxy_enabled || self.proxy_host.trim().is_empty() || self.proxy_port == 0 {
            return None;
        }

        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
        Some(ProxyConfig {
            host: self.proxy_host.trim().to_string(),
            port: self.proxy_port,
            username: non_empty(&self.proxy_username),
            password: non_empty(&self.proxy_password),
        })
    }

    /// Render one setting as a string
    pub fn get(&self, key: &str) -> Result<String, SettingsError> {
        let value = match key {
            "api_base_url" => self.api_base_url.clone(),
            "backend_url" => self.backend_url.clone(),
            "proxy_enabled" => self.proxy_enabled.to_string(),
            "proxy_host" => self.proxy_host.clone(),
            "proxy_port" => self.proxy_port.to_string(),
            "proxy_username" => self.proxy_username.clone(),
            "proxy_password" => self.proxy_password.clone(),
            "theme_mode" => self.theme_mode.to_string(),
            "ai_summarize" => self.ai_summarize.to_string(),
            "ai_base_url" => self.ai_base_url.clone(),
            "ai_api_key" => self.ai_api_key.clone(),
            "ai_model" => self.ai_model.clone(),
            "ai_language" => self.ai_language.clone(),
            "feed_window_hours" => self.feed_window_hours.to_string(),
            "feed_query" => self.feed_query.clone(),
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Parse and assign one setting from a string
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "api_base_url" => self.api_base_url = validate_url("api_base_url", value)?,
            "backend_url" => self.backend_url = validate_url("backend_url", value)?,
            "proxy_enabled" => self.proxy_enabled = parse_value(key, value)?,
            "proxy_host" => self.proxy_host = value.trim().to_string(),
            "proxy_port" => self.proxy_port = parse_value(key, value)?,
            "proxy_username" => self.proxy_username = value.to_string(),
            "proxy_password" => self.proxy_password = value.to_string(),
            "theme_mode" => self.theme_mode = value.parse()?,
            "ai_summarize" => self.ai_summarize = parse_value(key, value)?,
            "ai_base_url" => self.ai_base_url = validate_url("ai_base_url", value)?,
            "ai_api_key" => self.ai_api_key = value.to_string(),
            "ai_model" => self.ai_model = value.trim().to_string(),
            "ai_language" => self.ai_language = value.trim().to_string(),
            "feed_window_hours" => self.feed_window_hours = parse_value(key, value)?,
            "feed_query" => self.feed_query = value.to_string(),
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Cross-field checks applied before persisting
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.proxy_enabled && self.proxy_port == 0 {
            return Err(SettingsError::InvalidValue {
                key: "proxy_port".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    fn reset_proxy(&mut self) {
        let defaults = Settings::default();
        self.proxy_enabled = defaults.proxy_enabled;
        self.proxy_host = defaults.proxy_host;
        self.proxy_port = defaults.proxy_port;
        self.proxy_username = defaults.proxy_username;
        self.proxy_password = defaults.proxy_password;
    }

    fn reset_ai(&mut self) {
        let defaults = Settings::default();
        self.ai_summarize = defaults.ai_summarize;
        self.ai_base_url = defaults.ai_base_url;
        self.ai_api_key = defaults.ai_api_key;
        self.ai_model = defaults.ai_model;
        self.ai_language = defaults.ai_language;
    }
}

/// Accept an empty value or an absolute http(s) URL
pub fn validate_url(key: &'static str, value: &str) -> Result<String, SettingsError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }

    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            Ok(value.to_string())
        }
        _ => Err(SettingsError::InvalidUrl {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Group of settings restored by [`SettingsStore::reset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    Proxy,
    Ai,
    All,
}

/// File-backed settings with change notification
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Open the store at the default path
    pub fn open_default() -> Result<Self, SettingsError> {
        Self::open(Self::default_path()?)
    }

    /// `<config dir>/feedcast/settings.toml`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(config_dir.join("feedcast").join("settings.toml"))
    }

    /// Open the store at `path`, starting from defaults if the file is absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = load_settings(&path)?;
        let (tx, _) = watch::channel(settings);
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current settings
    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every saved change
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn get(&self, key: &str) -> Result<String, SettingsError> {
        self.tx.borrow().get(key)
    }

    /// Parse, validate, persist, and publish one string-valued setting
    pub fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.update(|s| s.set(key, value))
    }

    pub fn reset(&self, scope: ResetScope) -> Result<(), SettingsError> {
        self.update(|s| {
            match scope {
                ResetScope::Proxy => s.reset_proxy(),
                ResetScope::Ai => s.reset_ai(),
                ResetScope::All => *s = Settings::default(),
            }
            Ok(())
        })
    }

    pub fn api_base_url(&self) -> String {
        self.tx.borrow().api_base_url.clone()
    }

    pub fn save_api_base_url(&self, url: &str) -> Result<(), SettingsError> {
        let url = validate_url("api_base_url", url)?;
        self.update(|s| {
            s.api_base_url = url;
            Ok(())
        })
    }

    pub fn backend_url(&self) -> String {
        self.tx.borrow().backend_url.clone()
    }

    pub fn save_backend_url(&self, url: &str) -> Result<(), SettingsError> {
        let url = validate_url("backend_url", url)?;
        self.update(|s| {
            s.backend_url = url;
            Ok(())
        })
    }

    pub fn proxy(&self) -> Option<ProxyConfig> {
        self.tx.borrow().proxy()
    }

    /// Save all proxy fields at once
    pub fn save_proxy(
        &self,
        enabled: bool,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<(), SettingsError> {
        self.update(|s| {
            s.proxy_enabled = enabled;
            s.proxy_host = host.trim().to_string();
            s.proxy_port = port;
            s.proxy_username = username.to_string();
            s.proxy_password = password.to_string();
            Ok(())
        })
    }

    pub fn theme_mode(&self) -> ThemeMode {
        self.tx.borrow().theme_mode
    }

    pub fn save_theme_mode(&self, mode: ThemeMode) -> Result<(), SettingsError> {
        self.update(|s| {
            s.theme_mode = mode;
            Ok(())
        })
    }

    pub fn ai_summarize(&self) -> bool {
        self.tx.borrow().ai_summarize
    }

    pub fn save_ai_summarize(&self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|s| {
            s.ai_summarize = enabled;
            Ok(())
        })
    }

    pub fn ai_base_url(&self) -> String {
        self.tx.borrow().ai_base_url.clone()
    }

    pub fn save_ai_base_url(&self, url: &str) -> Result<(), SettingsError> {
        let url = validate_url("ai_base_url", url)?;
        self.update(|s| {
            s.ai_base_url = url;
            Ok(())
        })
    }

    pub fn ai_api_key(&self) -> String {
        self.tx.borrow().ai_api_key.clone()
    }

    pub fn save_ai_api_key(&self, key: &str) -> Result<(), SettingsError> {
        self.update(|s| {
            s.ai_api_key = key.to_string();
            Ok(())
        })
    }

    pub fn ai_model(&self) -> String {
        self.tx.borrow().ai_model.clone()
    }

    pub fn save_ai_model(&self, model: &str) -> Result<(), SettingsError> {
        self.set("ai_model", model)
    }

    pub fn ai_language(&self) -> String {
        self.tx.borrow().ai_language.clone()
    }

    pub fn save_ai_language(&self, language: &str) -> Result<(), SettingsError> {
        self.set("ai_language", language)
    }

    pub fn feed_query(&self) -> String {
        self.tx.borrow().feed_query.clone()
    }

    pub fn save_feed_query(&self, query: &str) -> Result<(), SettingsError> {
        self.update(|s| {
            s.feed_query = query.to_string();
            Ok(())
        })
    }

    pub fn feed_window_hours(&self) -> u32 {
        self.tx.borrow().feed_window_hours
    }

    pub fn save_feed_window_hours(&self, hours: u32) -> Result<(), SettingsError> {
        self.update(|s| {
            s.feed_window_hours = hours;
            Ok(())
        })
    }

    /// Apply `change` to a copy, then validate, persist, and publish it
    fn update<F>(&self, change: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings) -> Result<(), SettingsError>,
    {
        let mut next = self.current();
        change(&mut next)?;
        next.validate()?;

        if next == *self.tx.borrow() {
            return Ok(());
        }

        write_settings(&self.path, &next)?;
        tracing::debug!(path = %self.path.display(), "Saved settings");
        self.tx.send_replace(next);
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| SettingsError::ParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write to a sibling temp file, then rename over the target
fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let write_failed = |e| SettingsError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failed)?;
    }

    let content = toml::to_string_pretty(settings)?;
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content).map_err(write_failed)?;
    std::fs::rename(&temp_path, path).map_err(write_failed)
}
