//! Global setting of the price tracker.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use url::Url;

use super::error::FeedError;
use super::render::{AxisMode, ChartLabel};
use super::utility::get_file_path;
use super::window::WindowBound;
use crate::feed::ReconnectPolicy;

/// Default settings
fn default_settings() -> HashMap<String, SettingValue> {
    let mut settings = HashMap::new();

    // Price service
    settings.insert("feed.host".to_string(), SettingValue::String("http://localhost:8000".to_string()));
    settings.insert("feed.history_path".to_string(), SettingValue::String("/ticker-price".to_string()));
    settings.insert("feed.tickers_path".to_string(), SettingValue::String("/tickers".to_string()));
    settings.insert("feed.stream_path".to_string(), SettingValue::String("/track-price".to_string()));
    settings.insert("feed.timeout".to_string(), SettingValue::Int(30));
    settings.insert(
        "feed.default_tickers".to_string(),
        SettingValue::String("ticker_01,ticker_02,ticker_03,ticker_04".to_string()),
    );

    // Series window
    settings.insert("window.policy".to_string(), SettingValue::String("unbounded".to_string()));
    settings.insert("window.size".to_string(), SettingValue::Int(10));

    // Stream
    settings.insert("stream.mode".to_string(), SettingValue::String("reconnect".to_string()));
    settings.insert("stream.poll_watermark".to_string(), SettingValue::Bool(true));
    settings.insert("stream.poll_interval".to_string(), SettingValue::Int(1000));
    settings.insert("stream.backoff_initial".to_string(), SettingValue::Int(500));
    settings.insert("stream.backoff_max".to_string(), SettingValue::Int(30_000));
    settings.insert("stream.backoff_multiplier".to_string(), SettingValue::Float(2.0));
    settings.insert("stream.backoff_jitter".to_string(), SettingValue::Float(0.2));

    // Chart
    settings.insert("chart.axis".to_string(), SettingValue::String("time".to_string()));
    settings.insert("chart.label_mode".to_string(), SettingValue::String("fixed".to_string()));
    settings.insert("chart.label".to_string(), SettingValue::String("Ticker price".to_string()));

    // Log settings
    settings.insert("log.active".to_string(), SettingValue::Bool(true));
    settings.insert("log.level".to_string(), SettingValue::Int(20)); // INFO level
    settings.insert("log.console".to_string(), SettingValue::Bool(true));
    settings.insert("log.file".to_string(), SettingValue::Bool(true));

    settings
}

/// Setting value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl SettingValue {
    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Global settings container
pub struct Settings {
    settings: RwLock<HashMap<String, SettingValue>>,
}

impl Settings {
    /// Create new Settings with defaults, overlaid by the setting file if present
    pub fn new() -> Self {
        let settings = Self::with_defaults();
        if let Some(file_settings) = load_settings_from_file(&get_file_path(SETTING_FILENAME)) {
            settings.update(file_settings);
        }
        settings
    }

    /// Create Settings holding only the built-in defaults
    pub fn with_defaults() -> Self {
        Self {
            settings: RwLock::new(default_settings()),
        }
    }

    /// Create Settings from defaults overlaid by the given file
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        let settings = Self::with_defaults();
        let content = fs::read_to_string(path)?;
        let file_settings: HashMap<String, SettingValue> = serde_json::from_str(&content)?;
        settings.update(file_settings);
        Ok(settings)
    }

    /// Get a setting value
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        self.settings.read().ok()?.get(key).cloned()
    }

    /// Get a string setting
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    /// Get an integer setting
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    /// Get a float setting
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_float())
    }

    /// Get a bool setting
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Set a setting value
    pub fn set(&self, key: impl Into<String>, value: SettingValue) {
        if let Ok(mut settings) = self.settings.write() {
            settings.insert(key.into(), value);
        }
    }

    /// Update settings from a map
    pub fn update(&self, new_settings: HashMap<String, SettingValue>) {
        if let Ok(mut settings) = self.settings.write() {
            for (key, value) in new_settings {
                settings.insert(key, value);
            }
        }
    }

    /// Get all settings as HashMap
    pub fn get_all(&self) -> HashMap<String, SettingValue> {
        self.settings.read()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    /// Save settings to the given file
    pub fn save_to(&self, path: &Path) -> Result<(), FeedError> {
        let json = serde_json::to_string_pretty(&self.get_all())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }

    /// Save settings to the tracker directory
    pub fn save(&self) -> Result<(), FeedError> {
        self.save_to(&setting_file_path())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Setting filename
const SETTING_FILENAME: &str = "tracker_setting.json";

/// Path of the setting file inside the tracker directory
pub fn setting_file_path() -> PathBuf {
    get_file_path(SETTING_FILENAME)
}

/// Load settings from JSON file
fn load_settings_from_file(filepath: &Path) -> Option<HashMap<String, SettingValue>> {
    if filepath.exists() {
        let content = fs::read_to_string(filepath).ok()?;
        serde_json::from_str(&content).ok()
    } else {
        None
    }
}

/// Global settings instance
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new);

/// How the controller keeps its stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    #[default]
    /// Close and reopen the connection on every selection, sending the ticker once on open
    Reconnect,
    /// One shared connection; the ticker is resent on selection and on every poll tick
    Poll { with_watermark: bool },
}

/// Validated feed configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSetting {
    pub host: String,
    pub history_path: String,
    pub tickers_path: String,
    pub stream_path: String,
    pub timeout: Duration,
    pub default_tickers: Vec<String>,
    pub window: WindowBound,
    pub stream_mode: StreamMode,
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub axis: AxisMode,
    pub label: ChartLabel,
}

impl Default for FeedSetting {
    fn default() -> Self {
        Self {
            host: "http://localhost:8000".to_string(),
            history_path: "/ticker-price".to_string(),
            tickers_path: "/tickers".to_string(),
            stream_path: "/track-price".to_string(),
            timeout: Duration::from_secs(30),
            default_tickers: Vec::new(),
            window: WindowBound::Unbounded,
            stream_mode: StreamMode::Reconnect,
            poll_interval: Duration::from_secs(1),
            reconnect: ReconnectPolicy::default(),
            axis: AxisMode::Time,
            label: ChartLabel::default(),
        }
    }
}

impl FeedSetting {
    /// Project the key/value settings into a validated feed configuration
    pub fn from_settings(settings: &Settings) -> Result<Self, FeedError> {
        let text = |key: &str| -> Result<String, FeedError> {
            settings
                .get_string(key)
                .ok_or_else(|| FeedError::setting(key, "expected a string"))
        };
        let millis = |key: &str| -> Result<Duration, FeedError> {
            match settings.get_int(key) {
                Some(ms) if ms > 0 => Ok(Duration::from_millis(ms as u64)),
                _ => Err(FeedError::setting(key, "expected a positive integer")),
            }
        };

        let window_size = match settings.get_int("window.size") {
            Some(n) if n > 0 => n as usize,
            _ => return Err(FeedError::setting("window.size", "expected a positive integer")),
        };
        let window = match text("window.policy")?.as_str() {
            "unbounded" => WindowBound::Unbounded,
            "per_point" => WindowBound::PerPoint(window_size),
            "per_batch" => WindowBound::PerBatch(window_size),
            other => {
                return Err(FeedError::setting(
                    "window.policy",
                    format!("`{}` is not one of unbounded, per_point, per_batch", other),
                ))
            }
        };

        let stream_mode = match text("stream.mode")?.as_str() {
            "reconnect" => StreamMode::Reconnect,
            "poll" => StreamMode::Poll {
                with_watermark: settings.get_bool("stream.poll_watermark").unwrap_or(true),
            },
            other => {
                return Err(FeedError::setting(
                    "stream.mode",
                    format!("`{}` is not one of reconnect, poll", other),
                ))
            }
        };

        let axis = match text("chart.axis")?.as_str() {
            "time" => AxisMode::Time,
            "category" => AxisMode::Category,
            other => {
                return Err(FeedError::setting(
                    "chart.axis",
                    format!("`{}` is not one of time, category", other),
                ))
            }
        };

        let label = match text("chart.label_mode")?.as_str() {
            "fixed" => ChartLabel::Fixed(text("chart.label")?),
            "ticker" => ChartLabel::Ticker,
            other => {
                return Err(FeedError::setting(
                    "chart.label_mode",
                    format!("`{}` is not one of fixed, ticker", other),
                ))
            }
        };

        let reconnect = ReconnectPolicy {
            initial_delay: millis("stream.backoff_initial")?,
            max_delay: millis("stream.backoff_max")?,
            multiplier: settings.get_float("stream.backoff_multiplier").unwrap_or(2.0).max(1.0),
            jitter: settings.get_float("stream.backoff_jitter").unwrap_or(0.0).clamp(0.0, 1.0),
        };

        let timeout = match settings.get_int("feed.timeout") {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => return Err(FeedError::setting("feed.timeout", "expected a positive integer")),
        };

        let default_tickers = settings
            .get_string("feed.default_tickers")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let setting = Self {
            host: text("feed.host")?,
            history_path: text("feed.history_path")?,
            tickers_path: text("feed.tickers_path")?,
            stream_path: text("feed.stream_path")?,
            timeout,
            default_tickers,
            window,
            stream_mode,
            poll_interval: millis("stream.poll_interval")?,
            reconnect,
            axis,
            label,
        };
        // Fail early on an unusable host
        setting.stream_url()?;
        Ok(setting)
    }

    fn base_url(&self) -> Result<Url, FeedError> {
        Ok(Url::parse(&self.host)?)
    }

    /// Bulk history endpoint
    pub fn history_url(&self) -> Result<Url, FeedError> {
        Ok(self.base_url()?.join(&self.history_path)?)
    }

    /// Ticker list endpoint
    pub fn tickers_url(&self) -> Result<Url, FeedError> {
        Ok(self.base_url()?.join(&self.tickers_path)?)
    }

    /// Stream endpoint, with the HTTP scheme swapped for its WebSocket counterpart
    pub fn stream_url(&self) -> Result<Url, FeedError> {
        let mut url = self.base_url()?.join(&self.stream_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(FeedError::setting(
                    "feed.host",
                    format!("unsupported scheme `{}`", other),
                ))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| FeedError::setting("feed.host", "cannot derive a WebSocket url"))?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_value_types() {
        let s = SettingValue::String("test".to_string());
        assert_eq!(s.as_str(), Some("test"));

        let i = SettingValue::Int(42);
        assert_eq!(i.as_int(), Some(42));
        assert_eq!(i.as_float(), Some(42.0));

        let b = SettingValue::Bool(true);
        assert_eq!(b.as_bool(), Some(true));
    }

    #[test]
    fn test_default_feed_setting() {
        let setting = FeedSetting::from_settings(&Settings::with_defaults()).unwrap();

        assert_eq!(setting.window, WindowBound::Unbounded);
        assert_eq!(setting.stream_mode, StreamMode::Reconnect);
        assert_eq!(setting.poll_interval, Duration::from_secs(1));
        assert_eq!(setting.axis, AxisMode::Time);
        assert_eq!(setting.label, ChartLabel::Fixed("Ticker price".to_string()));
        assert_eq!(setting.default_tickers.len(), 4);
        assert_eq!(
            setting.history_url().unwrap().as_str(),
            "http://localhost:8000/ticker-price"
        );
        assert_eq!(
            setting.stream_url().unwrap().as_str(),
            "ws://localhost:8000/track-price"
        );
    }

    #[test]
    fn test_policy_variants() {
        let settings = Settings::with_defaults();
        settings.set("window.policy", SettingValue::String("per_point".to_string()));
        settings.set("window.size", SettingValue::Int(15));
        settings.set("stream.mode", SettingValue::String("poll".to_string()));
        settings.set("stream.poll_watermark", SettingValue::Bool(false));
        settings.set("chart.label_mode", SettingValue::String("ticker".to_string()));
        settings.set("feed.host", SettingValue::String("https://prices.example.com".to_string()));

        let setting = FeedSetting::from_settings(&settings).unwrap();
        assert_eq!(setting.window, WindowBound::PerPoint(15));
        assert_eq!(setting.stream_mode, StreamMode::Poll { with_watermark: false });
        assert_eq!(setting.label, ChartLabel::Ticker);
        assert_eq!(setting.stream_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn test_invalid_setting_rejected() {
        let settings = Settings::with_defaults();
        settings.set("window.policy", SettingValue::String("sliding".to_string()));
        let err = FeedSetting::from_settings(&settings).unwrap_err();
        assert!(matches!(err, FeedError::Setting { ref key, .. } if key == "window.policy"));

        let settings = Settings::with_defaults();
        settings.set("feed.host", SettingValue::String("ftp://localhost".to_string()));
        assert!(FeedSetting::from_settings(&settings).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker_setting.json");

        let settings = Settings::with_defaults();
        settings.set("window.policy", SettingValue::String("per_batch".to_string()));
        settings.save_to(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.get_string("window.policy").as_deref(), Some("per_batch"));
        assert_eq!(loaded.get_int("window.size"), Some(10));
    }
}
