use crate::error::ConfigFetchError;
use crate::path_resolver::{AssetCategory, PathResolver};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

pub const DEFAULT_IDLE_TIMEOUT_MINUTES: u32 = 10;

/// One selectable button and the clip it plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: i64,
    pub title: String,
    pub file: String,
    pub play_count: u32,
}

/// Normalized view of the kiosk configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskConfig {
    pub idle_timeout_minutes: u32,
    pub background: Option<String>,
    pub actions: Vec<Action>,
    pub pin: Option<String>,
}

impl KioskConfig {
    pub fn action(&self, id: i64) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// The PIN if one is configured; an empty string counts as none.
    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref().filter(|pin| !pin.is_empty())
    }

    /// Parses a configuration document, applying the defaulting rules.
    pub fn from_value(raw: &Value, default_idle_timeout: u32) -> Result<Self, ConfigFetchError> {
        let doc: RawDocument = serde_json::from_value(raw.clone())?;

        let idle_timeout_minutes = match doc.inactivity_timeout_in_minutes.as_ref().and_then(positive_integer) {
            Some(minutes) => minutes,
            None => {
                if doc.inactivity_timeout_in_minutes.is_some() {
                    warn!(
                        "Invalid inactivity_timeout_in_minutes {:?}, using {}",
                        doc.inactivity_timeout_in_minutes, default_idle_timeout
                    );
                }
                default_idle_timeout
            }
        };

        let mut seen = HashSet::new();
        let mut actions = Vec::with_capacity(doc.animations.len());
        for raw_action in doc.animations {
            if !seen.insert(raw_action.id) {
                return Err(ConfigFetchError::DuplicateActionId(raw_action.id));
            }
            let play_count = match raw_action.play_count.as_ref().and_then(positive_integer) {
                Some(count) => count,
                None => {
                    warn!(
                        "Action {} has playCount {:?}, clamping to 1",
                        raw_action.id, raw_action.play_count
                    );
                    1
                }
            };
            actions.push(Action {
                id: raw_action.id,
                title: raw_action.title,
                file: raw_action.file,
                play_count,
            });
        }

        Ok(Self {
            idle_timeout_minutes,
            background: doc.background.map(|b| b.file).filter(|f| !f.is_empty()),
            actions,
            pin: doc.security.and_then(|s| s.pin),
        })
    }
}

/// Floors numeric values and keeps them only when at least 1.
fn positive_integer(value: &Value) -> Option<u32> {
    let number = value.as_f64()?.floor();
    if number >= 1.0 && number <= f64::from(u32::MAX) {
        Some(number as u32)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    inactivity_timeout_in_minutes: Option<Value>,
    #[serde(default)]
    background: Option<RawBackground>,
    #[serde(default)]
    security: Option<RawSecurity>,
    animations: Vec<RawAnimation>,
}

#[derive(Debug, Deserialize)]
struct RawBackground {
    file: String,
}

#[derive(Debug, Deserialize)]
struct RawSecurity {
    #[serde(default)]
    pin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnimation {
    id: i64,
    title: String,
    file: String,
    #[serde(rename = "playCount", default)]
    play_count: Option<Value>,
}

/// An immutable configuration as of one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub config: KioskConfig,
    /// The document as fetched, used for the structural change check.
    pub raw: Value,
    pub background_url: Option<String>,
    pub background_path: Option<PathBuf>,
}

/// Where configuration documents come from.
pub trait ConfigSource: Send {
    fn fetch(&self) -> Result<String, ConfigFetchError>;
    fn describe(&self) -> String;
}

/// Reads `config.json` from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn fetch(&self) -> Result<String, ConfigFetchError> {
        fs::read_to_string(&self.path).map_err(|source| ConfigFetchError::Unreadable {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigPoll {
    Changed(Arc<ConfigSnapshot>),
    Unchanged,
}

/// Polls the configuration source and republishes it when it changes.
pub struct ConfigSync {
    source: Box<dyn ConfigSource>,
    resolver: PathResolver,
    assets_root: PathBuf,
    default_idle_timeout: u32,
    interval_secs: f64,
    next_poll: Option<f64>,
    stopped: bool,
    last: Option<Arc<ConfigSnapshot>>,
    publisher: watch::Sender<Option<Arc<ConfigSnapshot>>>,
}

impl ConfigSync {
    pub fn new(
        source: Box<dyn ConfigSource>,
        resolver: PathResolver,
        assets_root: impl Into<PathBuf>,
        interval_secs: f64,
        default_idle_timeout: u32,
    ) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            source,
            resolver,
            assets_root: assets_root.into(),
            default_idle_timeout,
            interval_secs,
            next_poll: None,
            stopped: false,
            last: None,
            publisher,
        }
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    /// Last good snapshot, if any fetch has succeeded.
    pub fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.last.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ConfigSnapshot>>> {
        self.publisher.subscribe()
    }

    /// Fetches once. A failure leaves the last good snapshot in place.
    pub fn poll(&mut self) -> Result<ConfigPoll, ConfigFetchError> {
        let text = self.source.fetch()?;
        let raw: Value = serde_json::from_str(&text)?;

        if let Some(last) = &self.last {
            if last.raw == raw {
                debug!("Configuration unchanged");
                return Ok(ConfigPoll::Unchanged);
            }
        }

        let config = KioskConfig::from_value(&raw, self.default_idle_timeout)?;
        let (background_url, background_path) = match &config.background {
            Some(file) => {
                let root = self.assets_root.to_string_lossy();
                let url = match self.resolver.resolve(&root, AssetCategory::Backgrounds, file) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!("Background unavailable: {}", e);
                        None
                    }
                };
                let path = PathResolver::asset_path(&self.assets_root, AssetCategory::Backgrounds, file);
                (url, Some(path))
            }
            None => (None, None),
        };

        let snapshot = Arc::new(ConfigSnapshot {
            config,
            raw,
            background_url,
            background_path,
        });
        info!(
            "Configuration loaded from {}: {} actions, idle timeout {} min",
            self.source.describe(),
            snapshot.config.actions.len(),
            snapshot.config.idle_timeout_minutes
        );
        self.last = Some(snapshot.clone());
        self.publisher.send_replace(Some(snapshot.clone()));
        Ok(ConfigPoll::Changed(snapshot))
    }

    /// Polls when due: immediately on the first call, then every interval.
    pub fn tick(&mut self, now: f64) -> Option<Result<ConfigPoll, ConfigFetchError>> {
        if self.stopped {
            return None;
        }
        if matches!(self.next_poll, Some(due) if now < due) {
            return None;
        }
        self.next_poll = Some(now + self.interval_secs);
        let result = self.poll();
        if let Err(e) = &result {
            warn!("Configuration refresh failed, keeping last good: {}", e);
        }
        Some(result)
    }

    /// Cancels the polling schedule.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.next_poll = None;
    }
}
