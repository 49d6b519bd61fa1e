use crate::config::DEFAULT_IDLE_TIMEOUT_MINUTES;
use crate::playback::PlaybackTiming;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "kiosk.toml";

/// Operator settings read once at startup, next to the executable.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub ui: UiSettings,
    pub assets: AssetSettings,
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub file: String,
    pub max_lines: usize,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: "anglewing_kiosk.log".to_string(),
            max_lines: 10000,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UiSettings {
    pub kiosk_mode: bool,
    pub window_width: f32,
    pub window_height: f32,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            kiosk_mode: true,
            window_width: 1920.0,
            window_height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetSettings {
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingSettings {
    pub config_poll_interval_ms: u64,
    pub stall_check_ms: u64,
    pub recovery_debounce_ms: u64,
    pub max_recovery_attempts: u32,
    pub shutdown_grace_ms: u64,
    pub default_idle_timeout_minutes: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            config_poll_interval_ms: 30_000,
            stall_check_ms: 1_000,
            recovery_debounce_ms: 50,
            max_recovery_attempts: 3,
            shutdown_grace_ms: 1_000,
            default_idle_timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
        }
    }
}

impl TimingSettings {
    pub fn playback(&self) -> PlaybackTiming {
        PlaybackTiming {
            stall_check_secs: ms_to_secs(self.stall_check_ms),
            recovery_debounce_secs: ms_to_secs(self.recovery_debounce_ms),
            max_recovery_attempts: self.max_recovery_attempts,
        }
    }

    pub fn config_poll_interval_secs(&self) -> f64 {
        ms_to_secs(self.config_poll_interval_ms)
    }

    pub fn shutdown_grace_secs(&self) -> f64 {
        ms_to_secs(self.shutdown_grace_ms)
    }
}

fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

impl Settings {
    /// Parses a settings file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse settings {}", path.display()))
    }

    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Log file location; relative paths are taken from `base_dir`.
    pub fn log_file_path(&self, base_dir: &Path) -> PathBuf {
        let file = PathBuf::from(&self.logging.file);
        if file.is_absolute() {
            file
        } else {
            base_dir.join(file)
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

/// Directory holding the running executable; settings and the log live here.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("Executable has no parent directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.timing.config_poll_interval_ms, 30_000);
        assert_eq!(settings.timing.max_recovery_attempts, 3);
        assert_eq!(settings.timing.default_idle_timeout_minutes, 10);
        assert!(settings.ui.kiosk_mode);
        assert!(settings.assets.root.is_none());
    }

    #[test]
    fn test_playback_timing_conversion() {
        let timing = TimingSettings::default().playback();
        assert_eq!(timing.stall_check_secs, 1.0);
        assert_eq!(timing.recovery_debounce_secs, 0.05);
        assert_eq!(timing.max_recovery_attempts, 3);
        assert_eq!(TimingSettings::default().shutdown_grace_secs(), 1.0);
        assert_eq!(TimingSettings::default().config_poll_interval_secs(), 30.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kiosk.toml");
        fs::write(
            &path,
            "[ui]\nkiosk_mode = false\n\n[timing]\nstall_check_ms = 2500\n\n[assets]\nroot = \"/srv/public\"\n",
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert!(!settings.ui.kiosk_mode);
        assert_eq!(settings.ui.window_width, 1920.0);
        assert_eq!(settings.timing.stall_check_ms, 2500);
        assert_eq!(settings.timing.recovery_debounce_ms, 50);
        assert_eq!(settings.assets.root.as_deref(), Some("/srv/public"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let settings = Settings::default();
        let toml_str = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_load_missing_and_broken() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kiosk.toml");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());

        fs::write(&path, "[timing\nbroken").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn test_log_file_path_and_level() {
        let mut settings = Settings::default();
        let base = Path::new("/opt/anglewing");
        assert_eq!(settings.log_file_path(base), base.join("anglewing_kiosk.log"));
        settings.logging.level = "debug".to_string();
        assert_eq!(settings.log_level(), log::LevelFilter::Debug);
        settings.logging.level = "loud".to_string();
        assert_eq!(settings.log_level(), log::LevelFilter::Info);
    }
}
