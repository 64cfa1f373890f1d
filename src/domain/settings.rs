use crate::domain::models::{BackPressure, RobotIdentity, WriteFailurePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "bitsnap_robot".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Target robot
    #[serde(default)]
    pub robot: RobotIdentity,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    // Dispatcher
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub back_pressure: BackPressure,
    #[serde(default)]
    pub write_failure: WriteFailurePolicy,
    /// No timeout when unset
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
    /// LED color shown once the robot is reset
    #[serde(default)]
    pub startup_led: Option<[u8; 3]>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            robot: RobotIdentity::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            back_pressure: BackPressure::default(),
            write_failure: WriteFailurePolicy::default(),
            write_timeout_ms: None,
            startup_led: None,
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_queue_capacity() -> usize {
    100
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is missing or unreadable
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_else(|e| {
            tracing::debug!(
                "Using default settings ({}: {})",
                settings_path.display(),
                e
            );
            Settings::default()
        });

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BitsnapRobot");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn reset(&mut self) -> anyhow::Result<()> {
        self.settings = Settings::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("bitsnap_robot_test_{}_{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.queue_capacity, 100);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.back_pressure, BackPressure::Block);
        assert_eq!(settings.write_failure, WriteFailurePolicy::Skip);
        assert_eq!(settings.write_timeout(), None);
        assert_eq!(settings.robot.control_label, "Bitsnap Control");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"queue_capacity": 5, "back_pressure": "fail_fast"}"#)
                .unwrap();
        assert_eq!(settings.queue_capacity, 5);
        assert_eq!(settings.back_pressure, BackPressure::FailFast);
        assert_eq!(settings.connect_timeout_ms, 5000);
        assert_eq!(settings.log_settings.level, "info");
        assert_eq!(settings.robot, RobotIdentity::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_settings_path("reload");
        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().queue_capacity = 7;
        service.get_mut().write_timeout_ms = Some(250);
        service.save().unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.get().queue_capacity, 7);
        assert_eq!(reloaded.get().write_timeout(), Some(Duration::from_millis(250)));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let service = SettingsService::with_path(temp_settings_path("missing"));
        assert_eq!(service.get().queue_capacity, 100);
    }
}
