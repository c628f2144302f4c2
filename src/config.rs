use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which pending alarm the dispatcher treats as the head of the registry.
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HeadOrder {
    /// lowest id first, the order alarms are inserted in
    Id,
    /// earliest deadline first, ties go to the lowest id
    #[default]
    Due,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// most display workers alive at once
    pub worker_capacity: usize,
    /// length of one alarm second in milliseconds
    pub tick_millis: u64,
    /// how long the dispatcher idles on an empty registry, in ticks
    pub idle_ticks: u32,
    /// how often a display worker sweeps its queue, in ticks
    pub display_period_ticks: u32,
    /// longest message kept, in characters
    pub message_limit: usize,
    pub head_order: HeadOrder,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_capacity: 3,
            tick_millis: 1000,
            idle_ticks: 1,
            display_period_ticks: 5,
            message_limit: 128,
            head_order: HeadOrder::Due,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let config = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&config)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`, falling back to the defaults when the file is missing.
    pub fn load_or_default(path: PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: PathBuf) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = directories::ProjectDirs::from("", "", "alarm_dispatch")
            .ok_or(ConfigError::NoHome)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_capacity == 0 {
            return Err(ConfigError::Invalid("worker_capacity must be at least 1"));
        }
        if self.tick_millis == 0 {
            return Err(ConfigError::Invalid("tick_millis must be at least 1"));
        }
        // every interval is a tick count up to u32::MAX, that product has to fit
        let longest = self.tick().checked_mul(u32::MAX);
        if !longest.is_some_and(|longest| Instant::now().checked_add(longest).is_some()) {
            return Err(ConfigError::Invalid("tick_millis is too large"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    #[must_use]
    pub fn idle_interval(&self) -> Duration {
        self.tick().saturating_mul(self.idle_ticks.max(1))
    }

    #[must_use]
    pub fn display_period(&self) -> Duration {
        self.tick().saturating_mul(self.display_period_ticks.max(1))
    }
}
