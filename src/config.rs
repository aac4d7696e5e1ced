//! Engine configuration.
//!
//! Stored as TOML at `~/.config/iop/engine.toml` (or XDG equivalent). A
//! missing file yields [`EngineConfig::default`], which mirrors the linked
//! views of the published page.
//!
//! # Example Configuration
//!
//! ```toml
//! [logging]
//! filter = "info,interfaces_of_power::bus=debug"
//!
//! [[views]]
//! id = "removals"
//! dataset = "removals"
//! granularity = "year"
//! kind = "stackable"
//! top_n = 8
//! ordering = "descending_by_total"
//!
//! [[markers]]
//! date = "2020-11-03"
//! label = "2020 Presidential"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{Granularity, OrderingPolicy};
use crate::model::DatasetId;
use crate::model::types::DISCLOSURE_RATE_FIELD;
use crate::views::{Marker, ViewKind, ViewSpec};

/// Errors that can occur when loading or saving engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub logging: LoggingConfig,
    pub views: Vec<ViewSpec>,
    pub markers: Vec<Marker>,
}

fn election(y: i32, m: u32, d: u32, label: &str) -> Option<Marker> {
    NaiveDate::from_ymd_opt(y, m, d).map(|date| Marker {
        date,
        label: label.to_string(),
    })
}

impl Default for EngineConfig {
    fn default() -> Self {
        let views = vec![
            ViewSpec::new("ads", DatasetId::Ads, ViewKind::Stackable)
                .with_granularity(Granularity::Week),
            ViewSpec::new("requests", DatasetId::Requests, ViewKind::Lines)
                .with_secondary_axis(DISCLOSURE_RATE_FIELD),
            ViewSpec::new("removals", DatasetId::Removals, ViewKind::Stackable)
                .with_granularity(Granularity::Year)
                .with_top_n(8)
                .with_ordering(OrderingPolicy::DescendingByTotal),
            ViewSpec::new("states", DatasetId::StateSpend, ViewKind::Ranking).with_top_n(15),
        ];
        let markers = [
            election(2018, 11, 6, "2018 Midterms"),
            election(2020, 11, 3, "2020 Presidential"),
            election(2022, 11, 8, "2022 Midterms"),
            election(2024, 11, 5, "2024 Presidential"),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self {
            logging: LoggingConfig::default(),
            views,
            markers,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default location.
    ///
    /// Returns the default config if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default configuration file path.
    ///
    /// Uses XDG conventions:
    /// - Primary: `$XDG_CONFIG_HOME/iop/engine.toml`
    /// - Fallback: platform-specific config dir (e.g., `~/.config/iop/engine.toml` on Linux)
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("iop").join("engine.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("iop").join("engine.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Validate views and the logging filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        tracing_subscriber::EnvFilter::try_new(&self.logging.filter).map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid logging filter '{}': {e}",
                self.logging.filter
            ))
        })?;

        let mut seen_ids = HashSet::new();
        for view in &self.views {
            if view.id.as_str().is_empty() {
                return Err(ConfigError::Validation("View id cannot be empty".into()));
            }
            if !seen_ids.insert(&view.id) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate view id: {}",
                    view.id
                )));
            }
            if view.top_n == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "View '{}': top_n must be at least 1",
                    view.id
                )));
            }
            if view.kind.is_temporal() != view.dataset.is_temporal() {
                return Err(ConfigError::Validation(format!(
                    "View '{}': a {} view cannot show the {} dataset",
                    view.id, view.kind, view.dataset
                )));
            }
        }

        Ok(())
    }

    pub fn find_view(&self, id: &str) -> Option<&ViewSpec> {
        self.views.iter().find(|v| v.id.as_str() == id)
    }
}
