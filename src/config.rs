//! Configuration file support.
//!
//! Settings are stored as JSON. Every field has a default so partial files
//! load fine and older files keep working when fields are added.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Current configuration file format version.
pub const CONFIG_VERSION: u32 = 1;

/// Screen-space radius within which a press or click hits an existing point.
pub const DEFAULT_HIT_RADIUS_PX: f32 = 15.0;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// The closed set of categories new points can be tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// When false, new points get sequential `Point N` labels instead
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_category_names")]
    pub names: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            names: default_category_names(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_category_names() -> Vec<String> {
    ["ship", "door", "chair"].map(String::from).to_vec()
}

fn default_hit_radius() -> f32 {
    DEFAULT_HIT_RADIUS_PX
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Colours used for detection overlays whose label has no explicit entry.
pub fn default_overlay_colors() -> BTreeMap<String, [u8; 3]> {
    [
        ("person", [0xFF, 0x6B, 0x6B]),
        ("car", [0x4E, 0xCD, 0xC4]),
        ("dog", [0x45, 0xB7, 0xD1]),
        ("cat", [0xFF, 0xA0, 0x7A]),
        ("bicycle", [0x98, 0xD8, 0xC8]),
        ("motorbike", [0xF7, 0xDC, 0x6F]),
        ("bus", [0xBB, 0x8F, 0xCE]),
        ("truck", [0x85, 0xC1, 0xE9]),
    ]
    .into_iter()
    .map(|(name, rgb)| (name.to_string(), rgb))
    .collect()
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Hit-test radius in screen pixels, independent of the current scale
    #[serde(default = "default_hit_radius")]
    pub hit_radius_px: f32,

    #[serde(default)]
    pub categories: CategoryConfig,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Write each image's points to a sidecar file after every change
    #[serde(default = "default_true")]
    pub autosave: bool,

    /// Detection label -> RGB colour for overlay outlines
    #[serde(default = "default_overlay_colors")]
    pub overlay_colors: BTreeMap<String, [u8; 3]>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            hit_radius_px: DEFAULT_HIT_RADIUS_PX,
            categories: CategoryConfig::default(),
            log_level: LogLevel::default(),
            autosave: true,
            overlay_colors: default_overlay_colors(),
        }
    }
}

impl AnnotatorConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        if config.version != CONFIG_VERSION {
            log::warn!(
                "Config {:?} has version {}, expected {}",
                path,
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Parse and validate configuration JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hit_radius_px.is_finite() && self.hit_radius_px > 0.0) {
            return Err(ConfigError::BadHitRadius(self.hit_radius_px));
        }
        if self.categories.enabled && self.categories.names.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        Ok(())
    }
}
