//! Engine configuration loaded from TOML.
//!
//! Every section is optional; missing values fall back to the defaults of
//! [`EngineConfig`].
use crate::device::DeviceSelection;
use crate::engine::{Diagnostics, EngineConfig};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "MARS_ENGINE_CONFIG";

/// Configuration file read when [`CONFIG_PATH_VAR`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "mars-engine.toml";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path:?}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse configuration")]
    Parse(#[from] toml::de::Error),
    /// A queue capability name is not recognized.
    #[error("unknown queue flag {0:?}")]
    UnknownQueueFlag(String),
    /// `queue_flags` is empty, which every queue family would satisfy.
    #[error("at least one queue flag is required")]
    NoQueueFlags,
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// `[application]` section.
    pub application: ApplicationConfig,
    /// `[diagnostics]` section.
    pub diagnostics: DiagnosticsConfig,
    /// `[device]` section.
    pub device: DeviceConfig,
}

/// `[application]`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name advertised to the driver.
    pub name: String,
    /// Major, minor, patch.
    pub version: [u32; 3],
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Hello Vulkan".to_owned(),
            version: [0, 1, 0],
        }
    }
}

/// `[diagnostics]`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Install validation layers and the debug report callback.
    pub enabled: bool,
    /// Raise an OS alert for error reports.
    pub alert_on_error: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            alert_on_error: true,
        }
    }
}

/// Physical device selection policy names.
#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Device at index 0.
    #[default]
    First,
    /// Discrete GPUs, then integrated ones.
    Discrete,
    /// Integrated GPUs, then discrete ones.
    Integrated,
}

/// `[device]`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Capabilities the queue family must have.
    pub queue_flags: Vec<String>,
    /// Priority of the created queue.
    pub queue_priority: f32,
    /// Physical device selection policy.
    pub selection: SelectionPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            queue_flags: vec!["graphics".to_owned()],
            queue_priority: 1.0,
            selection: SelectionPolicy::First,
        }
    }
}

impl Config {
    /// Load the configuration named by [`CONFIG_PATH_VAR`], or
    /// [`DEFAULT_CONFIG_PATH`], falling back to defaults on any error.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from_path(&path).unwrap_or_else(|e| {
            log::warn!("Failed to load {:?}: {}. Using defaults.", path, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path. A missing file yields the
    /// defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_toml(&content)?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The queue capabilities `[device] queue_flags` names.
    pub fn queue_flags(&self) -> Result<vk::QueueFlags, ConfigError> {
        if self.device.queue_flags.is_empty() {
            return Err(ConfigError::NoQueueFlags);
        }

        self.device
            .queue_flags
            .iter()
            .try_fold(vk::QueueFlags::empty(), |flags, name| {
                let flag = match name.to_lowercase().as_str() {
                    "graphics" => vk::QueueFlags::GRAPHICS,
                    "compute" => vk::QueueFlags::COMPUTE,
                    "transfer" => vk::QueueFlags::TRANSFER,
                    "sparse_binding" => vk::QueueFlags::SPARSE_BINDING,
                    _ => return Err(ConfigError::UnknownQueueFlag(name.clone())),
                };
                Ok(flags | flag)
            })
    }

    /// Converts to the parameters of [`Engine::start`](crate::Engine::start).
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let [major, minor, patch] = self.application.version;
        let diagnostics = if self.diagnostics.enabled {
            Diagnostics::Enabled {
                alert_on_error: self.diagnostics.alert_on_error,
            }
        } else {
            Diagnostics::Disabled
        };
        let selection = match self.device.selection {
            SelectionPolicy::First => DeviceSelection::First,
            SelectionPolicy::Discrete => DeviceSelection::prefer_discrete(),
            SelectionPolicy::Integrated => DeviceSelection::PrioritiseTypes(
                [
                    vk::PhysicalDeviceType::INTEGRATED_GPU,
                    vk::PhysicalDeviceType::DISCRETE_GPU,
                ]
                .into_iter()
                .collect(),
            ),
        };

        Ok(EngineConfig {
            app_name: self.application.name.clone(),
            app_version: vk::make_api_version(0, major, minor, patch),
            diagnostics,
            queue_flags: self.queue_flags()?,
            queue_priority: self.device.queue_priority,
            selection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.app_name, "Hello Vulkan");
        assert_eq!(engine.app_version, vk::make_api_version(0, 0, 1, 0));
        assert_eq!(engine.queue_flags, vk::QueueFlags::GRAPHICS);
        assert_eq!(engine.selection, DeviceSelection::First);
    }

    #[test]
    fn full_file() {
        let config = Config::from_toml(
            r#"
            [application]
            name = "Mars"
            version = [1, 2, 3]

            [diagnostics]
            enabled = true
            alert_on_error = false

            [device]
            queue_flags = ["graphics", "Compute"]
            selection = "discrete"
            "#,
        )
        .unwrap();

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.app_name, "Mars");
        assert_eq!(engine.app_version, vk::make_api_version(0, 1, 2, 3));
        assert_eq!(
            engine.diagnostics,
            Diagnostics::Enabled {
                alert_on_error: false
            }
        );
        assert_eq!(
            engine.queue_flags,
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE
        );
        assert_eq!(engine.selection, DeviceSelection::prefer_discrete());
    }

    #[test]
    fn unknown_queue_flag() {
        let config = Config::from_toml("[device]\nqueue_flags = [\"video\"]").unwrap();
        assert!(matches!(
            config.engine_config(),
            Err(ConfigError::UnknownQueueFlag(name)) if name == "video"
        ));
    }

    #[test]
    fn empty_queue_flags_are_rejected() {
        let config = Config::from_toml("[device]\nqueue_flags = []").unwrap();
        assert!(matches!(
            config.engine_config(),
            Err(ConfigError::NoQueueFlags)
        ));
    }

    #[test]
    fn malformed_file() {
        assert!(matches!(
            Config::from_toml("[application]\nversion = \"one\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_default() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config, Config::default());
    }
}
