use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_FAN_INDEX: usize = 2;
pub const DEFAULT_FAN_MAX_RPM: u32 = 1800;
pub const MIN_REFRESH_INTERVAL_MS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_fan_index")]
    pub fan_index: usize,
    #[serde(default = "default_fan_max_rpm")]
    pub fan_max_rpm: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    Lhm,
    Sysinfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            fan_index: default_fan_index(),
            fan_max_rpm: default_fan_max_rpm(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fan_max_rpm < 1 {
            return Err(ConfigError::Validation(
                "fan_max_rpm должно быть >= 1".to_string(),
            ));
        }
        if self.fan_index > 255 {
            return Err(ConfigError::Validation(
                "fan_index должно быть в диапазоне 0..255".to_string(),
            ));
        }
        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

const fn default_fan_index() -> usize {
    DEFAULT_FAN_INDEX
}

const fn default_fan_max_rpm() -> u32 {
    DEFAULT_FAN_MAX_RPM
}
