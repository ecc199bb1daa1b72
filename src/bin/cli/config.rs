use super::OutputFormat;
use cctql::AggregationMode;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub name: String,
    pub graph: Option<PathBuf>,
    pub mode: Option<AggregationMode>,
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
    default_mode: Option<AggregationMode>,
    default_format: Option<OutputFormat>,
    profiles: BTreeMap<String, Profile>,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        let default_mode = parse_mode("defaults", data.default_mode.as_deref())?;
        let default_format = parse_format("defaults", data.default_format.as_deref())?;
        let profiles = parse_profiles(&data)?;
        Ok(Self {
            path,
            data,
            default_mode,
            default_format,
            profiles,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.data.log_filter.as_deref()
    }

    pub fn default_mode(&self) -> Option<AggregationMode> {
        self.default_mode
    }

    pub fn default_format(&self) -> Option<OutputFormat> {
        self.default_format
    }

    pub fn default_profile_name(&self) -> Option<&str> {
        self.data
            .default_profile
            .as_deref()
            .filter(|name| self.profiles.contains_key(*name))
    }

    /// Looks up `requested`, falling back to the configured default profile.
    pub fn resolve_profile(&self, requested: Option<&str>) -> Result<Option<&Profile>, ConfigError> {
        match requested {
            Some(name) => self
                .profiles
                .get(name)
                .map(Some)
                .ok_or_else(|| ConfigError::ProfileNotFound {
                    name: name.to_string(),
                }),
            None => Ok(self
                .default_profile_name()
                .and_then(|name| self.profiles.get(name))),
        }
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn set_default_profile(&mut self, name: Option<&str>) -> Result<(), ConfigError> {
        if let Some(name) = name {
            if !self.profiles.contains_key(name) {
                return Err(ConfigError::ProfileNotFound {
                    name: name.to_string(),
                });
            }
            self.data.default_profile = Some(name.to_string());
        } else {
            self.data.default_profile = None;
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<PathBuf, ConfigError> {
        let target = if let Some(path) = &self.path {
            path.clone()
        } else if let Some(default) = default_config_path() {
            default
        } else {
            return Err(ConfigError::NoConfigPath);
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = toml::to_string_pretty(&self.data)
            .map_err(|source| ConfigError::Serialize { source })?;
        fs::write(&target, serialized).map_err(|source| ConfigError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_profiles(data: &RawConfig) -> Result<BTreeMap<String, Profile>, ConfigError> {
    let mut profiles = BTreeMap::new();
    for (name, raw) in &data.profiles {
        profiles.insert(name.clone(), convert_profile(name, raw)?);
    }
    if let Some(default_name) = data.default_profile.as_ref() {
        if !profiles.contains_key(default_name) {
            return Err(ConfigError::ProfileNotFound {
                name: default_name.clone(),
            });
        }
    }
    Ok(profiles)
}

fn convert_profile(name: &str, raw: &RawProfile) -> Result<Profile, ConfigError> {
    Ok(Profile {
        name: name.to_string(),
        graph: raw.graph.clone(),
        mode: parse_mode(name, raw.mode.as_deref())?,
        format: parse_format(name, raw.format.as_deref())?,
    })
}

fn parse_mode(scope: &str, value: Option<&str>) -> Result<Option<AggregationMode>, ConfigError> {
    value
        .map(|value| {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                scope: scope.to_string(),
                key: "mode",
                value: value.to_string(),
            })
        })
        .transpose()
}

fn parse_format(scope: &str, value: Option<&str>) -> Result<Option<OutputFormat>, ConfigError> {
    value
        .map(|value| {
            OutputFormat::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
                scope: scope.to_string(),
                key: "format",
                value: value.to_string(),
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_profile: Option<String>,
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize CLI config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("failed to write CLI config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
    #[error("{scope}: invalid {key} '{value}'")]
    InvalidValue {
        scope: String,
        key: &'static str,
        value: String,
    },
    #[error("no config directory found; pass --config or set CCTQL_CONFIG")]
    NoConfigPath,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("cctql").join("cli.toml"))
}
