//! Hierarchical user configuration.
//!
//! Values live in a TOML tree and are addressed by key paths such as
//! `["extractor", "nijie", "username"]`. Files are merged in load order, later files override
//! earlier ones, and command line options are applied on top.
use directories::ProjectDirs;
use log::{debug, warn};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFail {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFail {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid 'key=value' pair: {option}")]
    InvalidOption { option: String },
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Table,
}

impl Config {
    /// Returns the directory holding the default configuration file.
    ///
    /// Set the env var `GDL_CONFIG_DIR` to point it to a custom location.
    pub fn default_dir() -> Option<PathBuf> {
        if let Ok(dir) = env::var("GDL_CONFIG_DIR") {
            return Some(PathBuf::from(dir));
        }
        ProjectDirs::from("com", "FerrahWolfeh", "gallery-dl").map(|p| p.config_dir().to_path_buf())
    }

    /// Load the default configuration file if it exists.
    ///
    /// Errors are logged and otherwise ignored, a broken default file never prevents a run.
    pub fn load_default() -> Self {
        let mut config = Self::default();
        if let Some(dir) = Self::default_dir() {
            let path = dir.join(CONFIG_FILE);
            if path.exists() {
                if let Err(error) = config.merge_file(&path) {
                    warn!("{}", error);
                }
            } else {
                debug!("No config file at {}", path.display());
            }
        }
        config
    }

    /// Parse a TOML file and merge it on top of the current values.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFail {
            path: path.to_path_buf(),
            source,
        })?;
        let table: Table = toml::from_str(&raw).map_err(|source| ConfigError::ParseFail {
            path: path.to_path_buf(),
            source,
        })?;
        merge_tables(&mut self.root, table);
        debug!("Loaded config file {}", path.display());
        Ok(())
    }

    /// Look up the value at exactly `path`.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut table = &self.root;
        for key in parents {
            table = table.get(*key)?.as_table()?;
        }
        table.get(*last)
    }

    /// Set the value at `path`, creating intermediate tables as needed.
    ///
    /// Non-table values along the way are replaced.
    pub fn set(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut table = &mut self.root;
        for key in parents {
            let entry = table
                .entry((*key).to_string())
                .or_insert(Value::Table(Table::new()));
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            let Value::Table(next) = entry else {
                return;
            };
            table = next;
        }
        table.insert((*last).to_string(), value);
    }

    /// Look up the leaf key of `path` at every level from the root down.
    ///
    /// The shallowest hit wins: `interpolate(["extractor", "nijie", "username"])` returns the
    /// top-level `username` if one is set, then `extractor.username`, then
    /// `extractor.nijie.username`.
    pub fn interpolate(&self, path: &[&str]) -> Option<&Value> {
        let (key, parents) = path.split_last()?;
        let mut table = &self.root;
        if let Some(value) = table.get(*key) {
            return Some(value);
        }
        for parent in parents {
            table = table.get(*parent)?.as_table()?;
            if let Some(value) = table.get(*key) {
                return Some(value);
            }
        }
        None
    }

    /// [`interpolate`](Self::interpolate) for string values.
    pub fn interpolate_str(&self, path: &[&str]) -> Option<String> {
        self.interpolate(path)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    /// Apply a `key=value` option. The key is split on dots; the value is read as JSON and
    /// falls back to a plain string. A JSON `null` is stored as `false`.
    pub fn parse_option(&mut self, option: &str) -> Result<(), ConfigError> {
        let Some((key, raw)) = option.split_once('=') else {
            return Err(ConfigError::InvalidOption {
                option: option.to_string(),
            });
        };
        if key.is_empty() {
            return Err(ConfigError::InvalidOption {
                option: option.to_string(),
            });
        }

        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Null) => Value::Boolean(false),
            Ok(json) => Value::try_from(json).unwrap_or_else(|_| Value::String(raw.to_string())),
            Err(_) => Value::String(raw.to_string()),
        };

        let path: Vec<&str> = key.split('.').collect();
        self.set(&path, value);
        Ok(())
    }
}

fn merge_tables(base: &mut Table, other: Table) {
    for (key, value) in other {
        if let Value::Table(incoming) = value {
            if let Some(Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}
