use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use log::{debug, info};
use taskwatch_core::SyncConfig;

use crate::util::{as_millis, non_empty, parse_duration};
use crate::{ConfigLoadError, validate};

pub const CONFIG_PATH_VAR: &str = "TASKWATCH_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "TASKWATCH_CONFIG_JSON";
pub const SERVER_URL_VAR: &str = "TASKWATCH_SERVER_URL";
pub const TASK_POLL_VAR: &str = "TASKWATCH_TASK_POLL_INTERVAL";
pub const TYPE_POLL_VAR: &str = "TASKWATCH_TYPE_POLL_INTERVAL";

const DEFAULT_FILES: &[&str] =
    &["taskwatch.toml", "taskwatch.json", "config/taskwatch.toml"];

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl fmt::Display for SyncConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("built-in defaults"),
            Self::EnvPath(path) => {
                write!(f, "{} ({})", path.display(), CONFIG_PATH_VAR)
            }
            Self::EnvInline => f.write_str(CONFIG_JSON_VAR),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A validated configuration and its origin.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: SyncConfig,
    pub source: SyncConfigSource,
    /// Environment variables that overrode file or default values.
    pub overrides: Vec<&'static str>,
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves a [`SyncConfig`].
///
/// Evaluation order:
/// 1) `$TASKWATCH_CONFIG_PATH` (TOML or JSON file),
/// 2) `$TASKWATCH_CONFIG_JSON` (inline JSON),
/// 3) the first existing default file,
/// 4) defaults.
///
/// Env overrides are applied on top, then the result is validated.
pub struct ConfigLoader {
    env: EnvLookup,
    candidates: Vec<PathBuf>,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Read the process environment; look for default files in the working
    /// directory, then in the user config directory.
    pub fn new() -> Self {
        let mut candidates: Vec<PathBuf> =
            DEFAULT_FILES.iter().map(PathBuf::from).collect();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("taskwatch").join("config.toml"));
        }
        Self {
            env: Box::new(|name| std::env::var(name).ok()),
            candidates,
        }
    }

    /// Replace the environment with `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    /// Look for default files under `dir` only.
    pub fn search_in(mut self, dir: &Path) -> Self {
        self.candidates =
            DEFAULT_FILES.iter().map(|name| dir.join(name)).collect();
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = self.resolve()?;
        debug!("[Config] Loaded settings from {}", source);

        let overrides = self.apply_overrides(&mut config)?;
        if !overrides.is_empty() {
            info!("[Config] Environment overrides: {}", overrides.join(", "));
        }

        validate(&config)?;
        Ok(ConfigLoad {
            config,
            source,
            overrides,
        })
    }

    fn var(&self, name: &str) -> Option<String> {
        non_empty((self.env)(name))
    }

    fn resolve(
        &self,
    ) -> Result<(SyncConfig, SyncConfigSource), ConfigLoadError> {
        if let Some(path) = self.var(CONFIG_PATH_VAR) {
            let path = PathBuf::from(path);
            let config = load_from_file(&path)?;
            return Ok((config, SyncConfigSource::EnvPath(path)));
        }

        if let Some(raw) = self.var(CONFIG_JSON_VAR) {
            let config = parse_json(&raw).map_err(|source| {
                ConfigLoadError::Parse {
                    origin: CONFIG_JSON_VAR.to_string(),
                    source,
                }
            })?;
            return Ok((config, SyncConfigSource::EnvInline));
        }

        if let Some(path) = self.candidates.iter().find(|path| path.exists())
        {
            let config = load_from_file(path)?;
            return Ok((config, SyncConfigSource::File(path.clone())));
        }

        Ok((SyncConfig::default(), SyncConfigSource::Default))
    }

    fn apply_overrides(
        &self,
        config: &mut SyncConfig,
    ) -> Result<Vec<&'static str>, ConfigLoadError> {
        let mut applied = Vec::new();

        if let Some(url) = self.var(SERVER_URL_VAR) {
            config.server_url = url;
            applied.push(SERVER_URL_VAR);
        }
        if let Some(millis) = self.duration_var(TASK_POLL_VAR)? {
            config.poll.task_interval_ms = millis;
            applied.push(TASK_POLL_VAR);
        }
        if let Some(millis) = self.duration_var(TYPE_POLL_VAR)? {
            config.poll.type_interval_ms = millis;
            applied.push(TYPE_POLL_VAR);
        }

        Ok(applied)
    }

    fn duration_var(
        &self,
        var: &'static str,
    ) -> Result<Option<u64>, ConfigLoadError> {
        let Some(raw) = self.var(var) else {
            return Ok(None);
        };
        match parse_duration(&raw) {
            Ok(duration) => Ok(Some(as_millis(duration))),
            Err(err) => Err(ConfigLoadError::InvalidOverride {
                var,
                value: raw,
                reason: err.to_string(),
            }),
        }
    }
}

/// Read `path` as TOML or JSON, chosen by extension, else TOML then JSON.
pub fn load_from_file(path: &Path) -> Result<SyncConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents),
        Some("toml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid toml: {}", err)),
        _ => parse_from_str(&contents),
    };
    parsed.map_err(|source| ConfigLoadError::Parse {
        origin: path.display().to_string(),
        source,
    })
}

/// Try TOML first, then JSON.
pub fn parse_from_str(contents: &str) -> anyhow::Result<SyncConfig> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!("toml error: {}; json error: {}", toml_err, json_err)
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<SyncConfig> {
    serde_json::from_str(raw).context("invalid json")
}
