// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use pluto_app::{DEFAULT_BUFFER_LIMIT, DEFAULT_CONSOLE_CAPACITY, DEFAULT_MAX_HISTORY, StormLimits};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "pluto";
pub const CONFIG_PATH_ENV: &str = "PLUTO_CONFIG_PATH";

const CONFIG_VERSION: i64 = 1;
const DEFAULT_TIMEOUT: &str = "10s";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub cortex: Cortex,
    #[serde(default)]
    pub storm: Storm,
    #[serde(default)]
    pub console: ConsoleSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            cortex: Cortex::default(),
            storm: Storm::default(),
            console: ConsoleSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cortex {
    pub url: Option<String>,
    pub timeout: Option<String>,
    pub insecure: Option<bool>,
}

impl Default for Cortex {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            insecure: Some(false),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storm {
    pub buffer_limit: Option<i64>,
    pub max_history: Option<i64>,
}

impl Default for Storm {
    fn default() -> Self {
        Self {
            buffer_limit: Some(DEFAULT_BUFFER_LIMIT as i64),
            max_history: Some(DEFAULT_MAX_HISTORY as i64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleSection {
    pub capacity: Option<i64>,
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CONSOLE_CAPACITY as i64),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [cortex], [storm], and [console]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(timeout) = &self.cortex.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "cortex.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        let limits = [
            ("storm.buffer_limit", self.storm.buffer_limit),
            ("storm.max_history", self.storm.max_history),
            ("console.capacity", self.console.capacity),
        ];
        for (name, value) in limits {
            if let Some(value) = value
                && value <= 0
            {
                bail!(
                    "{name} in {} must be positive, got {}",
                    path.display(),
                    value
                );
            }
        }

        Ok(())
    }

    pub fn cortex_url(&self) -> Option<&str> {
        self.cortex
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn cortex_timeout(&self) -> Result<Duration> {
        parse_duration(self.cortex.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn insecure(&self) -> bool {
        self.cortex.insecure.unwrap_or(false)
    }

    pub fn storm_limits(&self) -> StormLimits {
        StormLimits {
            buffer_limit: positive_or(self.storm.buffer_limit, DEFAULT_BUFFER_LIMIT),
            max_history: positive_or(self.storm.max_history, DEFAULT_MAX_HISTORY),
            console_capacity: positive_or(self.console.capacity, DEFAULT_CONSOLE_CAPACITY),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# pluto config\n# Place this file at: {}\n\nversion = 1\n\n[cortex]\n# Prefilled on the login screen. The password may come from PLUTO_PASSWORD.\n# url = \"https://user@cortex.example.com:4443\"\ntimeout = \"{}\"\ninsecure = false\n\n[storm]\nbuffer_limit = {}\nmax_history = {}\n\n[console]\ncapacity = {}\n",
            path.display(),
            DEFAULT_TIMEOUT,
            DEFAULT_BUFFER_LIMIT,
            DEFAULT_MAX_HISTORY,
            DEFAULT_CONSOLE_CAPACITY,
        )
    }
}

fn positive_or(value: Option<i64>, default: usize) -> usize {
    value
        .and_then(|value| usize::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
}
