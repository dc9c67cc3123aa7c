//! Optional `config.toml` with defaults for the CLI flags.
//!
//! The file is a flat list of `key = value` lines. Strings are double-quoted,
//! numbers are bare, `#` starts a comment outside of strings.

use std::ffi::OsString;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use url::Url;

/// Settings read from the config file. `None` means "not set in the file".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Gateway login URL.
    pub gateway_url: Option<Url>,
    /// Base URL replacing `https://{provider host}`.
    pub provider_base_url: Option<Url>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Delay between second-factor status checks.
    pub poll_interval_ms: Option<u64>,
    /// Status checks per second-factor attempt.
    pub poll_max_attempts: Option<u32>,
    /// Seconds to wait for one second-factor approval.
    pub poll_timeout_secs: Option<u64>,
    /// Credential and second-factor attempts.
    pub max_login_attempts: Option<u32>,
}

impl FileConfig {
    /// Rejects values the CLI would not accept either.
    pub fn validate(&self) -> Result<()> {
        check_range("connect_timeout_secs", self.connect_timeout_secs, 1..=3600)?;
        check_range("read_timeout_secs", self.read_timeout_secs, 1..=3600)?;
        check_range("poll_interval_ms", self.poll_interval_ms, 1..=60_000)?;
        check_range(
            "poll_max_attempts",
            self.poll_max_attempts.map(u64::from),
            1..=100_000,
        )?;
        check_range("poll_timeout_secs", self.poll_timeout_secs, 1..=86_400)?;
        check_range(
            "max_login_attempts",
            self.max_login_attempts.map(u64::from),
            1..=1_000,
        )
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "gateway_url" => self.gateway_url = Some(http_url(value)?),
            "provider_base_url" => self.provider_base_url = Some(http_url(value)?),
            "connect_timeout_secs" => self.connect_timeout_secs = Some(number(value)?),
            "read_timeout_secs" => self.read_timeout_secs = Some(number(value)?),
            "poll_interval_ms" => self.poll_interval_ms = Some(number(value)?),
            "poll_max_attempts" => self.poll_max_attempts = Some(number(value)?),
            "poll_timeout_secs" => self.poll_timeout_secs = Some(number(value)?),
            "max_login_attempts" => self.max_login_attempts = Some(number(value)?),
            other => bail!("Unknown configuration key: '{other}'"),
        }
        Ok(())
    }
}

const KNOWN_KEYS: [&str; 8] = [
    "gateway_url",
    "provider_base_url",
    "connect_timeout_secs",
    "read_timeout_secs",
    "poll_interval_ms",
    "poll_max_attempts",
    "poll_timeout_secs",
    "max_login_attempts",
];

fn check_range(field: &str, value: Option<u64>, allowed: RangeInclusive<u64>) -> Result<()> {
    match value {
        Some(value) if !allowed.contains(&value) => bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            allowed.start(),
            allowed.end()
        ),
        _ => Ok(()),
    }
}

/// Where the config file was looked for and what it contained.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// `None` when neither `XDG_CONFIG_HOME` nor `HOME` is set.
    pub path: Option<PathBuf>,
    /// `None` when no file exists at `path`.
    pub config: Option<FileConfig>,
}

/// `$XDG_CONFIG_HOME/weblogin/config.toml`, else `$HOME/.config/weblogin/config.toml`.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    let base = non_empty_env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty_env("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("weblogin").join("config.toml"))
}

fn non_empty_env(name: &str) -> Option<OsString> {
    std::env::var_os(name).filter(|value| !value.is_empty())
}

/// Reads the config file at the default location, if there is one.
///
/// A missing file is not an error; an unreadable or invalid one is.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match &path {
        Some(file) if file.exists() => Some(load_file_config(file)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&text)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(text: &str) -> Result<FileConfig> {
    let mut config = FileConfig::default();
    for (number, line) in (1..).zip(text.lines()) {
        let line = without_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .map(|(key, value)| (key.trim(), value.trim()))
            .ok_or_else(|| anyhow!("Invalid config syntax on line {number}: expected key = value"))?;
        if !KNOWN_KEYS.contains(&key) {
            bail!("Unknown configuration key: '{key}' on line {number}");
        }
        config
            .set(key, value)
            .with_context(|| format!("Invalid `{key}` value on line {number}"))?;
    }
    config.validate()?;
    Ok(config)
}

fn without_comment(line: &str) -> &str {
    let mut quoted = false;
    for (index, ch) in line.char_indices() {
        if ch == '"' {
            quoted = !quoted;
        } else if ch == '#' && !quoted {
            return &line[..index];
        }
    }
    line
}

fn http_url(value: &str) -> Result<Url> {
    let inner = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| anyhow!("Expected double-quoted string"))?;
    let url = Url::parse(inner).with_context(|| format!("'{inner}' is not a URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Expected an http or https URL");
    }
    Ok(url)
}

fn number<T: TryFrom<u64>>(value: &str) -> Result<T> {
    let parsed: u64 = value
        .parse()
        .with_context(|| format!("Expected a non-negative integer, got '{value}'"))?;
    T::try_from(parsed).map_err(|_| anyhow!("Integer {parsed} is out of range"))
}
