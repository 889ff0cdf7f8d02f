//! Application configuration loading for CLI defaults.
//!
//! The file uses a small `key = value` syntax: strings are double-quoted,
//! integers are bare, `#` starts a comment. `header` may repeat.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use songsync_core::parse_header_line;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SONGSYNC_CONFIG";

/// File-backed defaults. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Catalog API base URL.
    pub base_url: Option<String>,
    /// Privileged location API URL.
    pub privileged_url: Option<String>,
    /// Cookie header value for privileged calls.
    pub cookie: Option<String>,
    /// Extra headers for privileged calls, in file order.
    pub headers: Vec<(String, String)>,
    /// Default destination directory.
    pub output_dir: Option<PathBuf>,
    /// Default retry budget (same range as CLI).
    pub max_retries: Option<u8>,
    /// Extension used when the catalog reports no format.
    pub fallback_extension: Option<String>,
    /// API connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// API read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Pause between queries in milliseconds.
    pub query_pause_ms: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }
        if let Some(pause) = self.query_pause_ms
            && pause > 60_000
        {
            bail!("Invalid config value for `query_pause_ms`: {pause}. Expected range: 0..=60000");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(ext) = &self.fallback_extension
            && songsync_core::naming::sanitize_extension(ext).is_none()
        {
            bail!(
                "Invalid config value for `fallback_extension`: '{ext}'. Expected 1-8 ASCII letters or digits"
            );
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Picks the config file to read.
///
/// Priority:
/// 1. `explicit` (the `--config` flag)
/// 2. `$SONGSYNC_CONFIG`
/// 3. `$XDG_CONFIG_HOME/songsync/config.toml`
/// 4. `$HOME/.config/songsync/config.toml`
///
/// The boolean is true when the path was named explicitly, in which case a
/// missing file is an error rather than "no config".
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<(PathBuf, bool)> {
    if let Some(path) = explicit {
        return Some((path.to_path_buf(), true));
    }
    if let Some(path) = env_var_non_empty_os(CONFIG_PATH_ENV) {
        return Some((PathBuf::from(path), true));
    }
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some((
            PathBuf::from(xdg_config_home)
                .join("songsync")
                .join("config.toml"),
            false,
        ));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some((
        PathBuf::from(home)
            .join(".config")
            .join("songsync")
            .join("config.toml"),
        false,
    ))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file selected by [`resolve_config_path`], if any.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    let Some((path, required)) = resolve_config_path(explicit) else {
        return Ok(None);
    };
    if !path.exists() {
        if required {
            bail!("Config file '{}' does not exist", path.display());
        }
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(Some(config))
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "base_url" => cfg.base_url = Some(parse_string_literal(value).with_context(invalid)?),
            "privileged_url" => {
                cfg.privileged_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "cookie" => cfg.cookie = Some(parse_string_literal(value).with_context(invalid)?),
            "header" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                let Some(header) = parse_header_line(&parsed) else {
                    bail!("Invalid `header` value on line {line_no}: expected \"Name: value\"");
                };
                cfg.headers.push(header);
            }
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "max_retries" => cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?),
            "fallback_extension" => {
                cfg.fallback_extension = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "query_pause_ms" => {
                cfg.query_pause_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}
