//! Merges CLI flags, environment credentials and the config file into the
//! library's configuration objects.
//!
//! Precedence: CLI flag > environment > config file > built-in default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use songsync_core::config::{DEFAULT_BASE_URL, DEFAULT_FALLBACK_EXTENSION};
use songsync_core::naming::sanitize_extension;
use songsync_core::{CatalogConfig, ExistingPolicy, ManifestFormat, RetryPolicy, SyncOptions};
use url::Url;

use crate::app_config::FileConfig;
use crate::cli::{Args, DEFAULT_DEST_DIR};

/// Cookie for privileged calls; overrides the config file.
pub(crate) const COOKIE_ENV: &str = "SONGSYNC_COOKIE";

/// Privileged API URL; overrides the config file.
pub(crate) const PRIVILEGED_URL_ENV: &str = "SONGSYNC_PRIVILEGED_URL";

/// Which defaulted flags were typed on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) max_retries: bool,
    pub(crate) pause_ms: bool,
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub(crate) catalog: CatalogConfig,
    pub(crate) options: SyncOptions,
    pub(crate) dest: PathBuf,
    pub(crate) format: ManifestFormat,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let command = Args::command();
    let matches = command.get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());

    let sources = CliValueSources {
        max_retries: is_commandline_value(&matches, "max_retries"),
        pause_ms: is_commandline_value(&matches, "pause_ms"),
    };
    (args, sources)
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Resolves the run settings. `env` looks up environment variables.
pub(crate) fn resolve_settings(
    args: &Args,
    sources: &CliValueSources,
    file: Option<&FileConfig>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RunSettings> {
    let empty = FileConfig::default();
    let file = file.unwrap_or(&empty);
    let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());

    let base_url = args
        .base_url
        .clone()
        .or_else(|| file.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    validate_url("base URL", &base_url)?;

    let privileged_url = args
        .privileged_url
        .clone()
        .or_else(|| env(PRIVILEGED_URL_ENV))
        .or_else(|| file.privileged_url.clone());
    if let Some(url) = &privileged_url {
        validate_url("privileged URL", url)?;
    }

    let cookie = env(COOKIE_ENV).or_else(|| file.cookie.clone());

    let mut catalog = CatalogConfig::with_base_url(base_url);
    catalog.privileged_url = privileged_url;
    catalog.cookie = cookie;
    catalog.headers.clone_from(&file.headers);
    if let Some(secs) = file.connect_timeout_secs {
        catalog.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.read_timeout_secs {
        catalog.read_timeout = Duration::from_secs(secs);
    }

    let max_retries = if sources.max_retries {
        args.max_retries
    } else {
        file.max_retries.unwrap_or(args.max_retries)
    };
    let pause_ms = if sources.pause_ms {
        args.pause_ms
    } else {
        file.query_pause_ms.unwrap_or(args.pause_ms)
    };

    let raw_extension = args
        .fallback_ext
        .clone()
        .or_else(|| file.fallback_extension.clone())
        .unwrap_or_else(|| DEFAULT_FALLBACK_EXTENSION.to_string());
    let Some(fallback_extension) = sanitize_extension(&raw_extension) else {
        bail!(
            "Invalid fallback extension '{raw_extension}'. Expected 1-8 ASCII letters or digits"
        );
    };

    let options = SyncOptions {
        fallback_extension,
        query_pause: Duration::from_millis(pause_ms),
        prune: !args.no_prune,
        existing_policy: if args.verify_existing {
            ExistingPolicy::VerifyLength
        } else {
            ExistingPolicy::TrustPresence
        },
        retry: RetryPolicy::with_max_retries(u32::from(max_retries)),
    };

    let dest = args
        .dest
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEST_DIR));

    Ok(RunSettings {
        catalog,
        options,
        dest,
        format: args.format.into(),
    })
}

fn validate_url(what: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).with_context(|| format!("Invalid {what} '{value}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Invalid {what} '{value}': expected an http or https URL");
    }
    Ok(())
}
