use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use songsync_core::{SyncEngine, load_manifest};
use tracing::{debug, info};

use crate::app::progress::ProgressObserver;
use crate::app::{exit_handler, settings, terminal};
use crate::{ProcessExit, app_config, output};

pub(crate) async fn run_songsync() -> Result<ProcessExit> {
    let (args, cli_sources) = settings::parse_cli_with_sources();

    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(
        terminal::default_log_level(args.quiet, args.verbose),
        no_color,
    );
    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_file_config(args.config.as_deref())?;
    let resolved = settings::resolve_settings(
        &args,
        &cli_sources,
        file_config.as_ref(),
        |name| std::env::var(name).ok(),
    )?;
    debug!(catalog = ?resolved.catalog, "configuration resolved");

    let queries = load_manifest(&args.manifest, resolved.format)
        .with_context(|| format!("Failed to load manifest '{}'", args.manifest.display()))?;
    if queries.is_empty() {
        info!("{}", output::NO_QUERIES_MESSAGE);
    } else {
        info!(songs = queries.len(), "Parsed manifest");
    }

    if args.dry_run {
        output::print_dry_run(&queries);
        return Ok(ProcessExit::Success);
    }

    info!("songsync starting");
    let engine = SyncEngine::new(&resolved.catalog, resolved.options)
        .context("Invalid catalog configuration")?;

    let use_progress = terminal::should_use_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let observer = ProgressObserver::new(use_progress, queries.len());
    let result = engine.run(&queries, &resolved.dest, &observer).await;
    observer.finish();
    let report = result?;

    if !args.quiet {
        output::print_summary(&report);
    }

    Ok(exit_handler::determine_exit_outcome(report.verdict()))
}
