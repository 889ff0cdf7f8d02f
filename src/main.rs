//! CLI entry point for songsync.

use std::process::ExitCode;

mod app;
mod app_config;
mod cli;
mod output;

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Partial,
    Failure,
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_songsync().await {
        Ok(exit) => app::exit_handler::exit_code(exit),
        Err(error) => {
            eprintln!("Error: {error:#}");
            app::exit_handler::exit_code(ProcessExit::Failure)
        }
    }
}
