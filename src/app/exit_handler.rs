//! Exit code logic for the songsync process.
//!
//! Single responsibility: map the run verdict to the process exit outcome.

use std::process::ExitCode;

use songsync_core::RunVerdict;

use crate::ProcessExit;

/// Determines the process exit outcome from the run verdict.
pub(crate) fn determine_exit_outcome(verdict: RunVerdict) -> ProcessExit {
    match verdict {
        RunVerdict::Success => ProcessExit::Success,
        RunVerdict::PartialFailure => ProcessExit::Partial,
        RunVerdict::Failure => ProcessExit::Failure,
    }
}

/// `0` success, `1` partial failure, `2` hard failure.
pub(crate) fn exit_code(exit: ProcessExit) -> ExitCode {
    match exit {
        ProcessExit::Success => ExitCode::SUCCESS,
        ProcessExit::Partial => ExitCode::from(1),
        ProcessExit::Failure => ExitCode::from(2),
    }
}
