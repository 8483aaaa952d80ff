// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::io;

use thiserror::Error;

/// Failures raised while intercepting a process-creation call.
///
/// Every variant is fatal for the host process: the exported hooks log the
/// error and terminate with `EXIT_FAILURE` instead of returning to the caller.
#[derive(Error, Debug)]
pub enum ShimError {
    #[error("out of memory while building a string array")]
    OutOfMemory,

    #[error("string contains an interior NUL byte")]
    InteriorNul,

    #[error("unable to resolve the next definition of {symbol}")]
    Resolve { symbol: String },

    #[error("unable to determine the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    #[error("failed to report to {destination}: {source}")]
    Transport {
        destination: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to update {key} in the process environment: {source}")]
    Environment {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Report an unrecoverable hook failure and terminate the host process.
pub fn fatal(function: &str, err: ShimError) -> ! {
    tracing::error!(function, error = %err, "exec interception failed");
    eprintln!("[ah-exec-trace-shim] {function}: {err}");
    std::process::exit(libc::EXIT_FAILURE)
}
