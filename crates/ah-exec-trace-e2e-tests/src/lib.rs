// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end tests for the exec trace shim
//!
//! Utilities for running the `exec_helper` binary with the shim injected.
//! The shim is a `cdylib`, so these tests use the artifact produced by a
//! prior `cargo build` and skip when it is missing.

#[cfg(any(target_os = "macos", target_os = "linux"))]
pub mod platform;

#[cfg(any(target_os = "macos", target_os = "linux"))]
pub use platform::*;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;

pub const OUTPUT_VAR: &str = "INTERCEPT_BUILD_TARGET_DIR";
pub const LOG_VAR: &str = "AH_EXECTRACE_LOG";

/// Locate the built shim in the target directory that holds `binary`.
pub fn find_shim_path(binary: &Path) -> Option<PathBuf> {
    let dir = binary.parent()?;
    [
        dir.join(SHIM_FILE_NAME),
        dir.join("deps").join(SHIM_FILE_NAME),
    ]
    .into_iter()
    .find(|path| path.exists())
}

/// Run `program` with the shim injected, reporting to `output` when given.
pub async fn run_traced<S: AsRef<OsStr>>(
    shim: &Path,
    output: Option<&Path>,
    cwd: &Path,
    program: &Path,
    args: &[S],
) -> anyhow::Result<Output> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .env_remove(OUTPUT_VAR)
        .env_remove(LOG_VAR);
    inject_shim(&mut command, shim);
    if let Some(output) = output {
        command.env(OUTPUT_VAR, output);
    }
    Ok(command.output().await?)
}

/// Parse the `KEY=VALUE` lines printed by `exec_helper env`.
pub fn reported_env(output: &Output) -> Vec<(String, Option<String>)> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            if let Some(key) = line.strip_suffix(" is unset") {
                return Some((key.to_string(), None));
            }
            let (key, value) = line.split_once('=')?;
            Some((key.to_string(), Some(value.to_string())))
        })
        .collect()
}

/// Value printed by `exec_helper env` for `key`, if set.
pub fn reported_var(output: &Output, key: &str) -> Option<String> {
    reported_env(output)
        .into_iter()
        .find(|(name, _)| name == key)
        .and_then(|(_, value)| value)
}
