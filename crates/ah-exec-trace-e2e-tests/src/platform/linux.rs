// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Linux-specific test utilities for shim injection

use std::path::Path;

pub const SHIM_FILE_NAME: &str = "libah_exec_trace_shim.so";
pub const PRELOAD_VAR: &str = "LD_PRELOAD";

/// Inject the shim using LD_PRELOAD
pub fn inject_shim(command: &mut tokio::process::Command, shim: &Path) {
    command.env(PRELOAD_VAR, shim);
}
