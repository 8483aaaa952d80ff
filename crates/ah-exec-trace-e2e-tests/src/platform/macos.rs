// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! macOS-specific test utilities for shim injection

use std::path::Path;

pub const SHIM_FILE_NAME: &str = "libah_exec_trace_shim.dylib";
pub const PRELOAD_VAR: &str = "DYLD_INSERT_LIBRARIES";

/// Inject the shim using DYLD_INSERT_LIBRARIES with a flat namespace
pub fn inject_shim(command: &mut tokio::process::Command, shim: &Path) {
    command
        .env(PRELOAD_VAR, shim)
        .env("DYLD_FORCE_FLAT_NAMESPACE", "1");
}
