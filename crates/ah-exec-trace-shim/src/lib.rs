// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exec Trace Interposition Shim
//!
//! A preloadable library that records every process-creation call a build
//! makes and keeps itself injected into the processes those calls create:
//! - Linux: loaded through LD_PRELOAD
//! - macOS: loaded through DYLD_INSERT_LIBRARIES with DYLD_FORCE_FLAT_NAMESPACE
//!
//! The library activates only when the output destination and the preload
//! path are both present in the environment at load time. Records go to the
//! destination named by `INTERCEPT_BUILD_TARGET_DIR`, either a directory of
//! `*.cmd` files or a collector socket (see `ah-exec-trace-proto`).
//!
//! `execl`, `execlp` and `execle` are variadic in C; their arguments are
//! collected by a small C trampoline before reaching the same interceptor.

use std::ffi::CStr;

pub mod environment;
pub mod error;
pub mod guard;
pub mod intercept;
pub mod logging;
pub mod report;
pub mod resolver;
pub mod session;
pub mod string_array;

#[cfg(all(not(test), any(target_os = "macos", target_os = "linux")))]
pub mod posix;

#[cfg(all(not(test), any(target_os = "macos", target_os = "linux")))]
pub mod platform;

#[cfg(all(not(test), any(target_os = "macos", target_os = "linux")))]
pub mod variadic;

#[cfg(test)]
mod test_support;

pub use environment::{EnvKeys, EnvState};
pub use error::ShimError;

/// Where records are delivered: a directory, a socket path, or `unix:<path>`.
pub const ENV_OUTPUT: &CStr = c"INTERCEPT_BUILD_TARGET_DIR";

/// The loader variable that injects this library.
#[cfg(target_os = "macos")]
pub const ENV_PRELOAD: &CStr = c"DYLD_INSERT_LIBRARIES";
#[cfg(not(target_os = "macos"))]
pub const ENV_PRELOAD: &CStr = c"LD_PRELOAD";

#[cfg(target_os = "macos")]
pub const ENV_FLAT_NAMESPACE: Option<&CStr> = Some(c"DYLD_FORCE_FLAT_NAMESPACE");
#[cfg(not(target_os = "macos"))]
pub const ENV_FLAT_NAMESPACE: Option<&CStr> = None;

/// Enables stderr diagnostics; see [`logging`].
pub const ENV_LOG: &str = "AH_EXECTRACE_LOG";
