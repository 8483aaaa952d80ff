// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hooks shared by every POSIX platform.
//!
//! Each exported symbol builds an [`Interceptor`] over the real C library and
//! the process-wide state, and terminates the process if interception fails.

#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int};

use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};

use crate::environment::{EnvKeys, LibcEnvironment};
use crate::error::fatal;
use crate::guard::ReportGuard;
use crate::intercept::Interceptor;
use crate::report::TransportReporter;
use crate::resolver::NextSymbol;
use crate::session;

static GUARD: ReportGuard = ReportGuard::platform();

type HookInterceptor = Interceptor<'static, NextSymbol, TransportReporter, LibcEnvironment>;

pub(crate) fn interceptor() -> HookInterceptor {
    Interceptor::new(
        session::current(),
        EnvKeys::platform(),
        &NextSymbol,
        &TransportReporter,
        &LibcEnvironment,
        &GUARD,
    )
}

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    interceptor()
        .execve(path, argv, envp)
        .unwrap_or_else(|err| fatal("execve", err))
}

#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    interceptor()
        .execv(path, argv)
        .unwrap_or_else(|err| fatal("execv", err))
}

#[no_mangle]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    interceptor()
        .execvp(file, argv)
        .unwrap_or_else(|err| fatal("execvp", err))
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    interceptor()
        .posix_spawn(pid, path, file_actions, attrp, argv, envp)
        .unwrap_or_else(|err| fatal("posix_spawn", err))
}

#[no_mangle]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    interceptor()
        .posix_spawnp(pid, file, file_actions, attrp, argv, envp)
        .unwrap_or_else(|err| fatal("posix_spawnp", err))
}
