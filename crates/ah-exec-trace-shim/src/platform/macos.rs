// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! macOS: injected through DYLD_INSERT_LIBRARIES with a flat namespace

#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int};

use ctor::{ctor, dtor};

use crate::error::fatal;
use crate::posix::interceptor;
use crate::session;

#[ctor]
fn load_shim() {
    session::on_load();
}

#[dtor]
fn unload_shim() {
    session::on_unload();
}

#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn execvP(
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    interceptor()
        .execv_p(file, search_path, argv)
        .unwrap_or_else(|err| fatal("execvP", err))
}

/// `vfork` children share the parent's memory, so the hooks cannot run
/// safely in them. Every `vfork` becomes a `fork`.
#[no_mangle]
pub extern "C" fn vfork() -> libc::pid_t {
    unsafe { libc::fork() }
}
