// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Linux: injected through LD_PRELOAD

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
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    interceptor()
        .execvpe(file, argv, envp)
        .unwrap_or_else(|err| fatal("execvpe", err))
}
