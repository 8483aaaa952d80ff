// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hooks for the list-form exec functions.
//!
//! `execl`, `execlp` and `execle` take their arguments as C varargs. The
//! exported symbols are naked functions that jump straight into the C
//! collectors in `variadic.c`, which gather the argument pointers on the
//! stack and call back into the `ah_exec_trace_*` entry points below.

#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int};

use crate::error::fatal;
use crate::posix::interceptor;
use crate::string_array::StringArray;

extern "C" {
    fn ah_exec_trace_collect_execl(path: *const c_char, arg: *const c_char, ...) -> c_int;
    fn ah_exec_trace_collect_execlp(file: *const c_char, arg: *const c_char, ...) -> c_int;
    fn ah_exec_trace_collect_execle(path: *const c_char, arg: *const c_char, ...) -> c_int;
}

#[cfg(target_arch = "x86_64")]
macro_rules! tail_jump {
    ($target:ident) => {
        core::arch::naked_asm!("jmp {}", sym $target)
    };
}

#[cfg(target_arch = "aarch64")]
macro_rules! tail_jump {
    ($target:ident) => {
        core::arch::naked_asm!("b {}", sym $target)
    };
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn execl(path: *const c_char, arg: *const c_char) -> c_int {
    tail_jump!(ah_exec_trace_collect_execl)
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn execlp(file: *const c_char, arg: *const c_char) -> c_int {
    tail_jump!(ah_exec_trace_collect_execlp)
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn execle(path: *const c_char, arg: *const c_char) -> c_int {
    tail_jump!(ah_exec_trace_collect_execle)
}

#[no_mangle]
pub unsafe extern "C" fn ah_exec_trace_execl(
    path: *const c_char,
    arg: *const c_char,
    rest: *const *const c_char,
) -> c_int {
    interceptor()
        .execl(path, arg, StringArray::raw_entries(rest))
        .unwrap_or_else(|err| fatal("execl", err))
}

#[no_mangle]
pub unsafe extern "C" fn ah_exec_trace_execlp(
    file: *const c_char,
    arg: *const c_char,
    rest: *const *const c_char,
) -> c_int {
    interceptor()
        .execlp(file, arg, StringArray::raw_entries(rest))
        .unwrap_or_else(|err| fatal("execlp", err))
}

#[no_mangle]
pub unsafe extern "C" fn ah_exec_trace_execle(
    path: *const c_char,
    arg: *const c_char,
    rest: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    interceptor()
        .execle(path, arg, StringArray::raw_entries(rest), envp)
        .unwrap_or_else(|err| fatal("execle", err))
}
