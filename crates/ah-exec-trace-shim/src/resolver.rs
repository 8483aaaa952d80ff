// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lookup of the next definition of an intercepted symbol.

use std::ffi::{c_char, c_int, c_void, CStr};

use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};

use crate::error::ShimError;

pub type ExecveFn =
    unsafe extern "C" fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int;
pub type ExecvFn = unsafe extern "C" fn(*const c_char, *const *const c_char) -> c_int;
pub type ExecvPFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const *const c_char) -> c_int;
pub type PosixSpawnFn = unsafe extern "C" fn(
    *mut pid_t,
    *const c_char,
    *const posix_spawn_file_actions_t,
    *const posix_spawnattr_t,
    *const *const c_char,
    *const *const c_char,
) -> c_int;

/// Resolve the definition of `symbol` that follows this library in lookup order.
///
/// # Safety
/// The caller must cast the pointer to the symbol's real signature.
pub unsafe fn dlsym_next(symbol: &CStr) -> Result<*mut c_void, ShimError> {
    let pointer = libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr());
    if pointer.is_null() {
        return Err(ShimError::Resolve {
            symbol: symbol.to_string_lossy().into_owned(),
        });
    }
    Ok(pointer)
}

macro_rules! resolve {
    ($name:literal as $ty:ty) => {
        dlsym_next($name).map(|pointer| std::mem::transmute::<*mut c_void, $ty>(pointer))
    };
}

/// The real process-creation functions the interceptor forwards to.
///
/// # Safety
/// Implementations receive the raw pointers of the intercepted call and
/// must treat them exactly as the C library would.
pub trait RealExec {
    unsafe fn execve(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError>;

    unsafe fn execv(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError>;

    unsafe fn execvp(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError>;

    unsafe fn execvpe(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError>;

    unsafe fn execv_p(
        &self,
        file: *const c_char,
        search_path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError>;

    unsafe fn posix_spawn(
        &self,
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError>;

    unsafe fn posix_spawnp(
        &self,
        pid: *mut pid_t,
        file: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError>;
}

/// Forwards to the next definition found by `dlsym(RTLD_NEXT, ..)`.
///
/// Symbols are resolved on every call and never cached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NextSymbol;

impl RealExec for NextSymbol {
    unsafe fn execve(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"execve" as ExecveFn)?;
        Ok(real(path, argv, envp))
    }

    unsafe fn execv(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"execv" as ExecvFn)?;
        Ok(real(path, argv))
    }

    unsafe fn execvp(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"execvp" as ExecvFn)?;
        Ok(real(file, argv))
    }

    unsafe fn execvpe(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"execvpe" as ExecveFn)?;
        Ok(real(file, argv, envp))
    }

    unsafe fn execv_p(
        &self,
        file: *const c_char,
        search_path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"execvP" as ExecvPFn)?;
        Ok(real(file, search_path, argv))
    }

    unsafe fn posix_spawn(
        &self,
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"posix_spawn" as PosixSpawnFn)?;
        Ok(real(pid, path, file_actions, attrp, argv, envp))
    }

    unsafe fn posix_spawnp(
        &self,
        pid: *mut pid_t,
        file: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let real = resolve!(c"posix_spawnp" as PosixSpawnFn)?;
        Ok(real(pid, file, file_actions, attrp, argv, envp))
    }
}
