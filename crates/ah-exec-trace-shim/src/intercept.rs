// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The interception procedure shared by every exported hook.
//!
//! When the library is active each call is reported (subject to the
//! [`ReportGuard`]) and forwarded with the interception variables forced into
//! the environment the new image will see. Functions with an explicit `envp`
//! receive an updated copy; `execvp`-style functions that read the ambient
//! environment get the captured values set around the real call and the
//! previous values restored afterwards. When inactive, calls pass straight
//! through.

use std::ffi::{c_char, c_int};

use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use nix::errno::Errno;

use crate::environment::{EnvKeys, EnvState, Environment};
use crate::error::ShimError;
use crate::guard::ReportGuard;
use crate::report::{current_record, Reporter};
use crate::resolver::RealExec;
use crate::string_array::StringArray;

/// Run `cleanup` without disturbing the `errno` left by the forwarded call.
fn preserving_errno<T>(cleanup: impl FnOnce() -> T) -> T {
    let saved = Errno::last_raw();
    let value = cleanup();
    Errno::set_raw(saved);
    value
}

pub struct Interceptor<'a, R, P, E> {
    state: Option<&'a EnvState>,
    keys: EnvKeys,
    real: &'a R,
    reporter: &'a P,
    env: &'a E,
    guard: &'a ReportGuard,
}

impl<'a, R, P, E> Interceptor<'a, R, P, E>
where
    R: RealExec,
    P: Reporter,
    E: Environment,
{
    pub fn new(
        state: Option<&'a EnvState>,
        keys: EnvKeys,
        real: &'a R,
        reporter: &'a P,
        env: &'a E,
        guard: &'a ReportGuard,
    ) -> Self {
        Self {
            state,
            keys,
            real,
            reporter,
            env,
            guard,
        }
    }

    /// # Safety
    /// Arguments must satisfy the contract of `execve(2)`.
    pub unsafe fn execve(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.execve(path, argv, envp);
        };
        self.with_updated_env(state, "execve", argv, envp, |envp| {
            self.real.execve(path, argv, envp)
        })
    }

    /// Forwarded to the real `execve` with the updated ambient environment.
    ///
    /// # Safety
    /// Arguments must satisfy the contract of `execv(3)`.
    pub unsafe fn execv(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.execv(path, argv);
        };
        self.with_updated_env(state, "execv", argv, self.env.environ(), |envp| {
            self.real.execve(path, argv, envp)
        })
    }

    /// # Safety
    /// Arguments must satisfy the contract of `execvpe(3)`.
    pub unsafe fn execvpe(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.execvpe(file, argv, envp);
        };
        self.with_updated_env(state, "execvpe", argv, envp, |envp| {
            self.real.execvpe(file, argv, envp)
        })
    }

    /// # Safety
    /// Arguments must satisfy the contract of `execvp(3)`.
    pub unsafe fn execvp(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.execvp(file, argv);
        };
        self.with_ambient_env(state, "execvp", argv, || self.real.execvp(file, argv))
    }

    /// # Safety
    /// Arguments must satisfy the contract of `execvP(3)`.
    pub unsafe fn execv_p(
        &self,
        file: *const c_char,
        search_path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.execv_p(file, search_path, argv);
        };
        self.with_ambient_env(state, "execvP", argv, || {
            self.real.execv_p(file, search_path, argv)
        })
    }

    /// # Safety
    /// Arguments must satisfy the contract of `posix_spawn(3)`.
    pub unsafe fn posix_spawn(
        &self,
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.posix_spawn(pid, path, file_actions, attrp, argv, envp);
        };
        self.with_updated_env(state, "posix_spawn", argv, envp, |envp| {
            self.real.posix_spawn(pid, path, file_actions, attrp, argv, envp)
        })
    }

    /// # Safety
    /// Arguments must satisfy the contract of `posix_spawnp(3)`.
    pub unsafe fn posix_spawnp(
        &self,
        pid: *mut pid_t,
        file: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        let Some(state) = self.state else {
            return self.real.posix_spawnp(pid, file, file_actions, attrp, argv, envp);
        };
        self.with_updated_env(state, "posix_spawnp", argv, envp, |envp| {
            self.real.posix_spawnp(pid, file, file_actions, attrp, argv, envp)
        })
    }

    /// `execl` with its variadic arguments already split into `arg` and the
    /// remaining pointers up to the terminating NULL.
    ///
    /// # Safety
    /// Arguments must satisfy the contract of `execl(3)`.
    pub unsafe fn execl<I>(
        &self,
        path: *const c_char,
        arg: *const c_char,
        rest: I,
    ) -> Result<c_int, ShimError>
    where
        I: IntoIterator<Item = *const c_char>,
    {
        with_collected_argv(arg, rest, |argv| {
            let Some(state) = self.state else {
                return self.real.execv(path, argv);
            };
            let envp = self.env.environ();
            self.with_updated_env(state, "execl", argv, envp, |envp| {
                self.real.execve(path, argv, envp)
            })
        })
    }

    /// # Safety
    /// Arguments must satisfy the contract of `execlp(3)`.
    pub unsafe fn execlp<I>(
        &self,
        file: *const c_char,
        arg: *const c_char,
        rest: I,
    ) -> Result<c_int, ShimError>
    where
        I: IntoIterator<Item = *const c_char>,
    {
        with_collected_argv(arg, rest, |argv| {
            let Some(state) = self.state else {
                return self.real.execvp(file, argv);
            };
            self.with_ambient_env(state, "execlp", argv, || self.real.execvp(file, argv))
        })
    }

    /// `execle` with the trailing `envp` already read past the argument
    /// terminator.
    ///
    /// # Safety
    /// Arguments must satisfy the contract of `execle(3)`.
    pub unsafe fn execle<I>(
        &self,
        path: *const c_char,
        arg: *const c_char,
        rest: I,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError>
    where
        I: IntoIterator<Item = *const c_char>,
    {
        with_collected_argv(arg, rest, |argv| {
            let Some(state) = self.state else {
                return self.real.execve(path, argv, envp);
            };
            self.with_updated_env(state, "execle", argv, envp, |envp| {
                self.real.execve(path, argv, envp)
            })
        })
    }

    /// Report, then forward with a copy of `envp` carrying the captured values.
    unsafe fn with_updated_env<F>(
        &self,
        state: &EnvState,
        function: &'static str,
        argv: *const *const c_char,
        envp: *const *const c_char,
        forward: F,
    ) -> Result<c_int, ShimError>
    where
        F: FnOnce(*const *const c_char) -> Result<c_int, ShimError>,
    {
        self.reported(state, function, argv, || {
            let updated = state.compute_updated(envp, &self.keys)?;
            let result = forward(updated.as_ptr());
            preserving_errno(|| drop(updated));
            result
        })
    }

    /// Report, then forward with the captured values set in the ambient
    /// environment, restoring whatever was there before on return.
    unsafe fn with_ambient_env<F>(
        &self,
        state: &EnvState,
        function: &'static str,
        argv: *const *const c_char,
        forward: F,
    ) -> Result<c_int, ShimError>
    where
        F: FnOnce() -> Result<c_int, ShimError>,
    {
        self.reported(state, function, argv, || {
            let previous = EnvState::capture(self.env, &self.keys);
            state.restore(self.env, &self.keys)?;
            let result = forward();
            preserving_errno(|| previous.restore(self.env, &self.keys))?;
            result
        })
    }

    unsafe fn reported<F>(
        &self,
        state: &EnvState,
        function: &'static str,
        argv: *const *const c_char,
        forward: F,
    ) -> Result<c_int, ShimError>
    where
        F: FnOnce() -> Result<c_int, ShimError>,
    {
        let entry = self.guard.begin();
        if entry.should_report() {
            if let Some(destination) = state.output.as_deref() {
                let delivered = current_record(function, argv)
                    .and_then(|record| self.reporter.report(destination, &record));
                if let Err(err) = delivered {
                    self.guard.end(entry);
                    return Err(err);
                }
            }
        }
        let result = forward();
        self.guard.end(entry);
        result
    }
}

unsafe fn with_collected_argv<I, F>(
    arg: *const c_char,
    rest: I,
    forward: F,
) -> Result<c_int, ShimError>
where
    I: IntoIterator<Item = *const c_char>,
    F: FnOnce(*const *const c_char) -> Result<c_int, ShimError>,
{
    let argv = StringArray::build_from_variadic(arg, rest)?;
    let result = forward(argv.as_ptr());
    preserving_errno(|| drop(argv));
    result
}
