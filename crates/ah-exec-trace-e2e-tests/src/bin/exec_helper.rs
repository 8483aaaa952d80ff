// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Calls one process-creation function directly so the tests can observe
//! what the shim reports and propagates.
//!
//! Usage: exec_helper <mode> [<target> <args>...]
//!
//! For the exec and spawn modes the remaining arguments become the child's
//! argv, so the first one is both the program and `argv[0]`. The `execl*`
//! modes pass them as a C argument list, at most three after the target.

use std::ffi::{c_char, CString};
use std::io::{self, Write};

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

/// Environment handed to the `*-scrubbed` modes, without the shim variables.
const SCRUBBED_ENV: &[&str] = &["PATH=/usr/bin:/bin"];

const REPORTED_VARS: &[&str] = &[
    "INTERCEPT_BUILD_TARGET_DIR",
    "LD_PRELOAD",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_FORCE_FLAT_NAMESPACE",
];

struct CArray {
    _strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl CArray {
    fn new<S: AsRef<str>>(items: &[S]) -> Self {
        let strings: Vec<CString> = items
            .iter()
            .map(|item| {
                CString::new(item.as_ref()).unwrap_or_else(|_| fail("argument contains NUL"))
            })
            .collect();
        let mut pointers: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        pointers.push(std::ptr::null());
        Self {
            _strings: strings,
            pointers,
        }
    }

    fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }
}

fn fail(message: &str) -> ! {
    let _ = writeln!(io::stderr(), "exec_helper: {message}");
    std::process::exit(127);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        fail("usage: exec_helper <mode> [<target> <args>...]");
    }

    let mode = args[1].as_str();
    if mode == "env" {
        print_env();
        return;
    }

    let child = &args[2..];
    if child.is_empty() {
        fail("missing target");
    }
    let target = CString::new(child[0].as_str()).unwrap_or_else(|_| fail("target contains NUL"));
    let argv = CArray::new(child);
    let scrubbed = CArray::new(SCRUBBED_ENV);

    // SAFETY: every pointer array is NULL-terminated and outlives the call.
    unsafe {
        match mode {
            "execv" => {
                libc::execv(target.as_ptr(), argv.as_ptr());
            }
            "execvp" => {
                libc::execvp(target.as_ptr(), argv.as_ptr());
            }
            "execve-scrubbed" => {
                libc::execve(target.as_ptr(), argv.as_ptr(), scrubbed.as_ptr());
            }
            #[cfg(target_os = "linux")]
            "execvpe-scrubbed" => {
                libc::execvpe(target.as_ptr(), argv.as_ptr(), scrubbed.as_ptr());
            }
            "execl" => list_exec(ListExec::Execl, &target, &args[3..], &scrubbed),
            "execlp" => list_exec(ListExec::Execlp, &target, &args[3..], &scrubbed),
            "execle-scrubbed" => list_exec(ListExec::Execle, &target, &args[3..], &scrubbed),
            "posix-spawn-scrubbed" => spawn_and_wait(&target, &argv, &scrubbed, false),
            "posix-spawnp-scrubbed" => spawn_and_wait(&target, &argv, &scrubbed, true),
            other => fail(&format!("unknown mode {other}")),
        }
    }
    fail(&format!("{mode} failed: {}", io::Error::last_os_error()));
}

#[derive(Clone, Copy)]
enum ListExec {
    Execl,
    Execlp,
    Execle,
}

/// Call `execl`, `execlp` or `execle` with `target` as `argv[0]` followed by
/// `rest`. Only `execle` uses `envp`, which must follow the terminator.
unsafe fn list_exec(kind: ListExec, target: &CString, rest: &[String], envp: &CArray) {
    let rest: Vec<CString> = rest
        .iter()
        .map(|arg| CString::new(arg.as_str()).unwrap_or_else(|_| fail("argument contains NUL")))
        .collect();
    let a: Vec<*const c_char> = rest.iter().map(|arg| arg.as_ptr()).collect();
    let path = target.as_ptr();
    let null = std::ptr::null::<c_char>();
    let env = envp.as_ptr();
    match (kind, a.len()) {
        (ListExec::Execl, 0) => libc::execl(path, path, null),
        (ListExec::Execl, 1) => libc::execl(path, path, a[0], null),
        (ListExec::Execl, 2) => libc::execl(path, path, a[0], a[1], null),
        (ListExec::Execl, 3) => libc::execl(path, path, a[0], a[1], a[2], null),
        (ListExec::Execlp, 0) => libc::execlp(path, path, null),
        (ListExec::Execlp, 1) => libc::execlp(path, path, a[0], null),
        (ListExec::Execlp, 2) => libc::execlp(path, path, a[0], a[1], null),
        (ListExec::Execlp, 3) => libc::execlp(path, path, a[0], a[1], a[2], null),
        (ListExec::Execle, 0) => libc::execle(path, path, null, env),
        (ListExec::Execle, 1) => libc::execle(path, path, a[0], null, env),
        (ListExec::Execle, 2) => libc::execle(path, path, a[0], a[1], null, env),
        (ListExec::Execle, 3) => libc::execle(path, path, a[0], a[1], a[2], null, env),
        _ => fail("list exec modes take at most three arguments"),
    };
}

unsafe fn spawn_and_wait(target: &CString, argv: &CArray, envp: &CArray, search: bool) -> ! {
    let spawn = if search { libc::posix_spawnp } else { libc::posix_spawn };
    let mut pid: libc::pid_t = 0;
    let code = spawn(
        &mut pid,
        target.as_ptr(),
        std::ptr::null(),
        std::ptr::null(),
        argv.as_ptr() as *const *mut c_char,
        envp.as_ptr() as *const *mut c_char,
    );
    if code != 0 {
        fail(&format!("spawn failed: {}", io::Error::from_raw_os_error(code)));
    }
    match waitpid(Pid::from_raw(pid), None) {
        Ok(WaitStatus::Exited(_, status)) => std::process::exit(status),
        Ok(status) => fail(&format!("child ended with {status:?}")),
        Err(err) => fail(&format!("waitpid failed: {err}")),
    }
}

fn print_env() {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for key in REPORTED_VARS {
        let _ = match std::env::var(key) {
            Ok(value) => writeln!(out, "{key}={value}"),
            Err(_) => writeln!(out, "{key} is unset"),
        };
    }
}
