// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory stand-ins for the process environment, the reporter and the
//! real exec functions.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CStr, CString};
use std::io;

use ah_exec_trace_proto::{CallRecord, OwnedCallRecord};
use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use nix::errno::Errno;

use crate::environment::{EnvKeys, Environment};
use crate::error::ShimError;
use crate::report::Reporter;
use crate::resolver::RealExec;
use crate::string_array::StringArray;

pub const LINUX_KEYS: EnvKeys = EnvKeys {
    output: c"INTERCEPT_BUILD_TARGET_DIR",
    preload: c"LD_PRELOAD",
    flat: None,
};

pub const MACOS_KEYS: EnvKeys = EnvKeys {
    output: c"INTERCEPT_BUILD_TARGET_DIR",
    preload: c"DYLD_INSERT_LIBRARIES",
    flat: Some(c"DYLD_FORCE_FLAT_NAMESPACE"),
};

pub fn cstring_array(items: &[&str]) -> StringArray {
    items
        .iter()
        .map(|item| CString::new(*item).unwrap())
        .collect()
}

pub fn entries(array: &StringArray) -> Vec<String> {
    array
        .iter()
        .map(|entry| entry.to_string_lossy().into_owned())
        .collect()
}

/// # Safety
/// `array` must be NULL or a NULL-terminated array of C strings.
pub unsafe fn raw_entries(array: *const *const c_char) -> Vec<String> {
    entries(&StringArray::copy_from_raw(array).unwrap())
}

fn lossy(value: *const c_char) -> String {
    unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned()
}

#[derive(Default)]
pub struct MemoryEnvironment {
    vars: RefCell<Vec<(CString, CString)>>,
    table: RefCell<StringArray>,
}

impl MemoryEnvironment {
    pub fn with(vars: &[(&str, &str)]) -> Self {
        let env = Self::default();
        for (key, value) in vars {
            env.set(&CString::new(*key).unwrap(), &CString::new(*value).unwrap())
                .unwrap();
        }
        env
    }

    pub fn snapshot(&self) -> Vec<String> {
        entries(&self.table.borrow())
    }

    fn rebuild(&self) {
        let table = self
            .vars
            .borrow()
            .iter()
            .map(|(key, value)| {
                let mut entry = key.as_bytes().to_vec();
                entry.push(b'=');
                entry.extend_from_slice(value.as_bytes());
                CString::new(entry).unwrap()
            })
            .collect();
        *self.table.borrow_mut() = table;
    }
}

impl Environment for MemoryEnvironment {
    fn get(&self, key: &CStr) -> Option<CString> {
        self.vars
            .borrow()
            .iter()
            .find(|(name, _)| name.as_c_str() == key)
            .map(|(_, value)| value.clone())
    }

    fn set(&self, key: &CStr, value: &CStr) -> Result<(), ShimError> {
        {
            let mut vars = self.vars.borrow_mut();
            match vars.iter_mut().find(|(name, _)| name.as_c_str() == key) {
                Some((_, existing)) => *existing = value.to_owned(),
                None => vars.push((key.to_owned(), value.to_owned())),
            }
        }
        self.rebuild();
        Ok(())
    }

    fn unset(&self, key: &CStr) -> Result<(), ShimError> {
        self.vars
            .borrow_mut()
            .retain(|(name, _)| name.as_c_str() != key);
        self.rebuild();
        Ok(())
    }

    fn environ(&self) -> *const *const c_char {
        self.table.borrow().as_ptr()
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub fail: bool,
    pub records: RefCell<Vec<(String, OwnedCallRecord)>>,
}

impl RecordingReporter {
    pub fn functions(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .map(|(_, record)| record.function_lossy().into_owned())
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, destination: &CStr, record: &CallRecord<'_>) -> Result<(), ShimError> {
        if self.fail {
            return Err(ShimError::Transport {
                destination: destination.to_string_lossy().into_owned(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        self.records.borrow_mut().push((
            destination.to_string_lossy().into_owned(),
            record.clone().into_owned(),
        ));
        Ok(())
    }
}

/// A call that reached the real function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forwarded {
    pub function: &'static str,
    pub target: String,
    pub argv: Vec<String>,
    /// The explicit environment, for functions that take one.
    pub envp: Option<Vec<String>>,
    /// The ambient environment at the time of the call.
    pub ambient: Vec<String>,
}

/// Records forwarded calls; fails with `errno` when set.
#[derive(Default)]
pub struct FakeExec<'a> {
    pub ambient: Option<&'a MemoryEnvironment>,
    pub errno: Option<i32>,
    pub calls: RefCell<Vec<Forwarded>>,
}

impl FakeExec<'_> {
    unsafe fn record(
        &self,
        function: &'static str,
        target: *const c_char,
        argv: *const *const c_char,
        envp: Option<*const *const c_char>,
    ) {
        self.calls.borrow_mut().push(Forwarded {
            function,
            target: lossy(target),
            argv: raw_entries(argv),
            envp: envp.map(|envp| raw_entries(envp)),
            ambient: self
                .ambient
                .map(MemoryEnvironment::snapshot)
                .unwrap_or_default(),
        });
    }

    fn exec_result(&self) -> Result<c_int, ShimError> {
        match self.errno {
            Some(errno) => {
                Errno::set_raw(errno);
                Ok(-1)
            }
            None => Ok(0),
        }
    }

    fn spawn_result(&self) -> Result<c_int, ShimError> {
        Ok(self.errno.unwrap_or(0))
    }
}

impl RealExec for FakeExec<'_> {
    unsafe fn execve(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("execve", path, argv, Some(envp));
        self.exec_result()
    }

    unsafe fn execv(
        &self,
        path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("execv", path, argv, None);
        self.exec_result()
    }

    unsafe fn execvp(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("execvp", file, argv, None);
        self.exec_result()
    }

    unsafe fn execvpe(
        &self,
        file: *const c_char,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("execvpe", file, argv, Some(envp));
        self.exec_result()
    }

    unsafe fn execv_p(
        &self,
        file: *const c_char,
        _search_path: *const c_char,
        argv: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("execvP", file, argv, None);
        self.exec_result()
    }

    unsafe fn posix_spawn(
        &self,
        _pid: *mut pid_t,
        path: *const c_char,
        _file_actions: *const posix_spawn_file_actions_t,
        _attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("posix_spawn", path, argv, Some(envp));
        self.spawn_result()
    }

    unsafe fn posix_spawnp(
        &self,
        _pid: *mut pid_t,
        file: *const c_char,
        _file_actions: *const posix_spawn_file_actions_t,
        _attrp: *const posix_spawnattr_t,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> Result<c_int, ShimError> {
        self.record("posix_spawnp", file, argv, Some(envp));
        self.spawn_result()
    }
}
