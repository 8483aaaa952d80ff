// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capture, restore and propagation of the interception variables.

use std::ffi::{c_char, CStr, CString};
use std::io;

use crate::error::ShimError;
use crate::string_array::StringArray;

/// Names of the variables that keep interception alive across `exec`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvKeys {
    pub output: &'static CStr,
    pub preload: &'static CStr,
    /// Only present on platforms that need a flat namespace for interposition.
    pub flat: Option<&'static CStr>,
}

impl EnvKeys {
    pub const fn platform() -> Self {
        Self {
            output: crate::ENV_OUTPUT,
            preload: crate::ENV_PRELOAD,
            flat: crate::ENV_FLAT_NAMESPACE,
        }
    }
}

/// Access to a process environment.
pub trait Environment {
    fn get(&self, key: &CStr) -> Option<CString>;
    fn set(&self, key: &CStr, value: &CStr) -> Result<(), ShimError>;
    fn unset(&self, key: &CStr) -> Result<(), ShimError>;
    /// The current ambient `environ` table.
    fn environ(&self) -> *const *const c_char;
}

/// The real process environment, through libc.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibcEnvironment;

#[cfg(target_os = "linux")]
extern "C" {
    static environ: *const *const c_char;
}

#[cfg(target_os = "macos")]
extern "C" {
    fn _NSGetEnviron() -> *mut *const *const c_char;
}

fn environment_error(key: &CStr) -> ShimError {
    ShimError::Environment {
        key: key.to_string_lossy().into_owned(),
        source: io::Error::last_os_error(),
    }
}

impl Environment for LibcEnvironment {
    fn get(&self, key: &CStr) -> Option<CString> {
        // SAFETY: getenv returns NULL or a pointer into the live environment,
        // which is copied before any further mutation.
        unsafe {
            let value = libc::getenv(key.as_ptr());
            (!value.is_null()).then(|| CStr::from_ptr(value).to_owned())
        }
    }

    fn set(&self, key: &CStr, value: &CStr) -> Result<(), ShimError> {
        match unsafe { libc::setenv(key.as_ptr(), value.as_ptr(), 1) } {
            0 => Ok(()),
            _ => Err(environment_error(key)),
        }
    }

    fn unset(&self, key: &CStr) -> Result<(), ShimError> {
        match unsafe { libc::unsetenv(key.as_ptr()) } {
            0 => Ok(()),
            _ => Err(environment_error(key)),
        }
    }

    #[cfg(target_os = "linux")]
    fn environ(&self) -> *const *const c_char {
        unsafe { environ }
    }

    #[cfg(target_os = "macos")]
    fn environ(&self) -> *const *const c_char {
        unsafe { *_NSGetEnviron() }
    }
}

/// Snapshot of the interception variables. `None` means "not set".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvState {
    pub output: Option<CString>,
    pub preload: Option<CString>,
    pub flat: Option<CString>,
}

impl EnvState {
    pub fn capture(env: &impl Environment, keys: &EnvKeys) -> Self {
        Self {
            output: env.get(keys.output),
            preload: env.get(keys.preload),
            flat: keys.flat.and_then(|key| env.get(key)),
        }
    }

    /// True when every variable the platform requires is present.
    pub fn is_complete(&self, keys: &EnvKeys) -> bool {
        self.output.is_some()
            && self.preload.is_some()
            && (keys.flat.is_none() || self.flat.is_some())
    }

    /// Write the snapshot back into `env`: present values are set, absent
    /// ones are unset.
    pub fn restore(&self, env: &impl Environment, keys: &EnvKeys) -> Result<(), ShimError> {
        for (key, value) in self.entries(keys) {
            match value {
                Some(value) => env.set(key, value)?,
                None => env.unset(key)?,
            }
        }
        Ok(())
    }

    /// Drop every captured value. Safe to call repeatedly.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    /// Copy `envp` and force every captured variable into the copy.
    ///
    /// A NULL `envp` is treated as empty. Captured values that are absent
    /// are left alone.
    ///
    /// # Safety
    /// `envp` must be NULL or a NULL-terminated array of valid C strings.
    pub unsafe fn compute_updated(
        &self,
        envp: *const *const c_char,
        keys: &EnvKeys,
    ) -> Result<StringArray, ShimError> {
        let mut updated = StringArray::copy_from_raw(envp)?;
        for (key, value) in self.entries(keys) {
            if let Some(value) = value {
                update_environ(&mut updated, key, value)?;
            }
        }
        Ok(updated)
    }

    /// Keys paired with captured values, in propagation order.
    fn entries<'a>(&'a self, keys: &EnvKeys) -> Vec<(&'static CStr, Option<&'a CStr>)> {
        let mut entries = vec![
            (keys.preload, self.preload.as_deref()),
            (keys.output, self.output.as_deref()),
        ];
        if let Some(flat) = keys.flat {
            entries.push((flat, self.flat.as_deref()));
        }
        entries
    }
}

/// Set `key=value` in `envs`.
///
/// The first existing `key=` entry is overwritten in place (left untouched
/// when it already holds the value) and any later duplicates are dropped.
/// Without an existing entry the pair is appended.
pub fn update_environ(envs: &mut StringArray, key: &CStr, value: &CStr) -> Result<(), ShimError> {
    let key = key.to_bytes();
    let mut entry = Vec::new();
    entry
        .try_reserve(key.len() + 1 + value.to_bytes().len())
        .map_err(|_| ShimError::OutOfMemory)?;
    entry.extend_from_slice(key);
    entry.push(b'=');
    entry.extend_from_slice(value.to_bytes());
    let entry = CString::new(entry).map_err(|_| ShimError::InteriorNul)?;

    let matches: Vec<usize> = envs
        .iter()
        .enumerate()
        .filter(|(_, existing)| {
            let existing = existing.to_bytes();
            existing.len() > key.len() && existing.starts_with(key) && existing[key.len()] == b'='
        })
        .map(|(index, _)| index)
        .collect();

    match matches.split_first() {
        None => envs.append(entry)?,
        Some((&first, duplicates)) => {
            for &index in duplicates.iter().rev() {
                envs.remove(index);
            }
            if envs.get(first) != Some(entry.as_c_str()) {
                envs.replace(first, entry);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cstring_array, entries, MemoryEnvironment, LINUX_KEYS, MACOS_KEYS};

    fn complete_state() -> EnvState {
        EnvState {
            output: Some(c"/tmp/out".into()),
            preload: Some(c"/lib/libtrace.so".into()),
            flat: None,
        }
    }

    #[test]
    fn capture_reads_platform_variables() {
        let env = MemoryEnvironment::with(&[
            ("INTERCEPT_BUILD_TARGET_DIR", "/tmp/out"),
            ("LD_PRELOAD", "/lib/libtrace.so"),
            ("DYLD_FORCE_FLAT_NAMESPACE", "1"),
        ]);

        let state = EnvState::capture(&env, &LINUX_KEYS);
        assert_eq!(state, complete_state());
        assert!(state.is_complete(&LINUX_KEYS));
    }

    #[test]
    fn incomplete_when_any_required_variable_is_missing() {
        let env = MemoryEnvironment::with(&[("INTERCEPT_BUILD_TARGET_DIR", "/tmp/out")]);
        assert!(!EnvState::capture(&env, &LINUX_KEYS).is_complete(&LINUX_KEYS));

        let env = MemoryEnvironment::with(&[
            ("INTERCEPT_BUILD_TARGET_DIR", "/tmp/out"),
            ("DYLD_INSERT_LIBRARIES", "/lib/libtrace.dylib"),
        ]);
        assert!(!EnvState::capture(&env, &MACOS_KEYS).is_complete(&MACOS_KEYS));
    }

    #[test]
    fn restore_sets_present_and_unsets_absent_values() {
        let env = MemoryEnvironment::with(&[("LD_PRELOAD", "/other.so"), ("HOME", "/home/u")]);
        let state = EnvState {
            output: Some(c"/tmp/out".into()),
            preload: None,
            flat: None,
        };

        state.restore(&env, &LINUX_KEYS).unwrap();
        assert_eq!(
            env.get(c"INTERCEPT_BUILD_TARGET_DIR").as_deref(),
            Some(c"/tmp/out")
        );
        assert_eq!(env.get(c"LD_PRELOAD"), None);
        assert_eq!(env.get(c"HOME").as_deref(), Some(c"/home/u"));
    }

    #[test]
    fn release_is_idempotent() {
        let mut state = complete_state();
        state.release();
        state.release();
        assert_eq!(state, EnvState::default());
    }

    #[test]
    fn compute_updated_appends_missing_variables_in_order() {
        let envp = cstring_array(&["PATH=/usr/bin"]);
        let updated =
            unsafe { complete_state().compute_updated(envp.as_ptr(), &LINUX_KEYS) }.unwrap();

        assert_eq!(
            entries(&updated),
            [
                "PATH=/usr/bin",
                "LD_PRELOAD=/lib/libtrace.so",
                "INTERCEPT_BUILD_TARGET_DIR=/tmp/out",
            ]
        );
        assert_eq!(entries(&envp), ["PATH=/usr/bin"]);
    }

    #[test]
    fn compute_updated_treats_null_envp_as_empty() {
        let updated =
            unsafe { complete_state().compute_updated(std::ptr::null(), &LINUX_KEYS) }.unwrap();
        assert_eq!(
            entries(&updated),
            [
                "LD_PRELOAD=/lib/libtrace.so",
                "INTERCEPT_BUILD_TARGET_DIR=/tmp/out",
            ]
        );
    }

    #[test]
    fn compute_updated_skips_absent_optional_values() {
        let state = EnvState {
            flat: None,
            ..complete_state()
        };
        let updated = unsafe { state.compute_updated(std::ptr::null(), &MACOS_KEYS) }.unwrap();
        let flat = |entry: &String| entry.starts_with("DYLD_FORCE_FLAT_NAMESPACE");
        assert!(!entries(&updated).iter().any(flat));
    }

    #[test]
    #[serial_test::serial]
    fn libc_environment_round_trip() {
        let env = LibcEnvironment;
        let key = c"AH_EXEC_TRACE_SHIM_TEST_VAR";

        env.set(key, c"first").unwrap();
        assert_eq!(env.get(key).as_deref(), Some(c"first"));
        let ambient = unsafe { crate::test_support::raw_entries(env.environ()) };
        assert!(ambient.contains(&"AH_EXEC_TRACE_SHIM_TEST_VAR=first".to_string()));

        env.unset(key).unwrap();
        assert_eq!(env.get(key), None);
    }

    #[test]
    #[serial_test::serial]
    fn libc_environment_rejects_invalid_names() {
        let err = LibcEnvironment.set(c"BROKEN=NAME", c"x").unwrap_err();
        assert!(matches!(err, ShimError::Environment { ref key, .. } if key == "BROKEN=NAME"));
    }

    #[test]
    fn update_overwrites_first_match_and_drops_duplicates() {
        let mut envs = cstring_array(&["LD_PRELOAD=/old.so", "PATH=/bin", "LD_PRELOAD=/older.so"]);
        update_environ(&mut envs, c"LD_PRELOAD", c"/new.so").unwrap();
        assert_eq!(entries(&envs), ["LD_PRELOAD=/new.so", "PATH=/bin"]);
    }

    #[test]
    fn update_matches_whole_key_only() {
        let mut envs = cstring_array(&["LD_PRELOAD_PATH=/x", "LD_PRELOADX=1", "LD_PRELOAD"]);
        update_environ(&mut envs, c"LD_PRELOAD", c"/new.so").unwrap();
        assert_eq!(
            entries(&envs),
            [
                "LD_PRELOAD_PATH=/x",
                "LD_PRELOADX=1",
                "LD_PRELOAD",
                "LD_PRELOAD=/new.so",
            ]
        );
    }

    #[test]
    fn update_keeps_matching_entry_and_handles_empty_value() {
        let mut envs = cstring_array(&["KEY=value"]);
        update_environ(&mut envs, c"KEY", c"value").unwrap();
        assert_eq!(entries(&envs), ["KEY=value"]);

        let mut envs = cstring_array(&["KEY="]);
        update_environ(&mut envs, c"KEY", c"set").unwrap();
        assert_eq!(entries(&envs), ["KEY=set"]);
    }
}
