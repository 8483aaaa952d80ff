// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The process-wide interception state.
//!
//! The state is captured once when the library is loaded and released when it
//! is unloaded. While no state is installed every hook passes through. A hook
//! still running on another thread when the library unloads may observe a
//! released state; unloading a preloaded library is not expected while
//! threads are exec'ing.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::debug;

use crate::environment::{EnvKeys, EnvState, Environment, LibcEnvironment};
use crate::logging;

static ACTIVE: AtomicPtr<EnvState> = AtomicPtr::new(ptr::null_mut());

/// Library constructor body.
pub fn on_load() {
    logging::init();
    activate(&LibcEnvironment, &EnvKeys::platform());
}

/// Library destructor body.
pub fn on_unload() {
    deactivate();
}

/// Capture the interception variables from `env` and install them.
///
/// Returns `false`, leaving the library inactive, when a required variable
/// is missing.
pub fn activate(env: &impl Environment, keys: &EnvKeys) -> bool {
    let state = EnvState::capture(env, keys);
    if !state.is_complete(keys) {
        debug!(?state, "interception variables incomplete, passing calls through");
        return false;
    }
    debug!(?state, "interception active");
    let previous = ACTIVE.swap(Box::into_raw(Box::new(state)), Ordering::AcqRel);
    release(previous);
    true
}

pub fn deactivate() {
    release(ACTIVE.swap(ptr::null_mut(), Ordering::AcqRel));
}

/// The installed state, if the library is active.
pub fn current() -> Option<&'static EnvState> {
    // SAFETY: the pointer comes from Box::into_raw and is only freed by
    // activate/deactivate, which run from the loader's constructor and
    // destructor.
    unsafe { ACTIVE.load(Ordering::Acquire).as_ref() }
}

fn release(state: *mut EnvState) {
    if !state.is_null() {
        // SAFETY: produced by Box::into_raw in activate and swapped out of
        // ACTIVE, so this is the only owner.
        let mut state = unsafe { Box::from_raw(state) };
        state.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryEnvironment, LINUX_KEYS};
    use serial_test::serial;

    #[test]
    #[serial]
    fn activation_requires_every_variable() {
        deactivate();
        let env = MemoryEnvironment::with(&[("LD_PRELOAD", "/lib/libah_exec_trace_shim.so")]);
        assert!(!activate(&env, &LINUX_KEYS));
        assert!(current().is_none());
    }

    #[test]
    #[serial]
    fn activate_then_deactivate() {
        let env = MemoryEnvironment::with(&[
            ("LD_PRELOAD", "/lib/libah_exec_trace_shim.so"),
            ("INTERCEPT_BUILD_TARGET_DIR", "/tmp/reports"),
        ]);
        assert!(activate(&env, &LINUX_KEYS));
        let state = current().unwrap();
        assert_eq!(state.output.as_deref(), Some(c"/tmp/reports"));
        assert_eq!(
            state.preload.as_deref(),
            Some(c"/lib/libah_exec_trace_shim.so")
        );

        deactivate();
        assert!(current().is_none());
        deactivate();
        assert!(current().is_none());
    }
}
