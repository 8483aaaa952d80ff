// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::atomic::{AtomicBool, Ordering};

/// Suppresses duplicate reports when one intercepted call reaches another
/// inside the C library (`execvp` implemented on top of `execve`, for example).
///
/// A disabled guard reports every call.
#[derive(Debug)]
pub struct ReportGuard {
    enabled: bool,
    reported: AtomicBool,
}

/// Token returned by [`ReportGuard::begin`]; hand it back to [`ReportGuard::end`].
#[must_use]
#[derive(Debug)]
pub struct GuardEntry {
    already_reported: bool,
}

impl GuardEntry {
    pub fn should_report(&self) -> bool {
        !self.already_reported
    }
}

impl ReportGuard {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            reported: AtomicBool::new(false),
        }
    }

    /// Enabled where the C library's exec family calls back into itself.
    pub const fn platform() -> Self {
        Self::new(cfg!(target_os = "macos"))
    }

    pub fn begin(&self) -> GuardEntry {
        if !self.enabled {
            return GuardEntry {
                already_reported: false,
            };
        }
        GuardEntry {
            already_reported: self.reported.swap(true, Ordering::AcqRel),
        }
    }

    /// Only the outermost entry clears the flag.
    pub fn end(&self, entry: GuardEntry) {
        if self.enabled && !entry.already_reported {
            self.reported.store(false, Ordering::Release);
        }
    }
}
