// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The call record reported for each intercepted exec-family call

use std::borrow::Cow;

/// One intercepted process-creation call.
///
/// Byte fields are borrowed when encoding (the shim hands over the host's
/// argv without copying) and owned after decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord<'a> {
    /// Process id of the caller
    pub pid: i32,
    /// Parent process id of the caller
    pub ppid: i32,
    /// Name of the hook that fired (`execve`, `posix_spawnp`, ...)
    pub function: Cow<'a, [u8]>,
    /// Working directory at report time
    pub cwd: Cow<'a, [u8]>,
    /// The argument vector exactly as the host passed it
    pub argv: Vec<Cow<'a, [u8]>>,
}

/// A record that owns all of its data, as produced by the decoders.
pub type OwnedCallRecord = CallRecord<'static>;

impl<'a> CallRecord<'a> {
    pub fn new(
        pid: i32,
        ppid: i32,
        function: impl Into<Cow<'a, [u8]>>,
        cwd: impl Into<Cow<'a, [u8]>>,
        argv: Vec<Cow<'a, [u8]>>,
    ) -> Self {
        Self {
            pid,
            ppid,
            function: function.into(),
            cwd: cwd.into(),
            argv,
        }
    }

    /// Detach the record from any borrowed data.
    pub fn into_owned(self) -> OwnedCallRecord {
        CallRecord {
            pid: self.pid,
            ppid: self.ppid,
            function: Cow::Owned(self.function.into_owned()),
            cwd: Cow::Owned(self.cwd.into_owned()),
            argv: self
                .argv
                .into_iter()
                .map(|arg| Cow::Owned(arg.into_owned()))
                .collect(),
        }
    }

    /// Lossy UTF-8 view of the function name, for logging and assertions.
    pub fn function_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.function)
    }

    /// Lossy UTF-8 view of the argument vector.
    pub fn argv_lossy(&self) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect()
    }
}
