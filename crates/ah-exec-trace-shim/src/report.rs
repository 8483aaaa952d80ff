// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Delivery of call records to the collector.
//!
//! The destination is the value of the output variable. A `unix:` prefix, or
//! a path naming an existing socket, selects the stream transport; anything
//! else is a directory that receives one `exec-XXXXXX.cmd` file per call.
//! Reporting only uses calls this library does not intercept.

use std::borrow::Cow;
use std::ffi::{c_char, CStr, OsStr};
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use ah_exec_trace_proto::{file_drop, stream, CallRecord};
use nix::unistd::{getpid, getppid};

use crate::error::ShimError;

pub const SOCKET_SCHEME: &[u8] = b"unix:";
pub const FILE_PREFIX: &str = "exec-";

/// Sink for records of intercepted calls.
pub trait Reporter {
    fn report(&self, destination: &CStr, record: &CallRecord<'_>) -> Result<(), ShimError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Directory(PathBuf),
    Socket(PathBuf),
}

impl Destination {
    pub fn classify(output: &CStr) -> Self {
        let bytes = output.to_bytes();
        if let Some(socket) = bytes.strip_prefix(SOCKET_SCHEME) {
            return Self::Socket(PathBuf::from(OsStr::from_bytes(socket)));
        }
        let path = PathBuf::from(OsStr::from_bytes(bytes));
        match fs::metadata(&path) {
            Ok(metadata) if metadata.file_type().is_socket() => Self::Socket(path),
            _ => Self::Directory(path),
        }
    }

    pub fn send(&self, record: &CallRecord<'_>) -> Result<(), ShimError> {
        let delivered = match self {
            Self::Directory(dir) => write_report_file(dir, record),
            Self::Socket(path) => stream_report(path, record),
        };
        delivered.map_err(|source| ShimError::Transport {
            destination: self.to_string(),
            source,
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(dir) => write!(f, "directory {}", dir.display()),
            Self::Socket(path) => write!(f, "socket {}", path.display()),
        }
    }
}

/// Write `record` to a fresh, uniquely named file inside `dir`.
fn write_report_file(dir: &Path, record: &CallRecord<'_>) -> io::Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix(FILE_PREFIX)
        .suffix(file_drop::FILE_SUFFIX)
        .rand_bytes(6)
        .tempfile_in(dir)?;
    file_drop::encode(record, file.as_file_mut())?;
    file.keep()?;
    Ok(())
}

/// Send `record` over a single connection to the collector socket.
fn stream_report(path: &Path, record: &CallRecord<'_>) -> io::Result<()> {
    let mut connection = UnixStream::connect(path)?;
    stream::encode(record, &mut connection)
}

/// Reporter used by the exported hooks.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportReporter;

impl Reporter for TransportReporter {
    fn report(&self, destination: &CStr, record: &CallRecord<'_>) -> Result<(), ShimError> {
        let destination = Destination::classify(destination);
        tracing::debug!(function = %record.function_lossy(), %destination, "reporting call");
        destination.send(record)
    }
}

/// Describe the current process calling `function` with `argv`.
///
/// # Safety
/// `argv` must be NULL or a NULL-terminated array of C strings that outlive
/// the returned record.
pub unsafe fn current_record<'a>(
    function: &'static str,
    argv: *const *const c_char,
) -> Result<CallRecord<'a>, ShimError> {
    let cwd = std::env::current_dir()
        .map_err(ShimError::WorkingDirectory)?
        .into_os_string()
        .into_vec();

    let len = crate::string_array::StringArray::raw_len(argv);
    let mut args = Vec::new();
    args.try_reserve(len).map_err(|_| ShimError::OutOfMemory)?;
    for index in 0..len {
        args.push(Cow::Borrowed(CStr::from_ptr(*argv.add(index)).to_bytes()));
    }

    Ok(CallRecord::new(
        getpid().as_raw(),
        getppid().as_raw(),
        function.as_bytes(),
        cwd,
        args,
    ))
}
