// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exec trace protocol: call records and their wire encodings
//!
//! This crate defines the record produced for every intercepted exec-family
//! call and the two encodings understood by the collector:
//!
//! - [`file_drop`]: one delimited record per file, dropped into a directory
//! - [`stream`]: one length-prefixed binary record per Unix socket connection
//!
//! Both encodings are byte-compatible with the `intercept-build` collector.

pub mod file_drop;
pub mod record;
pub mod stream;

pub use record::{CallRecord, OwnedCallRecord};

use thiserror::Error;

/// Errors produced while decoding a report payload.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("record is missing the {0} field")]
    MissingField(&'static str),

    #[error("invalid process id {0:?}")]
    InvalidPid(String),

    #[error("{0} unexpected bytes after the record")]
    TrailingBytes(usize),
}
