// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File-drop encoding
//!
//! Every field is terminated by a separator byte: `pid`, `ppid`, function
//! name and working directory by Record Separator (0x1E), each argument by
//! Unit Separator (0x1F). Numbers are written in decimal. The shim writes one
//! record per file; compiler wrappers may append several records to one file,
//! each closed by Group Separator (0x1D), which the decoder also accepts.

use crate::{CallRecord, DecodeError, OwnedCallRecord};
use std::borrow::Cow;
use std::io::{self, Write};

/// Closes a record when several records share one file.
pub const GROUP_SEPARATOR: u8 = 0x1d;
/// Terminates each scalar field.
pub const RECORD_SEPARATOR: u8 = 0x1e;
/// Terminates each argument.
pub const UNIT_SEPARATOR: u8 = 0x1f;

/// Suffix of the report files the collector picks up.
pub const FILE_SUFFIX: &str = ".cmd";

/// Serialize `record` into a byte buffer.
pub fn to_bytes(record: &CallRecord<'_>) -> Vec<u8> {
    let args_len: usize = record.argv.iter().map(|arg| arg.len() + 1).sum();
    let mut buf = Vec::with_capacity(32 + record.function.len() + record.cwd.len() + args_len);

    buf.extend_from_slice(record.pid.to_string().as_bytes());
    buf.push(RECORD_SEPARATOR);
    buf.extend_from_slice(record.ppid.to_string().as_bytes());
    buf.push(RECORD_SEPARATOR);
    buf.extend_from_slice(&record.function);
    buf.push(RECORD_SEPARATOR);
    buf.extend_from_slice(&record.cwd);
    buf.push(RECORD_SEPARATOR);
    for arg in &record.argv {
        buf.extend_from_slice(arg);
        buf.push(UNIT_SEPARATOR);
    }
    buf
}

/// Write `record` to `writer` in one `write_all` call.
pub fn encode<W: Write>(record: &CallRecord<'_>, writer: &mut W) -> io::Result<()> {
    writer.write_all(&to_bytes(record))?;
    writer.flush()
}

/// Decode every record found in the content of one report file.
pub fn decode(content: &[u8]) -> Result<Vec<OwnedCallRecord>, DecodeError> {
    content
        .split(|b| *b == GROUP_SEPARATOR)
        .filter(|group| !group.is_empty())
        .map(decode_group)
        .collect()
}

fn decode_group(group: &[u8]) -> Result<OwnedCallRecord, DecodeError> {
    let mut fields = group.splitn(5, |b| *b == RECORD_SEPARATOR);

    let pid = parse_pid(fields.next().ok_or(DecodeError::MissingField("pid"))?)?;
    let ppid = parse_pid(fields.next().ok_or(DecodeError::MissingField("ppid"))?)?;
    let function = fields.next().ok_or(DecodeError::MissingField("function"))?;
    let cwd = fields.next().ok_or(DecodeError::MissingField("cwd"))?;
    let args = fields.next().ok_or(DecodeError::MissingField("argv"))?;

    // Every argument is terminated, so the final split element is the empty tail.
    let mut argv: Vec<Cow<'static, [u8]>> = args
        .split(|b| *b == UNIT_SEPARATOR)
        .map(|arg| Cow::Owned(arg.to_vec()))
        .collect();
    argv.pop();

    Ok(CallRecord {
        pid,
        ppid,
        function: Cow::Owned(function.to_vec()),
        cwd: Cow::Owned(cwd.to_vec()),
        argv,
    })
}

fn parse_pid(raw: &[u8]) -> Result<i32, DecodeError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| DecodeError::InvalidPid(String::from_utf8_lossy(raw).into_owned()))
}
