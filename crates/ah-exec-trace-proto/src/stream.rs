// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Socket-streaming encoding
//!
//! Layout, all integers in native byte order:
//!
//! ```text
//! pid_t pid | pid_t ppid
//! size_t len | function bytes
//! size_t len | cwd bytes
//! size_t argc | argc * (size_t len | arg bytes)
//! ```
//!
//! One connection carries exactly one record, so the record boundary is the
//! connection boundary.

use crate::{CallRecord, DecodeError, OwnedCallRecord};
use std::borrow::Cow;
use std::io::{self, Write};
use std::mem::size_of;

/// Serialize `record` into a byte buffer.
pub fn to_bytes(record: &CallRecord<'_>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&record.pid.to_ne_bytes());
    buf.extend_from_slice(&record.ppid.to_ne_bytes());
    put_bytes(&mut buf, &record.function);
    put_bytes(&mut buf, &record.cwd);
    buf.extend_from_slice(&record.argv.len().to_ne_bytes());
    for arg in &record.argv {
        put_bytes(&mut buf, arg);
    }
    buf
}

/// Write `record` to `writer`. `write_all` retries short writes.
pub fn encode<W: Write>(record: &CallRecord<'_>, writer: &mut W) -> io::Result<()> {
    writer.write_all(&to_bytes(record))?;
    writer.flush()
}

/// Decode the complete payload of one connection.
pub fn decode(payload: &[u8]) -> Result<OwnedCallRecord, DecodeError> {
    let mut cursor = Cursor { buf: payload };

    let pid = cursor.pid("pid")?;
    let ppid = cursor.pid("ppid")?;
    let function = cursor.bytes("function")?;
    let cwd = cursor.bytes("cwd")?;
    let argc = cursor.size("argument count")?;

    let mut argv = Vec::new();
    for _ in 0..argc {
        argv.push(Cow::Owned(cursor.bytes("argument")?));
    }

    if !cursor.buf.is_empty() {
        return Err(DecodeError::TrailingBytes(cursor.buf.len()));
    }

    Ok(CallRecord {
        pid,
        ppid,
        function: Cow::Owned(function),
        cwd: Cow::Owned(cwd),
        argv,
    })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&bytes.len().to_ne_bytes());
    buf.extend_from_slice(bytes);
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() < len {
            return Err(DecodeError::Truncated(what));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn pid(&mut self, what: &'static str) -> Result<i32, DecodeError> {
        let raw = self.take(size_of::<i32>(), what)?;
        let mut bytes = [0u8; size_of::<i32>()];
        bytes.copy_from_slice(raw);
        Ok(i32::from_ne_bytes(bytes))
    }

    fn size(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let raw = self.take(size_of::<usize>(), what)?;
        let mut bytes = [0u8; size_of::<usize>()];
        bytes.copy_from_slice(raw);
        Ok(usize::from_ne_bytes(bytes))
    }

    fn bytes(&mut self, what: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.size(what)?;
        Ok(self.take(len, what)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(argv: &[&'static [u8]]) -> CallRecord<'static> {
        CallRecord::new(
            100,
            1,
            &b"execve"[..],
            &b"/tmp"[..],
            argv.iter().map(|a| Cow::Borrowed(*a)).collect(),
        )
    }

    #[test]
    fn round_trips_a_compiler_call() {
        let record = sample(&[b"cc", b"-c", b"a.c"]);
        let mut socket = Vec::new();
        encode(&record, &mut socket).unwrap();

        let decoded = decode(&socket).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.argv_lossy(), vec!["cc", "-c", "a.c"]);
    }

    #[test]
    fn empty_argument_vector_round_trips_to_empty_sequence() {
        let decoded = decode(&to_bytes(&sample(&[]))).unwrap();
        assert!(decoded.argv.is_empty());
        assert_eq!(decoded.function_lossy(), "execve");
    }

    #[test]
    fn layout_uses_native_width_prefixes() {
        let bytes = to_bytes(&sample(&[b"x"]));
        let word = size_of::<usize>();
        // pids + (len + "execve") + (len + "/tmp") + argc + (len + "x")
        assert_eq!(bytes.len(), 4 + 4 + word + 6 + word + 4 + word + word + 1);
        assert_eq!(&bytes[..4], &100i32.to_ne_bytes());
        assert_eq!(&bytes[8..8 + word], &6usize.to_ne_bytes());
        assert_eq!(&bytes[8 + word..14 + word], b"execve");
    }

    #[test]
    fn reports_truncation_and_trailing_garbage() {
        let bytes = to_bytes(&sample(&[b"cc"]));
        assert_eq!(
            decode(&bytes[..bytes.len() - 1]).unwrap_err(),
            DecodeError::Truncated("argument")
        );

        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(decode(&padded).unwrap_err(), DecodeError::TrailingBytes(1));

        assert_eq!(decode(&[1, 2]).unwrap_err(), DecodeError::Truncated("pid"));
    }
}
