// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exec Trace Collector: the receiving side of the exec trace shim
//!
//! Two ways to gather the records written by `ah-exec-trace-shim`:
//!
//! - [`read_report_directory`] parses every `*.cmd` file dropped into the
//!   directory named by `INTERCEPT_BUILD_TARGET_DIR`.
//! - [`SocketCollector`] listens on a Unix socket and decodes one
//!   length-prefixed record per connection.
//!
//! # Example
//!
//! ```no_run
//! use ah_exec_trace_collector::SocketCollector;
//! use tempfile::TempDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let socket_path = temp_dir.path().join("trace.sock");
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
//!
//!     let mut collector = SocketCollector::new(socket_path);
//!     collector
//!         .run(
//!             |record| async move {
//!                 println!("{} {:?}", record.function_lossy(), record.argv_lossy());
//!             },
//!             shutdown_rx,
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use ah_exec_trace_proto::{file_drop, stream, DecodeError, OwnedCallRecord};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Errors that can occur while collecting records
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed report file {}: {source}", path.display())]
    ReportFile {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("malformed stream record: {0}")]
    Stream(#[from] DecodeError),
}

/// Parse a single report file.
pub fn read_report_file(path: &Path) -> Result<Vec<OwnedCallRecord>, CollectorError> {
    let content = std::fs::read(path)?;
    file_drop::decode(&content).map_err(|source| CollectorError::ReportFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every `*.cmd` file in `dir`, in file name order.
///
/// Other files are ignored. Report files are named randomly, so the order
/// only makes the result deterministic; it is not the order of the calls.
pub fn read_report_directory(dir: &Path) -> Result<Vec<OwnedCallRecord>, CollectorError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_report = entry
            .file_name()
            .to_string_lossy()
            .ends_with(file_drop::FILE_SUFFIX);
        if is_report && entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        records.extend(read_report_file(&path)?);
    }
    Ok(records)
}

/// Collector for shims reporting over a Unix socket
pub struct SocketCollector {
    socket_path: PathBuf,
}

impl SocketCollector {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and pass every received record to `handler` until
    /// `shutdown` fires or its sender is dropped.
    ///
    /// A connection that does not carry exactly one well-formed record is
    /// logged and dropped; it does not stop the collector.
    pub async fn run<F, Fut>(
        &mut self,
        handler: F,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<(), CollectorError>
    where
        F: Fn(OwnedCallRecord) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        debug!(socket = %self.socket_path.display(), "exec trace collector listening");

        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        match Self::read_record(stream).await {
                            Ok(record) => handler(record).await,
                            Err(e) => warn!(error = %e, "dropping malformed report"),
                        }
                    });
                }
            }
        }
    }

    async fn read_record(mut stream: UnixStream) -> Result<OwnedCallRecord, CollectorError> {
        let mut payload = Vec::new();
        stream.read_to_end(&mut payload).await?;
        Ok(stream::decode(&payload)?)
    }
}

impl Drop for SocketCollector {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Test utilities for the exec trace collector
pub mod test_utils {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// A collector that keeps every received record for inspection
    #[derive(Clone)]
    pub struct TestCollector {
        socket_path: PathBuf,
        records: Arc<Mutex<Vec<OwnedCallRecord>>>,
    }

    impl TestCollector {
        pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
            Self {
                socket_path: socket_path.as_ref().to_path_buf(),
                records: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// The records received so far
        pub async fn records(&self) -> Vec<OwnedCallRecord> {
            self.records.lock().await.clone()
        }

        /// Wait until at least `count` records arrived or `timeout` elapsed.
        pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OwnedCallRecord> {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let records = self.records().await;
                if records.len() >= count || tokio::time::Instant::now() >= deadline {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        /// Run the collector for at most five seconds.
        pub async fn run(&self) -> Result<(), CollectorError> {
            let mut collector = SocketCollector::new(&self.socket_path);
            let records = Arc::clone(&self.records);
            let (shutdown_tx, shutdown_rx) = oneshot::channel();

            let handler = move |record: OwnedCallRecord| {
                let records = Arc::clone(&records);
                async move {
                    records.lock().await.push(record);
                }
            };

            let collector_future = collector.run(handler, shutdown_rx);
            match tokio::time::timeout(Duration::from_secs(5), collector_future).await {
                Ok(result) => result,
                Err(_) => {
                    drop(shutdown_tx);
                    Ok(())
                }
            }
        }
    }
}
