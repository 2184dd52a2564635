//! Transfer task - downloads a single file into its partial file
//!
//! Pending -> Skipped when the final file is already there, otherwise
//! Pending -> Resuming -> Streaming -> Finalizing -> Completed. Cancellation
//! and errors leave the partial file as a valid prefix for the next run.

use crate::engine::partial_store::{FilePaths, PartialFileStore};
use crate::engine::progress::ProgressSink;
use crate::error::HfmdError;
use futures::TryStreamExt;
use hfmd_types::{FileDescriptor, TaskId, TaskState, TransferOutcome};
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Terminal report of one task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: TaskId,
    pub path: String,
    pub outcome: TransferOutcome,
    /// Partial length found on disk when the attempt started
    pub resume_offset: u64,
    /// Bytes received during this run
    pub bytes_this_run: u64,
}

/// Downloads one file, resuming from any existing partial file
pub struct TransferTask {
    id: TaskId,
    descriptor: FileDescriptor,
    url: Url,
    paths: FilePaths,
    store: PartialFileStore,
    client: Client,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    chunk_size: usize,
    state: TaskState,
    resume_offset: u64,
    transferred: u64,
}

impl TransferTask {
    /// Create a new transfer task
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        descriptor: FileDescriptor,
        url: Url,
        paths: FilePaths,
        store: PartialFileStore,
        client: Client,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            descriptor,
            url,
            paths,
            store,
            client,
            sink,
            cancel,
            chunk_size: DEFAULT_CHUNK_SIZE,
            state: TaskState::Pending,
            resume_offset: 0,
            transferred: 0,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Run the task to a terminal outcome. Never returns an error: failures
    /// are captured in the outcome so sibling tasks are unaffected.
    pub async fn run(mut self) -> TaskReport {
        self.sink.start(self.id, &self.descriptor.path);

        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err(HfmdError::Cancelled) => {
                self.set_state(TaskState::Cancelled);
                let bytes_on_disk = tokio::fs::metadata(&self.paths.part_path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                info!(
                    "Transfer {} cancelled with {} bytes kept in {:?}",
                    self.descriptor.path, bytes_on_disk, self.paths.part_path
                );
                TransferOutcome::Cancelled { bytes_on_disk }
            }
            Err(e) => {
                self.set_state(TaskState::Failed);
                if e.is_permanent() {
                    error!("Transfer {} failed: {}", self.descriptor.path, e);
                } else {
                    warn!(
                        "Transfer {} failed: {} (partial file kept for resume)",
                        self.descriptor.path, e
                    );
                }
                TransferOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        self.sink.finish(self.id, &outcome);

        TaskReport {
            id: self.id,
            path: self.descriptor.path,
            outcome,
            resume_offset: self.resume_offset,
            bytes_this_run: self.transferred,
        }
    }

    async fn execute(&mut self) -> Result<TransferOutcome, HfmdError> {
        // Presence of the final file is the only completion check
        if let Some(size) = self.store.existing_final_size(&self.paths.final_path).await? {
            self.set_state(TaskState::Skipped);
            info!("Skipping {}: already downloaded ({} bytes)", self.descriptor.path, size);
            self.sink.set_total(self.id, size);
            self.sink.advance(self.id, size);
            return Ok(TransferOutcome::Skipped { size });
        }

        if self.cancel.is_cancelled() {
            return Err(HfmdError::Cancelled);
        }

        self.set_state(TaskState::Resuming);
        self.resume_offset = self.store.prepare_partial(&self.paths.part_path).await?;
        if self.resume_offset > 0 {
            info!(
                "Resuming {} from byte {}",
                self.descriptor.path, self.resume_offset
            );
        }

        let response = self.send_request().await?;
        let status = response.status();

        match status {
            StatusCode::PARTIAL_CONTENT => {
                // Bytes are appended as-is, so they must start where the partial ends
                if content_range_start(response.headers()) != Some(self.resume_offset) {
                    let received = response
                        .headers()
                        .get(CONTENT_RANGE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none")
                        .to_string();
                    return Err(HfmdError::UnexpectedRange {
                        expected: self.resume_offset,
                        received,
                    });
                }
            }
            StatusCode::OK => {
                if self.resume_offset > 0 {
                    warn!(
                        "Server ignored range request for {}, restarting from zero",
                        self.descriptor.path
                    );
                    self.store.truncate(&self.paths.part_path).await?;
                    self.resume_offset = 0;
                }
            }
            StatusCode::RANGE_NOT_SATISFIABLE
                if self.resume_offset > 0
                    && content_range_total(response.headers()) == Some(self.resume_offset) =>
            {
                info!(
                    "Partial file of {} already holds all {} bytes",
                    self.descriptor.path, self.resume_offset
                );
                self.sink.set_total(self.id, self.resume_offset);
                self.sink.advance(self.id, self.resume_offset);
                return self.finalize(self.resume_offset).await;
            }
            _ => {
                return Err(HfmdError::Status {
                    status: status.as_u16(),
                    url: response.url().to_string(),
                })
            }
        }

        let remaining = response
            .content_length()
            .ok_or_else(|| HfmdError::MissingContentLength(self.descriptor.path.clone()))?;
        let total = self.resume_offset + remaining;

        if let Some(declared) = self.descriptor.size {
            if declared != total {
                debug!(
                    "{}: listing declared {} bytes, server reports {}",
                    self.descriptor.path, declared, total
                );
            }
        }

        self.sink.set_total(self.id, total);
        if self.resume_offset > 0 {
            self.sink.advance(self.id, self.resume_offset);
        }

        self.set_state(TaskState::Streaming);
        self.stream_body(response, remaining).await?;

        self.finalize(total).await
    }

    async fn send_request(&self) -> Result<Response, HfmdError> {
        let mut request = self.client.get(self.url.clone());
        if self.resume_offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", self.resume_offset));
        }
        debug!("GET {} (offset {})", self.url, self.resume_offset);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HfmdError::Cancelled),
            response = request.send() => Ok(response?),
        }
    }

    /// Append the body to the partial file chunk by chunk. A chunk that has
    /// been read is always written in full before cancellation is honoured.
    async fn stream_body(&mut self, response: Response, expected: u64) -> Result<(), HfmdError> {
        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(body);
        let mut writer = self.store.append(&self.paths.part_path).await?;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                read = reader.read(&mut buffer) => Some(read),
            };
            let Some(read) = read else {
                writer.close().await?;
                return Err(HfmdError::Cancelled);
            };

            let n = read.map_err(HfmdError::Body)?;
            if n == 0 {
                break;
            }

            writer.write_chunk(&buffer[..n]).await?;
            self.transferred += n as u64;
            self.sink.advance(self.id, n as u64);
        }

        writer.close().await?;

        if self.transferred != expected {
            return Err(HfmdError::LengthMismatch {
                expected: self.resume_offset + expected,
                received: self.resume_offset + self.transferred,
            });
        }
        Ok(())
    }

    async fn finalize(&mut self, size: u64) -> Result<TransferOutcome, HfmdError> {
        self.set_state(TaskState::Finalizing);
        self.store
            .finalize(&self.paths.part_path, &self.paths.final_path)
            .await?;
        self.set_state(TaskState::Completed);

        info!("Downloaded {} ({} bytes)", self.descriptor.path, size);
        Ok(TransferOutcome::Completed {
            size,
            resumed_from: self.resume_offset,
        })
    }

    fn set_state(&mut self, state: TaskState) {
        debug!("Task {} ({}): {:?} -> {:?}", self.id, self.descriptor.path, self.state, state);
        self.state = state;
    }
}

/// First byte position from `Content-Range: bytes a-b/N`
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

/// Total length from `Content-Range: bytes */N` (or `bytes a-b/N`)
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}
