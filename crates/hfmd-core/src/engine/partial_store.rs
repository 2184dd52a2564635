//! Partial-file store - on-disk staging of in-progress downloads
//!
//! A file destined for `P` is streamed into `P.part` and only ever appears
//! at `P` through a single rename once it is complete.

use crate::error::HfmdError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const PART_SUFFIX: &str = ".part";

/// Final and staging locations of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePaths {
    pub final_path: PathBuf,
    pub part_path: PathBuf,
}

/// Manages `.part` files below a destination root
#[derive(Debug, Clone)]
pub struct PartialFileStore {
    root: PathBuf,
}

impl PartialFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a repository path below the root.
    ///
    /// Empty and `.` segments are dropped; `..`, absolute paths, backslashes
    /// and drive prefixes are rejected since the path comes from the server.
    pub fn resolve(&self, relative: &str) -> Result<FilePaths, HfmdError> {
        let unsafe_path = || HfmdError::UnsafePath(relative.to_string());

        if relative.starts_with('/') || relative.contains('\\') || relative.contains('\0') {
            return Err(unsafe_path());
        }

        let mut final_path = self.root.clone();
        let mut segments = 0;
        for segment in relative.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(unsafe_path()),
                s if is_drive_or_stream(s, segments == 0) => return Err(unsafe_path()),
                s => {
                    final_path.push(s);
                    segments += 1;
                }
            }
        }
        if segments == 0 {
            return Err(unsafe_path());
        }

        let mut part_name = final_path.as_os_str().to_os_string();
        part_name.push(PART_SUFFIX);

        Ok(FilePaths {
            final_path,
            part_path: PathBuf::from(part_name),
        })
    }

    /// Size of the completed file, if it exists
    pub async fn existing_final_size(&self, final_path: &Path) -> Result<Option<u64>, HfmdError> {
        match fs::metadata(final_path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Err(HfmdError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} exists and is not a file", final_path.display()),
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resume offset for a new attempt; creates an empty partial file (and
    /// its parent directories) when none exists yet
    pub async fn prepare_partial(&self, part_path: &Path) -> Result<u64, HfmdError> {
        match fs::metadata(part_path).await {
            Ok(meta) => return Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = part_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(part_path)
            .await?;
        debug!("Created empty partial file {:?}", part_path);
        Ok(0)
    }

    /// Open the partial file for appending
    pub async fn append(&self, part_path: &Path) -> Result<PartialWriter, HfmdError> {
        let file = OpenOptions::new().append(true).open(part_path).await?;
        Ok(PartialWriter { file, written: 0 })
    }

    /// Discard the partial content, used when a server ignores a range request
    pub async fn truncate(&self, part_path: &Path) -> Result<(), HfmdError> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(part_path)
            .await?;
        Ok(())
    }

    /// Promote the partial file to its final path
    pub async fn finalize(&self, part_path: &Path, final_path: &Path) -> Result<(), HfmdError> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(part_path, final_path).await?;
        debug!("Renamed {:?} -> {:?}", part_path, final_path);
        Ok(())
    }
}

/// `C:` drive prefixes in the first segment. On Windows any `:` is refused
/// since it names an alternate data stream.
fn is_drive_or_stream(segment: &str, first: bool) -> bool {
    if cfg!(windows) {
        return segment.contains(':');
    }
    let bytes = segment.as_bytes();
    first && bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Append-only handle on a partial file
#[derive(Debug)]
pub struct PartialWriter {
    file: File,
    written: u64,
}

impl PartialWriter {
    /// Append one chunk and make it durable before returning
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), HfmdError> {
        self.file.write_all(chunk).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes appended through this handle
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn close(mut self) -> Result<(), HfmdError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}
