//! Shared types for hfmd
//!
//! This crate contains the data structures shared between the
//! core engine and the CLI: repository and file descriptors, transfer
//! outcomes, progress events and persisted settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Repository Types
// ============================================================================

/// Kind of repository hosted on the Hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    #[default]
    Model,
    Dataset,
}

impl RepoKind {
    /// Collection name used by the JSON API (`/api/models`, `/api/datasets`)
    pub fn api_collection(&self) -> &'static str {
        match self {
            RepoKind::Model => "models",
            RepoKind::Dataset => "datasets",
        }
    }

    /// Prefix in front of the repository id in content URLs
    pub fn url_prefix(&self) -> Option<&'static str> {
        match self {
            RepoKind::Model => None,
            RepoKind::Dataset => Some("datasets"),
        }
    }
}

/// A repository at a given revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub kind: RepoKind,
    /// "owner/name"
    pub id: String,
    /// Branch, tag or commit
    pub revision: String,
}

impl RepoRef {
    pub fn new(kind: RepoKind, id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            revision: revision.into(),
        }
    }

    pub fn model(id: impl Into<String>) -> Self {
        Self::new(RepoKind::Model, id, DEFAULT_REVISION)
    }

    pub fn dataset(id: impl Into<String>) -> Self {
        Self::new(RepoKind::Dataset, id, DEFAULT_REVISION)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.url_prefix() {
            Some(prefix) => write!(f, "{}/{}@{}", prefix, self.id, self.revision),
            None => write!(f, "{}@{}", self.id, self.revision),
        }
    }
}

pub const DEFAULT_REVISION: &str = "main";

/// Summary of a repository returned by a Hub search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSummary {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub downloads: Option<u64>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "pipeline_tag")]
    pub pipeline_tag: Option<String>,
    #[serde(default, rename = "library_name")]
    pub library_name: Option<String>,
}

/// Search parameters for the Hub listing endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub author: Option<String>,
    /// e.g. "downloads", "likes", "lastModified"
    pub sort: Option<String>,
    /// Sort descending when true
    pub descending: bool,
    pub limit: Option<u32>,
}

// ============================================================================
// File Types
// ============================================================================

/// Kind of entry in a repository tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Remote metadata for one downloadable object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Repository-relative, slash separated
    pub path: String,
    /// LFS sha256 when the file is stored in LFS, git blob id otherwise
    pub content_id: String,
    /// Declared size in bytes, absent for directories
    pub size: Option<u64>,
    pub kind: EntryKind,
}

impl FileDescriptor {
    pub fn file(path: impl Into<String>, content_id: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            content_id: content_id.into(),
            size: Some(size),
            kind: EntryKind::File,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn class(&self) -> FileClass {
        FileClass::classify(&self.path)
    }
}

/// Coarse grouping of repository files, used to organise selection lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClass {
    Weights,
    Tokenizer,
    Config,
    Data,
    Docs,
    Other,
}

impl FileClass {
    /// Classify a repository path by its file name and extension
    pub fn classify(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
        let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");

        if name.starts_with("tokenizer")
            || name.starts_with("vocab")
            || name == "merges.txt"
            || name == "special_tokens_map.json"
            || ext == "tiktoken"
            || (ext == "model" && !name.contains("pytorch"))
        {
            return FileClass::Tokenizer;
        }

        match ext {
            "safetensors" | "bin" | "gguf" | "ggml" | "pt" | "pth" | "onnx" | "h5" | "msgpack"
            | "ckpt" | "pb" | "tflite" | "mlmodel" => FileClass::Weights,
            "json" | "yaml" | "yml" | "toml" | "cfg" | "ini" | "py" => FileClass::Config,
            "parquet" | "csv" | "tsv" | "jsonl" | "arrow" | "txt" | "zip" | "gz" | "tar" | "zst"
            | "xz" => FileClass::Data,
            "md" | "rst" | "pdf" => FileClass::Docs,
            "" if name == "license" || name == "readme" || name == "notice" => FileClass::Docs,
            _ => FileClass::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileClass::Weights => "Weights",
            FileClass::Tokenizer => "Tokenizer",
            FileClass::Config => "Config",
            FileClass::Data => "Data",
            FileClass::Docs => "Docs",
            FileClass::Other => "Other",
        }
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Transfer Types
// ============================================================================

/// Identifier of a transfer task within one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a single file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Skipped,
    Resuming,
    Streaming,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

/// Terminal outcome of a file transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TransferOutcome {
    /// Final file was already present, nothing was fetched
    Skipped { size: u64 },
    /// Downloaded and renamed into place
    Completed { size: u64, resumed_from: u64 },
    /// Transfer failed, the partial file is kept for a later resume
    Failed { error: String },
    /// Stopped on request, the partial file is kept for a later resume
    Cancelled { bytes_on_disk: u64 },
}

impl TransferOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TransferOutcome::Skipped { .. } => TaskState::Skipped,
            TransferOutcome::Completed { .. } => TaskState::Completed,
            TransferOutcome::Failed { .. } => TaskState::Failed,
            TransferOutcome::Cancelled { .. } => TaskState::Cancelled,
        }
    }

    /// Skipped and Completed both leave the final file in place
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Skipped { .. } | TransferOutcome::Completed { .. }
        )
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Events emitted by the engine to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TransferEvent {
    JobStarted {
        job_id: Uuid,
        files: usize,
    },
    TaskStarted {
        task: TaskId,
        path: String,
    },
    TaskTotal {
        task: TaskId,
        total: u64,
    },
    TaskProgress {
        task: TaskId,
        /// Cumulative bytes, including the resume offset
        transferred: u64,
    },
    TaskFinished {
        task: TaskId,
        outcome: TransferOutcome,
    },
    JobFinished {
        job_id: Uuid,
    },
}

// ============================================================================
// Settings Types
// ============================================================================

/// Persisted application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hub base URL
    pub endpoint: String,
    pub default_destination: PathBuf,
    pub default_revision: String,
    /// Maximum simultaneous transfers (0 = unlimited)
    pub max_concurrent_transfers: u32,
    /// Read buffer size for response bodies, in bytes
    pub chunk_size: usize,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Access token for gated or private repositories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_destination: dirs::download_dir()
                .map(|p| p.join("hfmd"))
                .unwrap_or_else(|| PathBuf::from(".")),
            default_revision: DEFAULT_REVISION.to_string(),
            max_concurrent_transfers: 8,
            chunk_size: 64 * 1024,
            connect_timeout_secs: 30,
            user_agent: concat!("hfmd/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
        }
    }
}

impl Settings {
    /// Concurrency cap as used by the coordinator, `None` meaning unbounded
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self.max_concurrent_transfers {
            0 => None,
            n => Some(n as usize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_groups_common_files() {
        assert_eq!(FileClass::classify("model-00001-of-00002.safetensors"), FileClass::Weights);
        assert_eq!(FileClass::classify("gguf/llama.Q4_K_M.gguf"), FileClass::Weights);
        assert_eq!(FileClass::classify("tokenizer.json"), FileClass::Tokenizer);
        assert_eq!(FileClass::classify("spiece.model"), FileClass::Tokenizer);
        assert_eq!(FileClass::classify("config.json"), FileClass::Config);
        assert_eq!(FileClass::classify("data/train-0000.parquet"), FileClass::Data);
        assert_eq!(FileClass::classify("README.md"), FileClass::Docs);
        assert_eq!(FileClass::classify("LICENSE"), FileClass::Docs);
        assert_eq!(FileClass::classify(".gitattributes"), FileClass::Other);
    }

    #[test]
    fn repo_display_includes_dataset_prefix() {
        assert_eq!(RepoRef::model("org/m").to_string(), "org/m@main");
        assert_eq!(RepoRef::dataset("org/d").to_string(), "datasets/org/d@main");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(TransferOutcome::Skipped { size: 3 }).unwrap();
        assert_eq!(json["status"], "skipped");
        assert!(TransferOutcome::Completed { size: 1, resumed_from: 0 }.is_success());
        assert!(!TransferOutcome::Cancelled { bytes_on_disk: 0 }.is_success());
    }

    #[test]
    fn zero_concurrency_means_unbounded() {
        let mut settings = Settings::default();
        assert_eq!(settings.concurrency_limit(), Some(8));
        settings.max_concurrent_transfers = 0;
        assert_eq!(settings.concurrency_limit(), None);
    }

    #[test]
    fn settings_fill_missing_fields_from_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"chunk_size": 1024}"#).unwrap();
        assert_eq!(settings.chunk_size, 1024);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }
}
