//! hfmd core - Hub client and resumable transfer engine
//!
//! This crate lists repository files on a Hugging Face compatible hub and
//! downloads a selection of them with resumable, concurrent transfers.

pub mod engine;
mod error;
mod hub;
mod storage;

pub use engine::{
    EventProgress, JobReport, NoopProgress, PartialFileStore, ProgressSink, TransferCoordinator,
    TransferJob,
};
pub use error::*;
pub use hub::*;
pub use storage::*;

use hfmd_types::{FileDescriptor, RepoKind, RepoRef, RepoSummary, SearchQuery, Settings, TransferEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;

/// The main hfmd core instance
#[derive(Clone)]
pub struct HfmdCore {
    /// Effective settings for this process
    pub settings: Arc<RwLock<Settings>>,
    /// Settings persistence
    pub storage: Storage,
    /// Hub client built from the current settings
    hub: Arc<parking_lot::RwLock<HubClient>>,
    /// Lifecycle event broadcaster
    event_tx: broadcast::Sender<TransferEvent>,
    /// Byte-count broadcaster (`TaskProgress` only)
    progress_tx: broadcast::Sender<TransferEvent>,
}

impl HfmdCore {
    /// Open the data directory and load persisted settings
    pub async fn new(data_dir: PathBuf) -> Result<Self, HfmdError> {
        let storage = Storage::new(data_dir).await?;
        let settings = storage.load_settings().await?;
        Self::with_settings(storage, settings)
    }

    /// Build a core from explicit settings (e.g. persisted ones plus CLI overrides)
    pub fn with_settings(storage: Storage, settings: Settings) -> Result<Self, HfmdError> {
        let hub = HubClient::new(&settings)?;
        let (event_tx, _) = broadcast::channel(1024);
        let (progress_tx, _) = broadcast::channel(1024);

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            storage,
            hub: Arc::new(parking_lot::RwLock::new(hub)),
            event_tx,
            progress_tx,
        })
    }

    /// Subscribe to job and task lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to cumulative byte counts
    pub fn subscribe_progress(&self) -> broadcast::Receiver<TransferEvent> {
        self.progress_tx.subscribe()
    }

    /// Emit an event
    pub fn emit(&self, event: TransferEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn hub(&self) -> HubClient {
        self.hub.read().clone()
    }

    // ========================================================================
    // Hub Operations
    // ========================================================================

    /// List every file of a repository
    pub async fn list_files(&self, repo: &RepoRef) -> Result<Vec<FileDescriptor>, HfmdError> {
        self.hub().list_tree(repo).await
    }

    /// Search models or datasets
    pub async fn search(
        &self,
        kind: RepoKind,
        query: &SearchQuery,
    ) -> Result<Vec<RepoSummary>, HfmdError> {
        self.hub().search(kind, query).await
    }

    /// Fetch a repository card
    pub async fn fetch_card(&self, repo: &RepoRef) -> Result<Option<String>, HfmdError> {
        self.hub().fetch_card(repo).await
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Run a transfer job, publishing progress on the event channel
    pub async fn download(&self, job: TransferJob) -> JobReport {
        let (max_concurrent, chunk_size) = {
            let settings = self.settings.read().await;
            (settings.concurrency_limit(), settings.chunk_size)
        };

        let coordinator = TransferCoordinator::new(self.hub())
            .with_progress(Arc::new(EventProgress::new(
                self.event_tx.clone(),
                self.progress_tx.clone(),
            )))
            .with_max_concurrent(max_concurrent)
            .with_chunk_size(chunk_size);

        let job_id = job.id();
        self.emit(TransferEvent::JobStarted {
            job_id,
            files: job.files().iter().filter(|f| f.is_file()).count(),
        });
        let report = coordinator.run(job).await;
        self.emit(TransferEvent::JobFinished { job_id });

        report
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Get current settings
    pub async fn get_settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Persist new settings and rebuild the hub client from them
    pub async fn update_settings(&self, settings: Settings) -> Result<(), HfmdError> {
        let hub = HubClient::new(&settings)?;
        self.storage.save_settings(&settings).await?;
        *self.hub.write() = hub;
        *self.settings.write().await = settings;
        Ok(())
    }
}
