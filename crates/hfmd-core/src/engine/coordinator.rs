//! Transfer coordinator - fans a job out to concurrent transfer tasks
//!
//! Every selected file gets its own task. An optional semaphore caps how
//! many of them talk to the network at once. A failing task never stops
//! its siblings; only the job's cancellation token does.

use crate::engine::partial_store::PartialFileStore;
use crate::engine::progress::{NoopProgress, ProgressSink};
use crate::engine::transfer_task::{TransferTask, DEFAULT_CHUNK_SIZE};
use crate::error::HfmdError;
use crate::hub::HubClient;
use hfmd_types::{FileDescriptor, RepoRef, TaskId, TaskState, TransferOutcome};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One invocation's worth of files to fetch into a destination root
#[derive(Debug, Clone)]
pub struct TransferJob {
    id: Uuid,
    dest_root: PathBuf,
    repo: RepoRef,
    files: Vec<FileDescriptor>,
    cancel: CancellationToken,
}

impl TransferJob {
    pub fn new(dest_root: impl Into<PathBuf>, repo: RepoRef, files: Vec<FileDescriptor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dest_root: dest_root.into(),
            repo,
            files,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. one wired to Ctrl-C)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Handle that cancels every task of this job
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Terminal outcome of every file of a job, keyed by repository path
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub outcomes: BTreeMap<String, TransferOutcome>,
}

impl JobReport {
    pub fn count(&self, state: TaskState) -> usize {
        self.outcomes.values().filter(|o| o.state() == state).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(TransferOutcome::is_success)
    }

    pub fn any_cancelled(&self) -> bool {
        self.count(TaskState::Cancelled) > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(path, outcome)| match outcome {
            TransferOutcome::Failed { error } => Some((path.as_str(), error.as_str())),
            _ => None,
        })
    }
}

/// Runs transfer jobs
pub struct TransferCoordinator {
    hub: HubClient,
    sink: Arc<dyn ProgressSink>,
    max_concurrent: Option<usize>,
    chunk_size: usize,
}

impl TransferCoordinator {
    /// Create a coordinator with no concurrency cap and no progress output
    pub fn new(hub: HubClient) -> Self {
        Self {
            hub,
            sink: Arc::new(NoopProgress),
            max_concurrent: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Cap simultaneous transfers; `None` starts every file at once
    pub fn with_max_concurrent(mut self, max_concurrent: Option<usize>) -> Self {
        self.max_concurrent = max_concurrent.filter(|n| *n > 0);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Download every file of the job and wait for all of them to finish
    pub async fn run(&self, job: TransferJob) -> JobReport {
        let job_id = job.id;
        let store = PartialFileStore::new(job.dest_root.clone());
        let limiter = self.max_concurrent.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            "Starting job {}: {} files of {} into {:?} (max concurrent: {:?})",
            job_id,
            job.files.len(),
            job.repo,
            job.dest_root,
            self.max_concurrent
        );

        let mut outcomes: BTreeMap<String, TransferOutcome> = BTreeMap::new();
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();
        let mut spawned: Vec<String> = Vec::new();
        let mut join_set = JoinSet::new();

        for (index, descriptor) in job.files.into_iter().enumerate() {
            if !descriptor.is_file() {
                debug!("Ignoring directory entry {}", descriptor.path);
                continue;
            }
            if outcomes.contains_key(&descriptor.path) || spawned.contains(&descriptor.path) {
                debug!("{} selected twice, transferring once", descriptor.path);
                continue;
            }

            let id = TaskId(index);
            let path = descriptor.path.clone();

            // A file's final path may be another file's staging path
            // (`a.bin` next to `a.bin.part`), so both are claimed
            let prepared = store.resolve(&path).and_then(|paths| {
                let owner = claimed
                    .get(&paths.final_path)
                    .or_else(|| claimed.get(&paths.part_path));
                if let Some(owner) = owner {
                    return Err(HfmdError::DuplicatePath(owner.clone()));
                }
                let url = self.hub.content_url(&job.repo, &path)?;
                Ok((paths, url))
            });

            let (paths, url) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!("Not transferring {}: {}", path, e);
                    let outcome = TransferOutcome::Failed {
                        error: e.to_string(),
                    };
                    self.sink.start(id, &path);
                    self.sink.finish(id, &outcome);
                    outcomes.insert(path, outcome);
                    continue;
                }
            };
            claimed.insert(paths.final_path.clone(), path.clone());
            claimed.insert(paths.part_path.clone(), path.clone());

            let task = TransferTask::new(
                id,
                descriptor,
                url,
                paths,
                store.clone(),
                self.hub.http().clone(),
                self.sink.clone(),
                job.cancel.clone(),
            )
            .with_chunk_size(self.chunk_size);

            let limiter = limiter.clone();
            let cancel = job.cancel.clone();
            join_set.spawn(async move {
                // Held until the task finishes; a cancelled wait runs the task
                // without a permit so it can report its outcome locally
                let _permit = match limiter {
                    Some(semaphore) => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };
                task.run().await
            });
            spawned.push(path);
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => {
                    debug!(
                        "Task {} finished: {:?} (offset {}, {} bytes this run)",
                        report.id, report.outcome, report.resume_offset, report.bytes_this_run
                    );
                    outcomes.insert(report.path, report.outcome);
                }
                Err(e) => error!("Transfer task panicked: {}", e),
            }
        }

        for path in spawned {
            outcomes
                .entry(path)
                .or_insert_with(|| TransferOutcome::Failed {
                    error: "transfer task ended unexpectedly".to_string(),
                });
        }

        let report = JobReport { job_id, outcomes };
        info!(
            "Job {} finished: {} completed, {} skipped, {} failed, {} cancelled",
            job_id,
            report.count(TaskState::Completed),
            report.count(TaskState::Skipped),
            report.count(TaskState::Failed),
            report.count(TaskState::Cancelled)
        );
        report
    }
}
