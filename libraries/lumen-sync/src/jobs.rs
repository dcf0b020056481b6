//! Background job runner
//!
//! Every job runs on its own tokio task and works through a queue of
//! [`Task`]s sequentially. At most one job exists per [`JobKey`], and no two
//! jobs touch the same import; queueing a job that would collide with a
//! queued or running one is a no-op. A semaphore bounds how many
//! jobs run at once. Cancellation is cooperative: it is observed between
//! tasks and between items inside changeset and synchronization tasks.

use crate::error::{Result, SyncError};
use crate::plugins::PluginRegistry;
use crate::tasks::{Task, TaskContext, TaskOutput};
use crate::types::{JobInfo, JobKey, JobProgress, JobState};
use async_trait::async_trait;
use lumen_core::{ImportKey, ProgressCallback};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Decides what happens after a task completes
#[async_trait]
pub(crate) trait JobDriver: Send + Sync {
    /// Plugins the tasks run against
    fn plugins(&self) -> &PluginRegistry;

    /// Handle a task result, returning the follow-up tasks
    async fn on_task_complete(&self, key: &JobKey, output: TaskOutput) -> Result<Vec<Task>>;
}

/// Imports a job may touch
#[derive(Debug, Clone, PartialEq, Eq)]
enum JobScope {
    /// Every import of the source, including ones not declared yet
    Source,
    Imports(HashSet<ImportKey>),
}

impl JobScope {
    fn of(tasks: &[Task]) -> Self {
        let mut keys = HashSet::new();
        for task in tasks {
            match task.import_key() {
                Some(key) => {
                    keys.insert(key);
                }
                None => return Self::Source,
            }
        }
        Self::Imports(keys)
    }

    fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Imports(ours), Self::Imports(theirs)) => !ours.is_disjoint(theirs),
            _ => true,
        }
    }

    fn touches(&self, keys: &[ImportKey]) -> bool {
        match self {
            Self::Source => true,
            Self::Imports(ours) => keys.iter().any(|key| ours.contains(key)),
        }
    }
}

struct JobEntry {
    id: Uuid,
    source_id: String,
    scope: JobScope,
    state: JobState,
    cancel: CancellationToken,
    pending_tasks: usize,
}

struct RunnerShared {
    jobs: Mutex<HashMap<JobKey, JobEntry>>,
    limiter: Arc<Semaphore>,
    paused: watch::Sender<bool>,
    progress: broadcast::Sender<JobProgress>,
    idle: Notify,
    shutdown: CancellationToken,
}

/// Runs jobs in the background, one per key
#[derive(Clone)]
pub struct JobRunner {
    shared: Arc<RunnerShared>,
}

impl JobRunner {
    /// Create a runner allowing `max_concurrent_jobs` jobs to run at once
    pub fn new(max_concurrent_jobs: usize, progress_capacity: usize) -> Self {
        let (paused, _) = watch::channel(false);
        let (progress, _) = broadcast::channel(progress_capacity.max(1));

        Self {
            shared: Arc::new(RunnerShared {
                jobs: Mutex::new(HashMap::new()),
                limiter: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
                paused,
                progress,
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to progress updates of all jobs
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgress> {
        self.shared.progress.subscribe()
    }

    /// Queue a job under `key`.
    ///
    /// Returns false when a job with the same key, or a job of the same
    /// source touching any of the same imports, is already queued or
    /// running, or when there is nothing to run.
    pub(crate) async fn queue(
        &self,
        key: JobKey,
        source_id: &str,
        tasks: Vec<Task>,
        driver: Arc<dyn JobDriver>,
    ) -> bool {
        if tasks.is_empty() {
            debug!("Nothing to do for {}", key);
            return false;
        }
        if self.shared.shutdown.is_cancelled() {
            debug!("Runner shut down, not queueing {}", key);
            return false;
        }

        let id = Uuid::new_v4();
        let cancel = self.shared.shutdown.child_token();
        let scope = JobScope::of(&tasks);
        {
            let mut jobs = self.shared.jobs.lock().await;
            if jobs.contains_key(&key) {
                debug!("Job {} already queued, nothing to do", key);
                return false;
            }
            if let Some((busy, _)) = jobs
                .iter()
                .find(|(_, job)| job.source_id == source_id && job.scope.overlaps(&scope))
            {
                debug!("Job {} covers the imports of {}, nothing to do", busy, key);
                return false;
            }
            jobs.insert(
                key.clone(),
                JobEntry {
                    id,
                    source_id: source_id.to_string(),
                    scope,
                    state: JobState::Queued,
                    cancel: cancel.clone(),
                    pending_tasks: tasks.len(),
                },
            );
        }

        info!("Queued job {} with {} tasks", key, tasks.len());
        let _ = self
            .shared
            .progress
            .send(JobProgress::new(id, key.clone(), JobState::Queued));

        let shared = self.shared.clone();
        tokio::spawn(async move {
            run_job(shared, id, key, cancel, tasks.into(), driver).await;
        });

        true
    }

    /// Whether a job is queued or running under `key`
    pub async fn is_queued(&self, key: &JobKey) -> bool {
        self.shared.jobs.lock().await.contains_key(key)
    }

    /// Whether any job of `source_id` is queued or running
    pub async fn has_source_jobs(&self, source_id: &str) -> bool {
        self.shared
            .jobs
            .lock()
            .await
            .values()
            .any(|job| job.source_id == source_id)
    }

    /// Snapshot of all queued and running jobs
    pub async fn jobs(&self) -> Vec<JobInfo> {
        self.shared
            .jobs
            .lock()
            .await
            .iter()
            .map(|(key, job)| JobInfo {
                id: job.id,
                key: key.clone(),
                source_id: job.source_id.clone(),
                state: job.state,
                pending_tasks: job.pending_tasks,
            })
            .collect()
    }

    /// Cancel the job queued under `key`
    pub async fn cancel(&self, key: &JobKey) -> bool {
        match self.shared.jobs.lock().await.get(key) {
            Some(job) => {
                info!("Cancelling job {}", key);
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every job of `source_id`, returning how many were cancelled
    pub async fn cancel_source(&self, source_id: &str) -> usize {
        let jobs = self.shared.jobs.lock().await;
        let mut cancelled = 0;
        for (key, job) in jobs.iter().filter(|(_, job)| job.source_id == source_id) {
            info!("Cancelling job {}", key);
            job.cancel.cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Cancel every job of `source_id` that touches one of `imports`,
    /// returning the keys of the cancelled jobs
    pub async fn cancel_imports(&self, source_id: &str, imports: &[ImportKey]) -> Vec<JobKey> {
        let jobs = self.shared.jobs.lock().await;
        let mut cancelled = Vec::new();
        for (key, job) in jobs
            .iter()
            .filter(|(_, job)| job.source_id == source_id && job.scope.touches(imports))
        {
            info!("Cancelling job {}", key);
            job.cancel.cancel();
            cancelled.push(key.clone());
        }
        cancelled
    }

    /// Wait until no job of `source_id` touching one of `imports` is left
    pub async fn wait_for_imports(&self, source_id: &str, imports: &[ImportKey]) {
        loop {
            let notified = self.shared.idle.notified();
            let busy = self
                .shared
                .jobs
                .lock()
                .await
                .values()
                .any(|job| job.source_id == source_id && job.scope.touches(imports));
            if !busy {
                return;
            }
            notified.await;
        }
    }

    /// Wait until the job queued under `key` has finished
    pub async fn wait_for(&self, key: &JobKey) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_queued(key).await {
                return;
            }
            notified.await;
        }
    }

    /// Wait until no job of `source_id` is left
    pub async fn wait_for_source(&self, source_id: &str) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.has_source_jobs(source_id).await {
                return;
            }
            notified.await;
        }
    }

    /// Wait until every job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.jobs.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Stop starting new tasks until [`resume`](Self::resume) is called
    pub fn pause(&self) {
        info!("Pausing job runner");
        self.shared.paused.send_replace(true);
    }

    /// Continue running tasks
    pub fn resume(&self) {
        info!("Resuming job runner");
        self.shared.paused.send_replace(false);
    }

    /// Whether the runner is paused
    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// Cancel all jobs and refuse new ones
    pub fn shutdown(&self) {
        info!("Shutting down job runner");
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("paused", &self.is_paused())
            .field("available_slots", &self.shared.limiter.available_permits())
            .finish()
    }
}

async fn run_job(
    shared: Arc<RunnerShared>,
    id: Uuid,
    key: JobKey,
    cancel: CancellationToken,
    queue: VecDeque<Task>,
    driver: Arc<dyn JobDriver>,
) {
    let permit = tokio::select! {
        permit = shared.limiter.clone().acquire_owned() => permit.ok(),
        () = cancel.cancelled() => None,
    };

    let state = match permit {
        Some(_permit) => {
            set_state(&shared, &key, JobState::Running, None).await;
            info!("Job {} started", key);
            run_tasks(&shared, id, &key, &cancel, queue, driver.as_ref()).await
        }
        None => JobState::Cancelled,
    };

    match state {
        JobState::Completed => info!("Job {} completed", key),
        JobState::Cancelled => info!("Job {} cancelled", key),
        _ => error!("Job {} {}", key, state),
    }

    let empty = {
        let mut jobs = shared.jobs.lock().await;
        jobs.remove(&key);
        jobs.is_empty()
    };
    let _ = shared.progress.send(JobProgress::new(id, key, state));
    if empty {
        debug!("Job runner idle");
    }
    shared.idle.notify_waiters();
}

async fn run_tasks(
    shared: &Arc<RunnerShared>,
    id: Uuid,
    key: &JobKey,
    cancel: &CancellationToken,
    mut queue: VecDeque<Task>,
    driver: &dyn JobDriver,
) -> JobState {
    let mut paused = shared.paused.subscribe();

    while let Some(task) = queue.pop_front() {
        wait_while_paused(&mut paused, cancel).await;
        if cancel.is_cancelled() {
            return JobState::Cancelled;
        }

        let kind = task.kind();
        let description = task.describe();
        set_state(shared, key, JobState::Running, Some(queue.len() + 1)).await;
        debug!("Job {} running {}", key, description);

        let ctx = TaskContext {
            plugins: driver.plugins(),
            cancel,
            progress: progress_reporter(shared, id, key, kind.as_str()),
        };

        let output = match task.execute(&ctx).await {
            Ok(output) => output,
            Err(SyncError::Cancelled) => return JobState::Cancelled,
            Err(e) => {
                error!("Job {} failed during {}: {}", key, description, e);
                return JobState::Failed;
            }
        };

        match driver.on_task_complete(key, output).await {
            Ok(follow_ups) => {
                // Follow-ups run before the rest of the queue so one import's
                // chain completes before the next import starts
                for follow_up in follow_ups.into_iter().rev() {
                    queue.push_front(follow_up);
                }
            }
            Err(SyncError::Cancelled) => return JobState::Cancelled,
            Err(e) => {
                error!("Job {} failed after {}: {}", key, description, e);
                return JobState::Failed;
            }
        }
    }

    JobState::Completed
}

async fn wait_while_paused(paused: &mut watch::Receiver<bool>, cancel: &CancellationToken) {
    loop {
        let is_paused = *paused.borrow_and_update();
        if !is_paused {
            return;
        }
        tokio::select! {
            changed = paused.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}

async fn set_state(shared: &RunnerShared, key: &JobKey, state: JobState, pending: Option<usize>) {
    if let Some(job) = shared.jobs.lock().await.get_mut(key) {
        job.state = state;
        if let Some(pending) = pending {
            job.pending_tasks = pending;
        }
    }
}

fn progress_reporter(shared: &Arc<RunnerShared>, id: Uuid, key: &JobKey, task: &'static str) -> ProgressCallback {
    let sender = shared.progress.clone();
    let key = key.clone();
    Arc::new(move |processed, total| {
        let mut progress = JobProgress::new(id, key.clone(), JobState::Running).with_items(processed, total);
        progress.task = Some(task.to_string());
        let _ = sender.send(progress);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{media_types, Import, MediaType, Source};

    fn retrieval(path: &str, media_type: &str) -> Task {
        Task::Retrieval {
            import: Import::new(path, media_type, Source::new("nas", "NAS")),
        }
    }

    #[test]
    fn test_scope_of_sync_tasks_lists_imports() {
        let scope = JobScope::of(&[
            retrieval("nas/a", media_types::MOVIE),
            retrieval("nas/b", media_types::EPISODE),
        ]);
        let JobScope::Imports(keys) = &scope else {
            panic!("expected import scope, got {scope:?}");
        };
        assert_eq!(keys.len(), 2);
        assert!(scope.touches(&[ImportKey::new("nas/a", MediaType::new(media_types::MOVIE))]));
        assert!(!scope.touches(&[ImportKey::new("nas/a", MediaType::new(media_types::EPISODE))]));
    }

    #[test]
    fn test_registration_covers_whole_source() {
        let registration = Task::Registration {
            source: Source::new("nas", "NAS"),
            declare_imports: true,
            settings: lumen_core::ImportSettings::default(),
        };
        let scope = JobScope::of(&[registration]);
        assert_eq!(scope, JobScope::Source);
        assert!(scope.touches(&[]));
    }

    #[test]
    fn test_overlap_requires_shared_import() {
        let movies = JobScope::of(&[retrieval("nas/a", media_types::MOVIE)]);
        let episodes = JobScope::of(&[retrieval("nas/a", media_types::EPISODE)]);
        let both = JobScope::of(&[
            retrieval("nas/a", media_types::MOVIE),
            retrieval("nas/a", media_types::EPISODE),
        ]);

        assert!(!movies.overlaps(&episodes));
        assert!(movies.overlaps(&both));
        assert!(JobScope::Source.overlaps(&episodes));
    }
}
