use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key a job is scheduled under; at most one job per key is in flight
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum JobKey {
    /// Registration or full synchronization of a source
    Source(String),
    /// Synchronization of the imports below one path
    Import(String),
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(id) => write!(f, "source:{id}"),
            Self::Import(path) => write!(f, "import:{path}"),
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job has finished
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress information for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub key: JobKey,
    pub state: JobState,
    /// Kind of the task currently running
    pub task: Option<String>,
    pub processed_items: usize,
    pub total_items: usize,
    pub percentage: f32,
}

impl JobProgress {
    pub(crate) fn new(job_id: Uuid, key: JobKey, state: JobState) -> Self {
        Self {
            job_id,
            key,
            state,
            task: None,
            processed_items: 0,
            total_items: 0,
            percentage: 0.0,
        }
    }

    pub(crate) fn with_items(mut self, processed: usize, total: usize) -> Self {
        self.processed_items = processed;
        self.total_items = total;
        self.percentage = if total > 0 {
            (processed as f32 / total as f32) * 100.0
        } else {
            0.0
        };
        self
    }
}

/// Snapshot of a job known to the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub key: JobKey,
    pub source_id: String,
    pub state: JobState,
    pub pending_tasks: usize,
}
