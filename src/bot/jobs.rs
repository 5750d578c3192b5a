//! In-memory bookkeeping of text and spreadsheet jobs
//!
//! Records exist only for `/status`. They are keyed by the chat and
//! message that started the job and live until the process restarts or
//! the history limit evicts them.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifies the request message a job was started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId {
    /// Chat the request came from
    pub chat_id: i64,
    /// Message that carried the request
    pub message_id: i32,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.message_id)
    }
}

/// What a job relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// A single free-text question
    Text,
    /// An uploaded spreadsheet
    Spreadsheet {
        /// Name of the uploaded file
        filename: String,
    },
}

/// Lifecycle of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The relay call has not returned yet
    Processing,
    /// The relay call returned, successfully or not
    Completed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
        })
    }
}

/// One tracked job
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Request the job belongs to
    pub id: JobId,
    /// Text or spreadsheet
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// When processing began
    pub started_at: DateTime<Utc>,
    /// When processing ended
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Time spent so far, or in total once the job completed.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    /// Filename of a spreadsheet job.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        match &self.kind {
            JobKind::Text => None,
            JobKind::Spreadsheet { filename } => Some(filename),
        }
    }
}

/// Point-in-time copy of both job tables, each ordered by start time
#[derive(Debug, Clone, Default)]
pub struct JobSnapshot {
    /// Text jobs
    pub text: Vec<JobRecord>,
    /// Spreadsheet jobs
    pub spreadsheets: Vec<JobRecord>,
}

impl JobSnapshot {
    /// `true` when no job was ever recorded (or all were evicted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.spreadsheets.is_empty()
    }
}

#[derive(Default)]
struct Tables {
    text: HashMap<JobId, JobRecord>,
    spreadsheets: HashMap<JobId, JobRecord>,
}

impl Tables {
    fn table_mut(&mut self, kind: &JobKind) -> &mut HashMap<JobId, JobRecord> {
        match kind {
            JobKind::Text => &mut self.text,
            JobKind::Spreadsheet { .. } => &mut self.spreadsheets,
        }
    }
}

/// Tracks job records and the background tasks running them
pub struct JobTracker {
    tables: Mutex<Tables>,
    handles: Mutex<HashMap<JobId, JoinHandle<()>>>,
    history_limit: usize,
}

impl JobTracker {
    /// Creates an empty tracker keeping at most `history_limit` records per table.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            handles: Mutex::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<JobId, JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a job as processing and returns a guard that marks it
    /// completed when dropped.
    pub fn begin(self: &Arc<Self>, id: JobId, kind: JobKind) -> JobGuard {
        let record = JobRecord {
            id,
            kind,
            status: JobStatus::Processing,
            started_at: Utc::now(),
            ended_at: None,
        };

        let mut tables = self.tables();
        let table = tables.table_mut(&record.kind);
        table.insert(id, record);
        evict_completed(table, self.history_limit);
        drop(tables);

        JobGuard {
            tracker: Arc::clone(self),
            id,
        }
    }

    fn complete(&self, id: JobId) {
        let mut guard = self.tables();
        let tables = &mut *guard;
        let now = Utc::now();
        for table in [&mut tables.text, &mut tables.spreadsheets] {
            if let Some(record) = table.get_mut(&id) {
                record.status = JobStatus::Completed;
                record.ended_at = Some(now);
            }
        }
    }

    /// Runs `job` as an independent background task and keeps its handle.
    pub fn spawn<F>(&self, id: JobId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(job);
        let mut handles = self.handles();
        handles.retain(|_, h| !h.is_finished());
        handles.insert(id, handle);
        debug!("Spawned job {id}, {} task(s) tracked", handles.len());
    }

    /// Number of background tasks still running.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.handles().values().filter(|h| !h.is_finished()).count()
    }

    /// Copies both tables, ordered by start time.
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        let tables = self.tables();
        let ordered = |table: &HashMap<JobId, JobRecord>| {
            let mut records: Vec<JobRecord> = table.values().cloned().collect();
            records.sort_by_key(|r| (r.started_at, r.id.message_id));
            records
        };
        JobSnapshot {
            text: ordered(&tables.text),
            spreadsheets: ordered(&tables.spreadsheets),
        }
    }

    /// Looks up a single record.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        let tables = self.tables();
        tables
            .text
            .get(&id)
            .or_else(|| tables.spreadsheets.get(&id))
            .cloned()
    }
}

fn evict_completed(table: &mut HashMap<JobId, JobRecord>, limit: usize) {
    if table.len() <= limit {
        return;
    }
    let mut completed: Vec<(DateTime<Utc>, JobId)> = table
        .values()
        .filter(|r| r.status == JobStatus::Completed)
        .map(|r| (r.started_at, r.id))
        .collect();
    completed.sort_by_key(|(started, _)| *started);

    let excess = table.len() - limit;
    for (_, id) in completed.into_iter().take(excess) {
        table.remove(&id);
    }
}

/// Marks its job completed when dropped, whatever path the job took
pub struct JobGuard {
    tracker: Arc<JobTracker>,
    id: JobId,
}

impl JobGuard {
    /// Job this guard completes.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.tracker.complete(self.id);
    }
}
