//! Bounded pools for relay calls
//!
//! Relay calls can take minutes. Each kind of work runs under its own
//! semaphore so a burst of spreadsheets cannot starve text questions and
//! neither can flood the downstream API.

use crate::config::Settings;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

/// A named, fixed-size pool of permits
#[derive(Debug)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    permits: Semaphore,
}

impl WorkerPool {
    /// Creates a pool with `size` permits (at least one).
    #[must_use]
    pub fn new(name: &'static str, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name,
            size,
            permits: Semaphore::new(size),
        }
    }

    /// Waits for a free slot. The pool is never closed, so `None` only
    /// appears if that changes.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        let permit = self.permits.acquire().await.ok();
        debug!(
            "{} pool: {}/{} slots busy",
            self.name,
            self.size - self.permits.available_permits(),
            self.size
        );
        permit
    }

    /// Runs `work` while holding a slot.
    pub async fn run<F: Future>(&self, work: F) -> F::Output {
        let _permit = self.acquire().await;
        work.await
    }

    /// Configured number of slots.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// The pools used by the dispatcher
#[derive(Debug, Clone)]
pub struct WorkerPools {
    /// Text relay calls
    pub text: Arc<WorkerPool>,
    /// Spreadsheet relay calls
    pub spreadsheet: Arc<WorkerPool>,
    /// Cap on concurrent spreadsheet relay operations
    pub spreadsheet_limiter: Arc<WorkerPool>,
}

impl WorkerPools {
    /// Sizes the pools from settings.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            text: Arc::new(WorkerPool::new("text_worker", settings.text_workers)),
            spreadsheet: Arc::new(WorkerPool::new("excel_worker", settings.excel_workers)),
            spreadsheet_limiter: Arc::new(WorkerPool::new(
                "excel_limiter",
                settings.excel_concurrency,
            )),
        }
    }

    /// Runs a spreadsheet relay call holding both the limiter and a pool slot.
    pub async fn run_spreadsheet<F: Future>(&self, work: F) -> F::Output {
        let _limit = self.spreadsheet_limiter.acquire().await;
        self.spreadsheet.run(work).await
    }
}
