//! Repeating timer scheduler.
//!
//! Each task scheduled with [`TimerScheduler::schedule_repeating`] runs on
//! its own tokio task driven by a [`tokio::time::Interval`]. The first run
//! happens one full period after scheduling. Runs never overlap: a slow run
//! delays the next tick instead of bursting to catch up.
//!
//! # Task lifecycle
//!
//! ```text
//! Active  -->  Cancelled   (cancel / shutdown / drop)
//! ```
//!
//! Cancelled tasks stay visible through [`TimerScheduler::status`] so callers
//! can read their final run count.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::error::{Result, SessionError};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Unique, time-ordered task identifier (UUID v7).
pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Active,
    Cancelled,
}

/// Metadata snapshot of a task visible to external callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub period: Duration,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub runs: u64,
}

/// Counters shared between a task's driver and the scheduler.
#[derive(Default)]
struct RunStats {
    runs: AtomicU64,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
}

struct ScheduledTask {
    seq: u64,
    name: String,
    period: Duration,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    stats: Arc<RunStats>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    fn info(&self, id: TaskId) -> TaskInfo {
        TaskInfo {
            id,
            name: self.name.clone(),
            period: self.period,
            status: self.status,
            created_at: self.created_at,
            last_run_at: *self
                .stats
                .last_run_at
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
            runs: self.stats.runs.load(Ordering::Acquire),
        }
    }

    fn cancel(&mut self) {
        self.handle.abort();
        self.status = TaskStatus::Cancelled;
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owner of cancellable repeating tasks.
///
/// All tasks are aborted on [`TimerScheduler::shutdown`] or when the
/// scheduler is dropped.
pub struct TimerScheduler {
    tasks: DashMap<TaskId, ScheduledTask>,
    next_seq: AtomicU64,
    shutdown: AtomicBool,
}

impl TimerScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            next_seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Run `work` every `period` until cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_repeating<F, Fut>(
        &self,
        name: impl Into<String>,
        period: Duration,
        work: F,
    ) -> Result<TaskId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SessionError::SchedulerShutdown);
        }
        let name = name.into();
        if period.is_zero() {
            return Err(SessionError::InvalidPeriod { name });
        }

        let id = Uuid::now_v7();
        let stats = Arc::new(RunStats::default());
        let driver_stats = Arc::clone(&stats);
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tracing::trace!(task_id = %id, task_name = %task_name, "timer fired");
                work().await;
                *driver_stats
                    .last_run_at
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
                driver_stats.runs.fetch_add(1, Ordering::AcqRel);
            }
        });

        tracing::debug!(task_id = %id, task_name = %name, ?period, "repeating task scheduled");
        self.tasks.insert(
            id,
            ScheduledTask {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                name,
                period,
                status: TaskStatus::Active,
                created_at: Utc::now(),
                stats,
                handle,
            },
        );
        Ok(id)
    }

    /// Stop a task. Cancelling an already cancelled task is a no-op.
    pub fn cancel(&self, task_id: TaskId) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SessionError::TaskNotFound { task_id })?;
        if entry.status == TaskStatus::Active {
            entry.cancel();
            tracing::info!(task_id = %task_id, task_name = %entry.name, "task cancelled");
        }
        Ok(())
    }

    pub fn status(&self, task_id: TaskId) -> Result<TaskInfo> {
        self.tasks
            .get(&task_id)
            .map(|entry| entry.info(task_id))
            .ok_or(SessionError::TaskNotFound { task_id })
    }

    /// Snapshot of every known task, in scheduling order.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<(u64, TaskInfo)> = self
            .tasks
            .iter()
            .map(|entry| (entry.seq, entry.value().info(*entry.key())))
            .collect();
        tasks.sort_by_key(|(seq, _)| *seq);
        tasks.into_iter().map(|(_, info)| info).collect()
    }

    /// Cancel every task and refuse new ones.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for mut entry in self.tasks.iter_mut() {
            if entry.status == TaskStatus::Active {
                entry.cancel();
            }
        }
        tracing::info!(tasks = self.tasks.len(), "scheduler shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
