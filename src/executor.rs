use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{Phase, ProgressEvent, ProgressSink};
use crate::error::MinerError;
use crate::fs_util;
use crate::merge::{self, MergeOptions, MergeOutcome};
use crate::planner::MiningTask;

/// Requested pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Workers {
    /// One thread per available core.
    #[default]
    All,
    Fixed(NonZeroUsize),
}

impl Workers {
    /// `-1` means every available core, like `all`.
    pub fn from_count(count: i64) -> Result<Self, MinerError> {
        if count == -1 {
            return Ok(Workers::All);
        }
        usize::try_from(count)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Workers::Fixed)
            .ok_or_else(|| MinerError::InvalidWorkerCount(count.to_string()))
    }

    /// Threads to spawn for `tasks` units given `available` cores. Never more
    /// threads than units, never fewer than one.
    pub fn resolve(self, available: usize, tasks: usize) -> usize {
        let requested = match self {
            Workers::All => available,
            Workers::Fixed(count) => count.get(),
        };
        requested.min(tasks).max(1)
    }
}

impl fmt::Display for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workers::All => write!(f, "all"),
            Workers::Fixed(count) => write!(f, "{count}"),
        }
    }
}

impl FromStr for Workers {
    type Err = MinerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Workers::All);
        }
        let count = trimmed
            .parse::<i64>()
            .map_err(|_| MinerError::InvalidWorkerCount(value.to_string()))?;
        Self::from_count(count)
    }
}

pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    Mined { rows: usize },
    Corrupted { sources: Vec<String>, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub cell_line: String,
    pub name: String,
    pub target: String,
    #[serde(flatten)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn mined(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| matches!(task.status, TaskStatus::Mined { .. }))
            .count()
    }

    pub fn corrupted(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| matches!(task.status, TaskStatus::Corrupted { .. }))
            .count()
    }
}

/// Fixed-size worker pool running mining tasks to completion.
#[derive(Debug, Clone)]
pub struct Executor {
    workers: Workers,
    available: usize,
}

impl Executor {
    pub fn new(workers: Workers) -> Self {
        Self {
            workers,
            available: available_parallelism(),
        }
    }

    /// Overrides the detected core count.
    pub fn with_available_parallelism(mut self, available: usize) -> Self {
        self.available = available.max(1);
        self
    }

    pub fn threads_for(&self, tasks: usize) -> usize {
        self.workers.resolve(self.available, tasks)
    }

    /// Runs `f` inside a pool sized for `tasks` units and waits for it.
    pub fn install<T, F>(&self, tasks: usize, f: F) -> Result<T, MinerError>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        let pool = self.build_pool(tasks)?;
        Ok(pool.install(f))
    }

    fn build_pool(&self, tasks: usize) -> Result<ThreadPool, MinerError> {
        ThreadPoolBuilder::new()
            .num_threads(self.threads_for(tasks))
            .thread_name(|index| format!("epimine-{index}"))
            .build()
            .map_err(|err| MinerError::ThreadPool(err.to_string()))
    }

    /// Runs every task once. A corrupted task has its sources removed and is
    /// reported; it does not stop the others. All tasks have finished when
    /// this returns; the first hard failure, if any, is returned then.
    pub fn run(
        &self,
        tasks: &[MiningTask],
        options: &MergeOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, MinerError> {
        let total = tasks.len();
        if total == 0 {
            return Ok(RunReport::default());
        }

        let started = Instant::now();
        let threads = self.threads_for(total);
        info!(tasks = total, threads, "mining");
        let completed = AtomicUsize::new(0);

        let outcomes = self.install(total, || {
            tasks
                .par_iter()
                .map(|task| {
                    let outcome = execute(task, options);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    sink.event(ProgressEvent {
                        phase: Phase::Mine,
                        message: format!("{}/{}", task.group.cell_line, task.group.name()),
                        completed: Some((done, total)),
                        elapsed: Some(started.elapsed()),
                    });
                    outcome
                })
                .collect::<Vec<_>>()
        })?;

        let tasks = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(RunReport { tasks })
    }
}

fn execute(task: &MiningTask, options: &MergeOptions) -> Result<TaskReport, MinerError> {
    let outcome = merge::merge_sources(
        &task.sources,
        task.target.as_std_path(),
        &task.statistics,
        options,
    )?;
    let status = match outcome {
        MergeOutcome::Written { rows } => TaskStatus::Mined { rows },
        MergeOutcome::Corrupted { sources, reason } => {
            let listed = sources
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>();
            warn!(
                group = %task.target,
                sources = %listed.join(", "),
                %reason,
                "corrupted source; removing the group's sources so they are fetched again"
            );
            for (path, err) in fs_util::discard_files(&sources) {
                warn!(path = %path.display(), %err, "failed to remove corrupted source");
            }
            TaskStatus::Corrupted {
                sources: listed,
                reason,
            }
        }
    };
    Ok(TaskReport {
        cell_line: task.group.cell_line.clone(),
        name: task.group.name(),
        target: task.target.to_string(),
        status,
    })
}
