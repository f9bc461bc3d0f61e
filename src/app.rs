use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::concatenate::{self, TableReport, TableRequest};
use crate::config::ResolvedConfig;
use crate::error::MinerError;
use crate::executor::{Executor, TaskReport};
use crate::metadata::MetadataTable;
use crate::planner::{self, MiningTask, Plan, PlanRequest};
use crate::store::{self, Store};

#[derive(Debug, Clone, Serialize)]
pub struct PlannedTask {
    pub cell_line: String,
    pub name: String,
    pub target: String,
    pub sources: Vec<String>,
}

impl From<&MiningTask> for PlannedTask {
    fn from(task: &MiningTask) -> Self {
        Self {
            cell_line: task.group.cell_line.clone(),
            name: task.group.name(),
            target: task.target.to_string(),
            sources: task.sources.iter().map(|path| path.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub tasks: Vec<PlannedTask>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MineResult {
    pub planned: usize,
    pub skipped: usize,
    /// Every group was already mined.
    pub nothing_to_do: bool,
    pub mined: usize,
    pub corrupted: usize,
    pub tasks: Vec<TaskReport>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConcatResult {
    pub written: usize,
    pub tables: Vec<TableReport>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub targets: String,
    pub cell_lines: Vec<CellLineStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellLineStatus {
    pub cell_line: String,
    pub mined: Vec<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Mine,
    Concatenate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Mine,
    Concatenate,
    Done,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Plan => "Plan",
            Phase::Mine => "Mine",
            Phase::Concatenate => "Concat",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    /// `(done, total)` units of the current phase.
    pub completed: Option<(usize, usize)>,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn phase(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            completed: None,
            elapsed: None,
        }
    }
}

/// Receives progress from worker threads, hence `Sync`.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct App {
    store: Store,
    config: ResolvedConfig,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        let store = Store::new(config.sources.clone(), config.targets.clone());
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn executor(&self) -> Executor {
        Executor::new(self.config.workers)
    }

    fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            cell_lines: self.config.cell_lines.clone(),
            assembly: self.config.assembly.clone(),
            grouping: self.config.grouping,
            statistics: self.config.statistics,
        }
    }

    fn build_plan(&self, sink: &dyn ProgressSink) -> Result<Plan, MinerError> {
        if self.config.cell_lines.is_empty() {
            return Err(MinerError::NoCellLines);
        }
        sink.event(ProgressEvent::phase(
            Phase::Plan,
            format!("reading {}", self.config.metadata.display()),
        ));
        let metadata = MetadataTable::from_path(&self.config.metadata)?;
        let plan = planner::plan(&metadata, &self.plan_request(), &self.store);
        sink.event(ProgressEvent::phase(
            Phase::Plan,
            format!(
                "{} groups to mine, {} already mined",
                plan.tasks.len(),
                plan.skipped.len()
            ),
        ));
        Ok(plan)
    }

    /// Work that `mine` would do, without doing it.
    pub fn plan(&self, sink: &dyn ProgressSink) -> Result<PlanResult, MinerError> {
        let plan = self.build_plan(sink)?;
        sink.event(ProgressEvent::phase(Phase::Done, "planned"));
        Ok(PlanResult {
            tasks: plan.tasks.iter().map(PlannedTask::from).collect(),
            skipped: plan.skipped.len(),
        })
    }

    pub fn mine(&self, sink: &dyn ProgressSink) -> Result<MineResult, MinerError> {
        let plan = self.build_plan(sink)?;
        let planned = plan.tasks.len();
        let skipped = plan.skipped.len();

        if plan.tasks.is_empty() {
            warn!(
                cell_lines = %self.config.cell_lines.join(", "),
                "no epigenome still to be mined"
            );
            sink.event(ProgressEvent::phase(Phase::Done, "nothing to do"));
            return Ok(MineResult {
                planned,
                skipped,
                nothing_to_do: true,
                mined: 0,
                corrupted: 0,
                tasks: Vec::new(),
                finished_at: iso_timestamp(),
            });
        }

        self.store.ensure_targets_root()?;
        let started = Instant::now();
        let report = self
            .executor()
            .run(&plan.tasks, &self.config.merge, sink)?;
        info!(
            mined = report.mined(),
            corrupted = report.corrupted(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mining finished"
        );
        sink.event(ProgressEvent {
            phase: Phase::Done,
            message: format!(
                "{} mined, {} corrupted",
                report.mined(),
                report.corrupted()
            ),
            completed: Some((planned, planned)),
            elapsed: Some(started.elapsed()),
        });

        Ok(MineResult {
            planned,
            skipped,
            nothing_to_do: false,
            mined: report.mined(),
            corrupted: report.corrupted(),
            tasks: report.tasks,
            finished_at: iso_timestamp(),
        })
    }

    pub fn concatenate(&self, sink: &dyn ProgressSink) -> Result<ConcatResult, MinerError> {
        if self.config.cell_lines.is_empty() {
            return Err(MinerError::NoCellLines);
        }
        sink.event(ProgressEvent::phase(
            Phase::Concatenate,
            format!("{} cell lines", self.config.cell_lines.len()),
        ));
        let metadata = MetadataTable::from_path(&self.config.metadata)?;
        let groups = planner::groups(&metadata, &self.plan_request());
        let requests = TableRequest::from_groups(&self.config.cell_lines, &groups);
        let report =
            concatenate::concatenate(&self.store, &requests, &self.executor(), sink)?;
        sink.event(ProgressEvent::phase(
            Phase::Done,
            format!("{} tables written", report.written()),
        ));
        Ok(ConcatResult {
            written: report.written(),
            tables: report.tables,
            finished_at: iso_timestamp(),
        })
    }

    /// Mined tables and concatenated tables present on disk, for the
    /// configured cell lines and any other found under the targets root.
    pub fn status(&self, sink: &dyn ProgressSink) -> Result<StatusResult, MinerError> {
        sink.event(ProgressEvent::phase(
            Phase::Plan,
            format!("scanning {}", self.store.targets_root()),
        ));
        let mut cell_lines = self.config.cell_lines.clone();
        for found in self.store.list_cell_lines()? {
            if !cell_lines.contains(&found) {
                cell_lines.push(found);
            }
        }

        let mut entries = Vec::with_capacity(cell_lines.len());
        for cell_line in cell_lines {
            let mined = self
                .store
                .list_mined(&cell_line)?
                .iter()
                .map(|path| store::feature_name(path))
                .collect();
            let table = self.store.table_path(&cell_line);
            entries.push(CellLineStatus {
                table: self.store.exists(&table).then(|| table.to_string()),
                cell_line,
                mined,
            });
        }
        sink.event(ProgressEvent::phase(Phase::Done, "scanned"));

        Ok(StatusResult {
            targets: self.store.targets_root().to_string(),
            cell_lines: entries,
        })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
