use std::collections::HashMap;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::domain::{Grouping, StatisticsConfig};
use crate::metadata::{MetadataRecord, MetadataTable};
use crate::store::Store;

/// Target label used upstream when the measured factor is not known.
pub const UNKNOWN_TARGET: &str = "Unknown";

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._+-]+").expect("valid pattern"));

/// Replicates sharing a key are merged into one mined table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey {
    pub cell_line: String,
    pub assay: Option<String>,
    pub target: String,
}

impl GroupKey {
    fn from_record(record: &MetadataRecord, grouping: Grouping) -> Self {
        let assay = record.assay_term_name.clone();
        match grouping {
            Grouping::Target => {
                // An unknown target is told apart by its assay instead.
                let target = if record.target == UNKNOWN_TARGET {
                    assay.unwrap_or_else(|| UNKNOWN_TARGET.to_string())
                } else {
                    record.target.clone()
                };
                Self {
                    cell_line: record.cell_line.clone(),
                    assay: None,
                    target,
                }
            }
            Grouping::AssayTarget => Self {
                cell_line: record.cell_line.clone(),
                assay: Some(assay.unwrap_or_else(|| UNKNOWN_TARGET.to_string())),
                target: record.target.clone(),
            },
        }
    }

    /// File stem of the mined table for this group.
    pub fn name(&self) -> String {
        let raw = match &self.assay {
            None => self.target.clone(),
            Some(assay) if self.target == UNKNOWN_TARGET => assay.clone(),
            Some(assay) => format!("{assay}.{}", self.target),
        };
        sanitize(&raw)
    }
}

pub fn sanitize(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name.trim(), "_").into_owned()
}

/// One unit of mining work: every replicate of a group and where the merged
/// table goes.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningTask {
    pub group: GroupKey,
    pub sources: Vec<Utf8PathBuf>,
    pub target: Utf8PathBuf,
    pub statistics: StatisticsConfig,
}

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub cell_lines: Vec<String>,
    pub assembly: Option<String>,
    pub grouping: Grouping,
    pub statistics: StatisticsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub tasks: Vec<MiningTask>,
    /// Groups left out because their mined table already exists.
    pub skipped: Vec<GroupKey>,
}

/// Builds the work list for `request`. Groups keep the order in which they
/// first appear in the table, and sources keep table order. Nothing is
/// written to disk.
pub fn plan(metadata: &MetadataTable, request: &PlanRequest, store: &Store) -> Plan {
    let mut result = Plan::default();
    for (key, sources) in group_sources(metadata, request, store) {
        let target = store.mined_path(&key.cell_line, &key.name());
        if store.exists(&target) {
            debug!(group = %target, "already mined");
            result.skipped.push(key);
            continue;
        }
        result.tasks.push(MiningTask {
            group: key,
            sources,
            target,
            statistics: request.statistics,
        });
    }
    result
}

/// Every group `request` selects, mined or not, in first-appearance order.
pub fn groups(metadata: &MetadataTable, request: &PlanRequest) -> Vec<GroupKey> {
    let mut order = Vec::<GroupKey>::new();
    for record in eligible(metadata, request) {
        let key = GroupKey::from_record(record, request.grouping);
        if !order.contains(&key) {
            order.push(key);
        }
    }
    order
}

fn group_sources(
    metadata: &MetadataTable,
    request: &PlanRequest,
    store: &Store,
) -> Vec<(GroupKey, Vec<Utf8PathBuf>)> {
    let mut order = Vec::<GroupKey>::new();
    let mut groups = HashMap::<GroupKey, Vec<Utf8PathBuf>>::new();
    for record in eligible(metadata, request) {
        let key = GroupKey::from_record(record, request.grouping);
        let source = store.source_path(&record.accession);
        let sources = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    order
        .into_iter()
        .map(|key| {
            let sources = groups.remove(&key).unwrap_or_default();
            (key, sources)
        })
        .collect()
}

fn eligible<'a>(
    metadata: &'a MetadataTable,
    request: &'a PlanRequest,
) -> impl Iterator<Item = &'a MetadataRecord> + 'a {
    metadata
        .records()
        .iter()
        .filter(|record| request.cell_lines.contains(&record.cell_line))
        .filter(|record| matches_assembly(record, request.assembly.as_deref()))
}

fn matches_assembly(record: &MetadataRecord, assembly: Option<&str>) -> bool {
    match (assembly, record.assembly.as_deref()) {
        (Some(requested), Some(actual)) => requested.eq_ignore_ascii_case(actual),
        _ => true,
    }
}
