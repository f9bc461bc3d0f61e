//! Horizontal join of the mined tables of a cell line into one wide table.

use std::path::Path;
use std::time::Instant;

use camino::Utf8Path;
use csv::{ReaderBuilder, WriterBuilder};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{Phase, ProgressEvent, ProgressSink};
use crate::domain::RegionKey;
use crate::error::MinerError;
use crate::executor::Executor;
use crate::fs_util::{self, GzFileWriter};
use crate::merge::KEY_COLUMNS;
use crate::planner::GroupKey;
use crate::statistics::{self, format_value};
use crate::store::{self, Store};

/// A mined per-group table loaded in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MinedTable {
    pub feature: String,
    pub columns: Vec<String>,
    pub keys: Vec<RegionKey>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl MinedTable {
    pub fn read(path: &Utf8Path) -> Result<Self, MinerError> {
        let malformed = |message: String| MinerError::MalformedTable {
            path: path.as_std_path().to_path_buf(),
            message,
        };
        let reader = fs_util::open_gz(path.as_std_path())?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|err| malformed(err.to_string()))?
            .clone();
        let leading = headers.iter().take(KEY_COLUMNS.len()).collect::<Vec<_>>();
        if leading != KEY_COLUMNS {
            return Err(malformed(format!(
                "expected leading columns {}",
                KEY_COLUMNS.join(", ")
            )));
        }
        let columns = headers
            .iter()
            .skip(KEY_COLUMNS.len())
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut keys = Vec::new();
        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|err| malformed(err.to_string()))?;
            let key = RegionKey::from_fields(&record[0], &record[1], &record[2], &record[3])
                .map_err(|err| malformed(format!("row {}: {err}", index + 1)))?;
            let values = record
                .iter()
                .skip(KEY_COLUMNS.len())
                .map(statistics::parse_value)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| malformed(format!("row {}: {err}", index + 1)))?;
            keys.push(key);
            rows.push(values);
        }

        Ok(Self {
            feature: store::feature_name(path),
            columns,
            keys,
            rows,
        })
    }
}

/// Mined tables of one cell line side by side, sharing one region index.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub keys: Vec<RegionKey>,
    /// Flattened `(feature, statistic)` pairs, written as `feature.statistic`.
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl WideTable {
    /// Joins `tables` column-wise. Every table must list the same regions in
    /// the same order.
    pub fn join(cell_line: &str, tables: Vec<MinedTable>) -> Result<Self, MinerError> {
        let mut tables = tables.into_iter();
        let Some(first) = tables.next() else {
            return Ok(Self {
                keys: Vec::new(),
                columns: Vec::new(),
                rows: Vec::new(),
            });
        };

        let mut wide = Self {
            columns: prefixed(&first),
            keys: first.keys,
            rows: first.rows,
        };
        for table in tables {
            if table.keys.len() != wide.keys.len() {
                return Err(MinerError::MisalignedTables {
                    cell_line: cell_line.to_string(),
                    detail: format!(
                        "{} has {} rows, expected {}",
                        table.feature,
                        table.keys.len(),
                        wide.keys.len()
                    ),
                });
            }
            if let Some(row) = wide
                .keys
                .iter()
                .zip(&table.keys)
                .position(|(left, right)| left != right)
            {
                return Err(MinerError::MisalignedTables {
                    cell_line: cell_line.to_string(),
                    detail: format!(
                        "{} row {}: {} vs {}",
                        table.feature,
                        row + 1,
                        table.keys[row],
                        wide.keys[row]
                    ),
                });
            }
            wide.columns.extend(prefixed(&table));
            for (row, values) in wide.rows.iter_mut().zip(table.rows) {
                row.extend(values);
            }
        }
        Ok(wide)
    }

    pub fn header(&self) -> Vec<String> {
        KEY_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .chain(
                self.columns
                    .iter()
                    .map(|(feature, statistic)| format!("{feature}.{statistic}")),
            )
            .collect()
    }

    /// Writes a comma-separated gzip table, values rounded to two decimals.
    pub fn write(&self, path: &Path) -> Result<(), MinerError> {
        let csv_error = |err: csv::Error| {
            MinerError::Filesystem(format!("write {}: {err}", path.display()))
        };
        let mut writer = WriterBuilder::new()
            .delimiter(b',')
            .from_writer(GzFileWriter::create(path)?);
        writer.write_record(self.header()).map_err(csv_error)?;
        for (key, values) in self.keys.iter().zip(&self.rows) {
            let mut record = vec![
                key.chrom.clone(),
                key.chrom_start.to_string(),
                key.chrom_end.to_string(),
                key.strand.to_string(),
            ];
            record.extend(values.iter().map(|value| match value {
                Some(value) => format_value(Some(round2(*value))),
                None => String::new(),
            }));
            writer.write_record(&record).map_err(csv_error)?;
        }
        let inner = writer
            .into_inner()
            .map_err(|err| MinerError::Filesystem(err.error().to_string()))?;
        inner.commit()
    }
}

fn prefixed(table: &MinedTable) -> Vec<(String, String)> {
    table
        .columns
        .iter()
        .map(|column| (table.feature.clone(), column.clone()))
        .collect()
}

/// Two decimals, ties to even.
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TableStatus {
    Written { rows: usize, columns: usize },
    /// The table was already there.
    Skipped,
    /// No group of the metadata belongs to the cell line.
    Missing,
    /// Some expected mined tables are absent, so no table was written.
    Incomplete { missing: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub cell_line: String,
    pub path: String,
    #[serde(flatten)]
    pub status: TableStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConcatReport {
    pub tables: Vec<TableReport>,
}

impl ConcatReport {
    pub fn written(&self) -> usize {
        self.tables
            .iter()
            .filter(|table| matches!(table.status, TableStatus::Written { .. }))
            .count()
    }
}

/// Mined tables that make up one concatenated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    pub cell_line: String,
    /// Mined table names, sorted, which is also the column order.
    pub features: Vec<String>,
}

impl TableRequest {
    /// One request per cell line, in the given order, from the groups the
    /// metadata selects.
    pub fn from_groups(cell_lines: &[String], groups: &[GroupKey]) -> Vec<Self> {
        cell_lines
            .iter()
            .map(|cell_line| {
                let mut features = groups
                    .iter()
                    .filter(|group| &group.cell_line == cell_line)
                    .map(GroupKey::name)
                    .collect::<Vec<_>>();
                features.sort();
                features.dedup();
                Self {
                    cell_line: cell_line.clone(),
                    features,
                }
            })
            .collect()
    }
}

/// Builds `<targets>/<cell_line>.csv.gz` for every request that lacks one.
///
/// A table is only written when every requested mined table exists, so a
/// group lost to corruption never yields a table missing its columns.
pub fn concatenate(
    store: &Store,
    requests: &[TableRequest],
    executor: &Executor,
    sink: &dyn ProgressSink,
) -> Result<ConcatReport, MinerError> {
    let started = Instant::now();
    let total = requests.len();
    let mut reports = Vec::with_capacity(total);

    for (index, request) in requests.iter().enumerate() {
        let cell_line = &request.cell_line;
        let path = store.table_path(cell_line);
        let status = if store.exists(&path) {
            TableStatus::Skipped
        } else if request.features.is_empty() {
            warn!(cell_line = %cell_line, "no group to concatenate");
            TableStatus::Missing
        } else {
            let (mined, missing): (Vec<_>, Vec<_>) = request
                .features
                .iter()
                .map(|feature| (feature, store.mined_path(cell_line, feature)))
                .partition(|(_, mined)| store.exists(mined));
            if !missing.is_empty() {
                let missing = missing
                    .into_iter()
                    .map(|(feature, _)| feature.clone())
                    .collect::<Vec<_>>();
                warn!(
                    cell_line = %cell_line,
                    missing = %missing.join(", "),
                    "mined tables absent; run mine again first"
                );
                TableStatus::Incomplete { missing }
            } else {
                let tables = executor.install(mined.len(), || {
                    mined
                        .par_iter()
                        .map(|(_, path)| MinedTable::read(path))
                        .collect::<Result<Vec<_>, _>>()
                })??;
                let wide = WideTable::join(cell_line, tables)?;
                wide.write(path.as_std_path())?;
                info!(
                    cell_line = %cell_line,
                    rows = wide.keys.len(),
                    columns = wide.columns.len(),
                    "concatenated"
                );
                TableStatus::Written {
                    rows: wide.keys.len(),
                    columns: wide.columns.len(),
                }
            }
        };

        sink.event(ProgressEvent {
            phase: Phase::Concatenate,
            message: cell_line.clone(),
            completed: Some((index + 1, total)),
            elapsed: Some(started.elapsed()),
        });
        reports.push(TableReport {
            cell_line: cell_line.clone(),
            path: path.to_string(),
            status,
        });
    }

    Ok(ConcatReport { tables: reports })
}
