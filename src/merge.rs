//! Lockstep merge of replicate signal files into one mined table.
//!
//! Every source lists the same regions in the same order. Rows are zipped by
//! position, the score tails are averaged column by column across sources,
//! and the averaged vector is reduced with each enabled statistic.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::{AggregatedRecord, SignalRecord, StatisticsConfig};
use crate::error::MinerError;
use crate::fs_util::{self, GzFileWriter, GzReader};
use crate::statistics::{self, average_columns, missing_fraction, reduce};

pub const KEY_COLUMNS: [&str; 4] = ["chrom", "chromStart", "chromEnd", "strand"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOptions {
    /// Largest fraction of missing entries an averaged vector may hold and
    /// still be reduced. `1.0` only rejects fully missing vectors.
    pub missing_threshold: f64,
    /// Compare region keys across sources and fail on the first mismatch.
    pub verify_alignment: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            missing_threshold: 1.0,
            verify_alignment: cfg!(debug_assertions),
        }
    }
}

impl MergeOptions {
    pub fn validate(self) -> Result<Self, MinerError> {
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(MinerError::InvalidThreshold(self.missing_threshold.to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Written { rows: usize },
    /// A source could not be read to the end. No output was written; what to
    /// do with the sources is up to the caller.
    Corrupted { sources: Vec<PathBuf>, reason: String },
}

struct SourceStream<'a> {
    path: &'a Path,
    reader: GzReader,
    line: String,
    line_number: usize,
}

enum Advance {
    Row,
    Exhausted,
    Corrupted(String),
}

impl<'a> SourceStream<'a> {
    fn open(path: &'a Path) -> Result<Self, MinerError> {
        Ok(Self {
            path,
            reader: fs_util::open_gz(path)?,
            line: String::new(),
            line_number: 0,
        })
    }

    fn advance(&mut self) -> Result<Advance, MinerError> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => Ok(Advance::Exhausted),
            Ok(_) => {
                self.line_number += 1;
                Ok(Advance::Row)
            }
            Err(err) if fs_util::is_corruption(&err) => Ok(Advance::Corrupted(format!(
                "{}: {err} after line {}",
                self.path.display(),
                self.line_number
            ))),
            Err(err) => Err(MinerError::Filesystem(format!(
                "read {}: {err}",
                self.path.display()
            ))),
        }
    }
}

/// Header line of a mined file, newline included.
pub fn header(statistics: &StatisticsConfig) -> String {
    let mut columns = KEY_COLUMNS.to_vec();
    columns.extend(statistics.enabled().map(|statistic| statistic.as_str()));
    format!("{}\n", columns.join("\t"))
}

/// Reduces the aligned score tails of one region.
pub fn summarize(
    tails: &[Vec<Option<f64>>],
    statistics: &StatisticsConfig,
    missing_threshold: f64,
) -> Vec<Option<f64>> {
    let averaged = average_columns(tails);
    let undefined = averaged.iter().all(Option::is_none)
        || missing_fraction(&averaged) > missing_threshold;
    if undefined {
        return vec![None; statistics.len()];
    }
    statistics
        .enabled()
        .map(|statistic| reduce(statistic, &averaged))
        .collect()
}

/// Merges `sources` into a gzip table at `target`.
///
/// Read errors that look like damaged archives are reported as
/// [`MergeOutcome::Corrupted`]. A row that decompresses but does not parse is
/// [`MinerError::MalformedSource`], and any other I/O failure is an error.
pub fn merge_sources<P: AsRef<Path>>(
    sources: &[P],
    target: &Path,
    statistics: &StatisticsConfig,
    options: &MergeOptions,
) -> Result<MergeOutcome, MinerError> {
    if sources.is_empty() {
        return Err(MinerError::EmptyGroup(target.to_path_buf()));
    }

    let mut streams = sources
        .iter()
        .map(|path| SourceStream::open(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let mut writer = GzFileWriter::create(target)?;
    write_text(&mut writer, &header(statistics))?;

    let mut rows = 0usize;
    loop {
        let mut exhausted = 0usize;
        for stream in streams.iter_mut() {
            match stream.advance()? {
                Advance::Row => {}
                Advance::Exhausted => exhausted += 1,
                Advance::Corrupted(reason) => {
                    return Ok(MergeOutcome::Corrupted {
                        sources: owned_paths(sources),
                        reason,
                    });
                }
            }
        }
        if exhausted == streams.len() {
            break;
        }
        if exhausted > 0 {
            warn!(
                output = %target.display(),
                rows,
                "sources have different lengths; stopping at the shortest"
            );
            break;
        }

        let mut records = Vec::with_capacity(streams.len());
        for stream in &streams {
            let record = SignalRecord::parse(&stream.line).map_err(|err| {
                MinerError::MalformedSource {
                    path: stream.path.to_path_buf(),
                    line: stream.line_number,
                    message: err.to_string(),
                }
            })?;
            records.push(record);
        }

        if options.verify_alignment {
            check_alignment(&records, &streams, rows)?;
        }

        let mut records = records.into_iter();
        let first = records
            .next()
            .ok_or_else(|| MinerError::EmptyGroup(target.to_path_buf()))?;
        let mut tails = Vec::with_capacity(streams.len());
        tails.push(first.scores);
        tails.extend(records.map(|record| record.scores));

        let aggregated = AggregatedRecord {
            key: first.key,
            values: summarize(&tails, statistics, options.missing_threshold),
        };
        write_text(&mut writer, &format_row(&aggregated))?;
        rows += 1;
    }

    writer.commit()?;
    debug!(output = %target.display(), rows, sources = sources.len(), "mined");
    Ok(MergeOutcome::Written { rows })
}

fn check_alignment(
    records: &[SignalRecord],
    streams: &[SourceStream<'_>],
    row: usize,
) -> Result<(), MinerError> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    for (record, stream) in records.iter().zip(streams).skip(1) {
        if record.key != first.key {
            return Err(MinerError::MisalignedSources {
                row,
                expected: first.key.to_string(),
                found: record.key.to_string(),
                path: stream.path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn owned_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    paths.iter().map(|path| path.as_ref().to_path_buf()).collect()
}

fn format_row(record: &AggregatedRecord) -> String {
    let mut line = format!(
        "{}\t{}\t{}\t{}",
        record.key.chrom, record.key.chrom_start, record.key.chrom_end, record.key.strand
    );
    for value in &record.values {
        line.push('\t');
        line.push_str(&statistics::format_value(*value));
    }
    line.push('\n');
    line
}

fn write_text(writer: &mut GzFileWriter, text: &str) -> Result<(), MinerError> {
    writer.write_all(text.as_bytes()).map_err(|err| {
        MinerError::Filesystem(format!("write {}: {err}", writer.target().display()))
    })
}
