use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MinerError {
    #[error("unknown statistic: {0} (expected one of max, min, mean, median, var)")]
    #[diagnostic(help("statistic names are case-sensitive"))]
    UnknownStatistic(String),

    #[error("invalid worker count: {0}")]
    #[diagnostic(help("use a strictly positive integer, or `all` / -1 for every available core"))]
    InvalidWorkerCount(String),

    #[error("invalid missing threshold: {0}")]
    #[diagnostic(help("the threshold is a fraction between 0 and 1"))]
    InvalidThreshold(String),

    #[error("no statistic enabled")]
    #[diagnostic(help("enable at least one of max, min, mean, median, var"))]
    NoStatisticsEnabled,

    #[error("no cell line requested")]
    NoCellLines,

    #[error("invalid strand: {0}")]
    InvalidStrand(String),

    #[error("invalid grouping: {0} (expected target or assay-target)")]
    InvalidGrouping(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read metadata table at {0}")]
    MetadataRead(PathBuf),

    #[error("failed to parse metadata table: {0}")]
    MetadataParse(String),

    #[error("metadata table is missing required column: {0}")]
    MissingMetadataColumn(String),

    #[error("sources disagree on region at row {row}: {expected} vs {found} ({path})")]
    MisalignedSources {
        row: usize,
        expected: String,
        found: String,
        path: PathBuf,
    },

    #[error("malformed row in {path} at line {line}: {message}")]
    #[diagnostic(help("the file decompresses cleanly, so it was kept; fix or replace it by hand"))]
    MalformedSource {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("mined tables for {cell_line} are not aligned: {detail}")]
    MisalignedTables { cell_line: String, detail: String },

    #[error("malformed mined table {path}: {message}")]
    MalformedTable { path: PathBuf, message: String },

    #[error("no source files for {0}")]
    EmptyGroup(PathBuf),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl MinerError {
    /// True for mistakes in the run configuration, which are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MinerError::UnknownStatistic(_)
                | MinerError::InvalidWorkerCount(_)
                | MinerError::InvalidThreshold(_)
                | MinerError::NoStatisticsEnabled
                | MinerError::NoCellLines
                | MinerError::InvalidGrouping(_)
                | MinerError::ConfigRead(_)
                | MinerError::ConfigParse(_)
        )
    }
}
