use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MinerError;

/// Token used by the extraction tool for an unavailable reading.
pub const MISSING_TOKEN: &str = "NA";

/// Index of the first score column in a raw signal row.
pub const SCORE_OFFSET: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
    #[serde(rename = ".")]
    Unknown,
}

impl Strand {
    pub fn as_str(self) -> &'static str {
        match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unknown => ".",
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strand {
    type Err = MinerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." | "" => Ok(Strand::Unknown),
            _ => Err(MinerError::InvalidStrand(value.to_string())),
        }
    }
}

/// Identity of a genomic window. Sources merged together must list the same
/// keys in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionKey {
    pub chrom: String,
    pub chrom_start: u64,
    pub chrom_end: u64,
    pub strand: Strand,
}

impl RegionKey {
    pub fn new(chrom: impl Into<String>, chrom_start: u64, chrom_end: u64, strand: Strand) -> Self {
        Self {
            chrom: chrom.into(),
            chrom_start,
            chrom_end,
            strand,
        }
    }

    /// Parses the four key columns as they appear in mined files.
    pub fn from_fields(
        chrom: &str,
        chrom_start: &str,
        chrom_end: &str,
        strand: &str,
    ) -> Result<Self, MalformedRecord> {
        let chrom_start = chrom_start
            .trim()
            .parse()
            .map_err(|_| MalformedRecord(format!("invalid chromStart `{chrom_start}`")))?;
        let chrom_end = chrom_end
            .trim()
            .parse()
            .map_err(|_| MalformedRecord(format!("invalid chromEnd `{chrom_end}`")))?;
        let strand = strand
            .parse()
            .map_err(|_| MalformedRecord(format!("invalid strand `{strand}`")))?;
        Ok(Self::new(chrom, chrom_start, chrom_end, strand))
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}({})",
            self.chrom, self.chrom_start, self.chrom_end, self.strand
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MalformedRecord(pub String);

/// One row of a per-replicate signal file.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub key: RegionKey,
    pub scores: Vec<Option<f64>>,
}

impl SignalRecord {
    /// Parses `chrom, start, end, name, score, strand, <unused>, score_0 .. score_k`.
    pub fn parse(line: &str) -> Result<Self, MalformedRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < SCORE_OFFSET {
            return Err(MalformedRecord(format!(
                "expected at least {SCORE_OFFSET} columns, found {}",
                fields.len()
            )));
        }
        let key = RegionKey::from_fields(fields[0], fields[1], fields[2], fields[5])?;
        let scores = fields[SCORE_OFFSET..]
            .iter()
            .map(|token| parse_score(token))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { key, scores })
    }
}

fn parse_score(token: &str) -> Result<Option<f64>, MalformedRecord> {
    let token = token.trim();
    if token == MISSING_TOKEN {
        return Ok(None);
    }
    let value = token
        .parse::<f64>()
        .map_err(|_| MalformedRecord(format!("invalid score `{token}`")))?;
    Ok((!value.is_nan()).then_some(value))
}

/// Region key plus one value per enabled statistic; `None` is undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    pub key: RegionKey,
    pub values: Vec<Option<f64>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Max,
    Min,
    Mean,
    Median,
    Var,
}

impl Statistic {
    /// Canonical order, which is also the output column order.
    pub const ALL: [Statistic; 5] = [
        Statistic::Max,
        Statistic::Min,
        Statistic::Mean,
        Statistic::Median,
        Statistic::Var,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Mean => "mean",
            Statistic::Median => "median",
            Statistic::Var => "var",
        }
    }

    fn index(self) -> usize {
        match self {
            Statistic::Max => 0,
            Statistic::Min => 1,
            Statistic::Mean => 2,
            Statistic::Median => 3,
            Statistic::Var => 4,
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = MinerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "max" => Ok(Statistic::Max),
            "min" => Ok(Statistic::Min),
            "mean" => Ok(Statistic::Mean),
            "median" => Ok(Statistic::Median),
            "var" | "variance" => Ok(Statistic::Var),
            _ => Err(MinerError::UnknownStatistic(value.to_string())),
        }
    }
}

/// Which statistics a mining run computes. Iteration always follows
/// [`Statistic::ALL`], whatever order the flags were set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsConfig {
    enabled: [bool; 5],
}

impl StatisticsConfig {
    pub fn none() -> Self {
        Self { enabled: [false; 5] }
    }

    pub fn from_enabled(statistics: impl IntoIterator<Item = Statistic>) -> Self {
        let mut config = Self::none();
        for statistic in statistics {
            config.set(statistic, true);
        }
        config
    }

    /// Builds the configuration from `name -> enabled` pairs; unknown names fail.
    pub fn from_flags<'a>(
        flags: impl IntoIterator<Item = (&'a str, bool)>,
    ) -> Result<Self, MinerError> {
        let mut config = Self::none();
        for (name, enabled) in flags {
            config.set(name.parse()?, enabled);
        }
        Ok(config)
    }

    pub fn set(&mut self, statistic: Statistic, enabled: bool) {
        self.enabled[statistic.index()] = enabled;
    }

    pub fn is_enabled(&self, statistic: Statistic) -> bool {
        self.enabled[statistic.index()]
    }

    pub fn enabled(&self) -> impl Iterator<Item = Statistic> + '_ {
        Statistic::ALL
            .into_iter()
            .filter(|statistic| self.is_enabled(*statistic))
    }

    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|flag| **flag).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(self) -> Result<Self, MinerError> {
        if self.is_empty() {
            return Err(MinerError::NoStatisticsEnabled);
        }
        Ok(self)
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self::from_enabled([Statistic::Max])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Grouping {
    /// Replicates are merged per (cell line, target).
    #[default]
    Target,
    /// Replicates are merged per (cell line, assay, target).
    AssayTarget,
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grouping::Target => write!(f, "target"),
            Grouping::AssayTarget => write!(f, "assay-target"),
        }
    }
}

impl FromStr for Grouping {
    type Err = MinerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "target" => Ok(Grouping::Target),
            "assay-target" | "assay_target" => Ok(Grouping::AssayTarget),
            _ => Err(MinerError::InvalidGrouping(value.to_string())),
        }
    }
}
