use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Grouping, Statistic, StatisticsConfig};
use crate::error::MinerError;
use crate::executor::Workers;
use crate::merge::MergeOptions;

pub const FILE_NAME: &str = "epimine.json";
pub const DEFAULT_METADATA: &str = "epigenomes.csv";
pub const DEFAULT_ROOT: &str = "targets";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub metadata: Option<PathBuf>,
    #[serde(default)]
    pub sources: Option<Utf8PathBuf>,
    #[serde(default)]
    pub targets: Option<Utf8PathBuf>,
    #[serde(default)]
    pub cell_lines: Option<Vec<String>>,
    #[serde(default)]
    pub assembly: Option<String>,
    #[serde(default)]
    pub workers: Option<WorkersEntry>,
    #[serde(default)]
    pub grouping: Option<String>,
    #[serde(default)]
    pub statistics: Option<BTreeMap<String, bool>>,
    #[serde(default)]
    pub missing_threshold: Option<f64>,
    #[serde(default)]
    pub verify_alignment: Option<bool>,
}

/// `"workers": 8` or `"workers": "all"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WorkersEntry {
    Count(i64),
    Named(String),
}

impl WorkersEntry {
    fn resolve(&self) -> Result<Workers, MinerError> {
        match self {
            WorkersEntry::Count(count) => Workers::from_count(*count),
            WorkersEntry::Named(name) => name.parse(),
        }
    }
}

/// Command-line values. Anything set here wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub metadata: Option<PathBuf>,
    pub sources: Option<Utf8PathBuf>,
    pub targets: Option<Utf8PathBuf>,
    pub cell_lines: Vec<String>,
    pub assembly: Option<String>,
    pub workers: Option<Workers>,
    pub grouping: Option<Grouping>,
    pub statistics: Vec<Statistic>,
    pub missing_threshold: Option<f64>,
    pub verify_alignment: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub metadata: PathBuf,
    pub sources: Utf8PathBuf,
    pub targets: Utf8PathBuf,
    pub cell_lines: Vec<String>,
    pub assembly: Option<String>,
    pub workers: Workers,
    pub grouping: Grouping,
    pub statistics: StatisticsConfig,
    pub merge: MergeOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Config file to use: the explicit path, else `./epimine.json`, else the
    /// one in the user config directory. `None` when neither exists.
    pub fn locate(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "epimine", "epimine")
            .map(|dirs| dirs.config_dir().join(FILE_NAME))
            .filter(|path| path.exists())
    }

    pub fn load(path: &Path) -> Result<Config, MinerError> {
        let content =
            fs::read_to_string(path).map_err(|_| MinerError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| MinerError::ConfigParse(err.to_string()))
    }

    pub fn resolve(
        path: Option<&Path>,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, MinerError> {
        let config = match Self::locate(path) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Self::load(&path)?
            }
            None => Config::default(),
        };
        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, MinerError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let workers = match (overrides.workers, config.workers) {
            (Some(workers), _) => workers,
            (None, Some(entry)) => entry.resolve()?,
            (None, None) => Workers::default(),
        };

        let grouping = match (overrides.grouping, config.grouping) {
            (Some(grouping), _) => grouping,
            (None, Some(name)) => name.parse()?,
            (None, None) => Grouping::default(),
        };

        let statistics = if !overrides.statistics.is_empty() {
            StatisticsConfig::from_enabled(overrides.statistics)
        } else if let Some(flags) = &config.statistics {
            StatisticsConfig::from_flags(flags.iter().map(|(name, on)| (name.as_str(), *on)))?
        } else {
            StatisticsConfig::default()
        };
        statistics.validate()?;

        let cell_lines = if overrides.cell_lines.is_empty() {
            config.cell_lines.unwrap_or_default()
        } else {
            overrides.cell_lines
        };
        if cell_lines.is_empty() {
            return Err(MinerError::NoCellLines);
        }

        let defaults = MergeOptions::default();
        let merge = MergeOptions {
            missing_threshold: overrides
                .missing_threshold
                .or(config.missing_threshold)
                .unwrap_or(defaults.missing_threshold),
            verify_alignment: overrides
                .verify_alignment
                .or(config.verify_alignment)
                .unwrap_or(defaults.verify_alignment),
        };
        merge.validate()?;

        Ok(ResolvedConfig {
            schema_version,
            metadata: overrides
                .metadata
                .or(config.metadata)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA)),
            sources: overrides
                .sources
                .or(config.sources)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ROOT)),
            targets: overrides
                .targets
                .or(config.targets)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ROOT)),
            cell_lines,
            assembly: overrides.assembly.or(config.assembly),
            workers,
            grouping,
            statistics,
            merge,
        })
    }
}
