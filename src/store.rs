use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::MinerError;

pub const SOURCE_SUFFIX: &str = ".bed.gz";
pub const MINED_SUFFIX: &str = ".csv.gz";

/// On-disk layout of a mining run.
///
/// ```text
/// <sources>/<accession>.bed.gz      raw per-accession signal
/// <targets>/<cell_line>/<name>.csv.gz   mined per-group table
/// <targets>/<cell_line>.csv.gz      concatenated per-cell-line table
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    sources_root: Utf8PathBuf,
    targets_root: Utf8PathBuf,
}

impl Store {
    pub fn new(sources_root: Utf8PathBuf, targets_root: Utf8PathBuf) -> Self {
        Self {
            sources_root,
            targets_root,
        }
    }

    pub fn sources_root(&self) -> &Utf8Path {
        &self.sources_root
    }

    pub fn targets_root(&self) -> &Utf8Path {
        &self.targets_root
    }

    pub fn source_path(&self, accession: &str) -> Utf8PathBuf {
        self.sources_root.join(format!("{accession}{SOURCE_SUFFIX}"))
    }

    pub fn cell_line_dir(&self, cell_line: &str) -> Utf8PathBuf {
        self.targets_root.join(cell_line)
    }

    pub fn mined_path(&self, cell_line: &str, name: &str) -> Utf8PathBuf {
        self.cell_line_dir(cell_line).join(format!("{name}{MINED_SUFFIX}"))
    }

    pub fn table_path(&self, cell_line: &str) -> Utf8PathBuf {
        self.targets_root.join(format!("{cell_line}{MINED_SUFFIX}"))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn ensure_targets_root(&self) -> Result<(), MinerError> {
        fs::create_dir_all(self.targets_root.as_std_path())
            .map_err(|err| MinerError::Filesystem(err.to_string()))
    }

    /// Mined tables of a cell line, sorted by file name. Temporary files from
    /// interrupted writes are not listed.
    pub fn list_mined(&self, cell_line: &str) -> Result<Vec<Utf8PathBuf>, MinerError> {
        let dir = self.cell_line_dir(cell_line);
        if !dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| MinerError::Filesystem(format!("read {dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| MinerError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let is_mined = path
                .file_name()
                .map(|name| name.ends_with(MINED_SUFFIX) && !name.starts_with('.'))
                .unwrap_or(false);
            if is_mined && path.as_std_path().is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Cell lines that have a directory of mined tables.
    pub fn list_cell_lines(&self) -> Result<Vec<String>, MinerError> {
        if !self.targets_root.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.targets_root.as_std_path()).map_err(|err| {
            MinerError::Filesystem(format!("read {}: {err}", self.targets_root))
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MinerError::Filesystem(err.to_string()))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Name of a mined table without its suffix.
pub fn feature_name(path: &Utf8Path) -> String {
    let name = path.file_name().unwrap_or(path.as_str());
    name.strip_suffix(MINED_SUFFIX).unwrap_or(name).to_string()
}
