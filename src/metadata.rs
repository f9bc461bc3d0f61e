use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

use crate::error::MinerError;

pub const REQUIRED_COLUMNS: [&str; 3] = ["cell_line", "target", "accession"];

/// One signal track in the epigenome metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetadataRecord {
    pub cell_line: String,
    pub target: String,
    pub accession: String,
    #[serde(default)]
    pub assay_term_name: Option<String>,
    #[serde(default)]
    pub assembly: Option<String>,
}

impl MetadataRecord {
    pub fn new(cell_line: &str, target: &str, accession: &str) -> Self {
        Self {
            cell_line: cell_line.to_string(),
            target: target.to_string(),
            accession: accession.to_string(),
            assay_term_name: None,
            assembly: None,
        }
    }

    pub fn with_assay(mut self, assay_term_name: &str) -> Self {
        self.assay_term_name = Some(assay_term_name.to_string());
        self
    }

    pub fn with_assembly(mut self, assembly: &str) -> Self {
        self.assembly = Some(assembly.to_string());
        self
    }
}

/// Read-only view of the metadata table. Row order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    records: Vec<MetadataRecord>,
}

impl MetadataTable {
    pub fn from_records(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }

    pub fn from_path(path: &Path) -> Result<Self, MinerError> {
        let file = File::open(path).map_err(|_| MinerError::MetadataRead(path.to_path_buf()))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Reads a comma-separated table with a header row. Columns other than
    /// the known ones are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, MinerError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|err| MinerError::MetadataParse(err.to_string()))?
            .clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|header| header == column) {
                return Err(MinerError::MissingMetadataColumn(column.to_string()));
            }
        }

        let records = reader
            .deserialize::<MetadataRecord>()
            .map(|record| record.map_err(|err| MinerError::MetadataParse(err.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct cell lines, in order of first appearance.
    pub fn cell_lines(&self) -> Vec<&str> {
        let mut seen = Vec::<&str>::new();
        for record in &self.records {
            if !seen.contains(&record.cell_line.as_str()) {
                seen.push(&record.cell_line);
            }
        }
        seen
    }
}
