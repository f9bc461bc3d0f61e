use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;

use crate::error::MinerError;

pub type GzReader = BufReader<MultiGzDecoder<File>>;

pub fn open_gz(path: &Path) -> Result<GzReader, MinerError> {
    let file = File::open(path)
        .map_err(|err| MinerError::Filesystem(format!("open {}: {err}", path.display())))?;
    Ok(BufReader::new(MultiGzDecoder::new(file)))
}

/// Whether a read error points at damaged content rather than at the
/// filesystem: bad gzip framing, truncated members, invalid UTF-8.
pub fn is_corruption(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof
    )
}

/// Gzip writer backed by a temporary file next to `target`. Nothing appears at
/// `target` until [`GzFileWriter::commit`] succeeds; dropping the writer
/// removes the temporary file.
pub struct GzFileWriter {
    inner: BufWriter<GzEncoder<NamedTempFile>>,
    target: PathBuf,
}

impl GzFileWriter {
    pub fn create(target: &Path) -> Result<Self, MinerError> {
        let parent = target
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|err| {
            MinerError::Filesystem(format!("create {}: {err}", parent.display()))
        })?;
        let temp = tempfile::Builder::new()
            .prefix(".epimine")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|err| MinerError::Filesystem(err.to_string()))?;
        Ok(Self {
            inner: BufWriter::new(GzEncoder::new(temp, Compression::default())),
            target: target.to_path_buf(),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<(), MinerError> {
        let target = self.target;
        let encoder = self
            .inner
            .into_inner()
            .map_err(|err| MinerError::Filesystem(err.error().to_string()))?;
        let temp = encoder
            .finish()
            .map_err(|err| MinerError::Filesystem(err.to_string()))?;
        temp.persist(&target).map_err(|err| {
            MinerError::Filesystem(format!("persist {}: {}", target.display(), err.error))
        })?;
        Ok(())
    }
}

impl Write for GzFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Removes every file in `paths`, skipping ones already gone. Returns the
/// files that could not be removed.
pub fn discard_files(paths: &[PathBuf]) -> Vec<(PathBuf, io::Error)> {
    paths
        .iter()
        .filter_map(|path| match fs::remove_file(path) {
            Ok(()) => None,
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => Some((path.clone(), err)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, Read};

    use super::*;

    #[test]
    fn commit_writes_readable_gzip() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("nested").join("out.csv.gz");
        let mut writer = GzFileWriter::create(&target).unwrap();
        writer.write_all(b"a\tb\n1\t2\n").unwrap();
        writer.commit().unwrap();

        let lines = open_gz(&target)
            .unwrap()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(lines, vec!["a\tb", "1\t2"]);
    }

    #[test]
    fn dropped_writer_leaves_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("out.csv.gz");
        let mut writer = GzFileWriter::create(&target).unwrap();
        writer.write_all(b"partial").unwrap();
        drop(writer);

        assert!(!target.exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn garbage_input_is_corruption() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.bed.gz");
        fs::write(&path, b"definitely not gzip").unwrap();
        let mut content = String::new();
        let err = open_gz(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap_err();
        assert!(is_corruption(&err));
    }

    #[test]
    fn discard_ignores_missing_files() {
        let temp = tempfile::tempdir().unwrap();
        let present = temp.path().join("a.bed.gz");
        fs::write(&present, b"x").unwrap();
        let failures = discard_files(&[present.clone(), temp.path().join("missing.bed.gz")]);
        assert!(failures.is_empty());
        assert!(!present.exists());
    }
}
