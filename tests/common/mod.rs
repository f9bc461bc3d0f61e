#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

/// One signal row with the given scores; `None` is written as `NA`.
pub fn signal_row(chrom: &str, start: u64, end: u64, scores: &[Option<f64>]) -> String {
    let mut fields = vec![
        chrom.to_string(),
        start.to_string(),
        end.to_string(),
        ".".to_string(),
        "0".to_string(),
        "+".to_string(),
        "0".to_string(),
    ];
    fields.extend(scores.iter().map(|score| match score {
        Some(value) => value.to_string(),
        None => "NA".to_string(),
    }));
    format!("{}\n", fields.join("\t"))
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn write_gz(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, gzip(content.as_bytes())).unwrap();
}

/// Writes a gzip file cut off halfway through its compressed stream.
pub fn write_truncated_gz(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let bytes = gzip(content.as_bytes());
    fs::write(path, &bytes[..bytes.len() / 2]).unwrap();
}

pub fn read_gz(path: &Path) -> String {
    let mut decoder = MultiGzDecoder::new(File::open(path).unwrap());
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    text
}

pub fn utf8_root(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

/// A source file with `rows` regions on chr1, every score equal to `value`.
pub fn uniform_source(rows: u64, value: f64) -> String {
    (0..rows)
        .map(|index| signal_row("chr1", index * 200, index * 200 + 200, &[Some(value); 4]))
        .collect()
}
