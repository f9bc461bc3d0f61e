mod common;

use assert_matches::assert_matches;

use common::{read_gz, signal_row, utf8_root, write_gz};
use epigenomic_miner::concatenate::{MinedTable, TableRequest, TableStatus, concatenate};
use epigenomic_miner::domain::{Statistic, StatisticsConfig};
use epigenomic_miner::error::MinerError;
use epigenomic_miner::executor::{Executor, Workers};
use epigenomic_miner::merge::{MergeOptions, merge_sources};
use epigenomic_miner::output::JsonOutput;
use epigenomic_miner::store::Store;

fn mine(store: &Store, cell_line: &str, name: &str, rows: &str, statistics: StatisticsConfig) {
    let source = store.source_path(&format!("{cell_line}-{name}"));
    write_gz(source.as_std_path(), rows);
    merge_sources(
        &[source],
        store.mined_path(cell_line, name).as_std_path(),
        &statistics,
        &MergeOptions::default(),
    )
    .unwrap();
}

fn request(cell_line: &str, features: &[&str]) -> TableRequest {
    TableRequest {
        cell_line: cell_line.to_string(),
        features: features.iter().map(|feature| feature.to_string()).collect(),
    }
}

fn regions(starts: &[u64], scores: &[Option<f64>]) -> String {
    starts
        .iter()
        .map(|start| signal_row("chr1", *start, start + 100, scores))
        .collect()
}

#[test]
fn mined_tables_are_joined_column_wise() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = Store::new(root.join("raw"), root.join("mined"));
    let starts = [0, 100, 200];
    mine(
        &store,
        "K562",
        "CTCF",
        &regions(&starts, &[Some(1.0), Some(2.0)]),
        StatisticsConfig::from_enabled([Statistic::Max, Statistic::Mean]),
    );
    mine(
        &store,
        "K562",
        "H3K4me3",
        &regions(&starts, &[Some(0.123), Some(0.456)]),
        StatisticsConfig::from_enabled([Statistic::Max]),
    );
    mine(
        &store,
        "K562",
        "DNase-seq",
        &regions(&starts, &[None, None]),
        StatisticsConfig::from_enabled([Statistic::Median]),
    );

    let report = concatenate(
        &store,
        &[request("K562", &["CTCF", "DNase-seq", "H3K4me3"])],
        &Executor::new(Workers::All),
        &JsonOutput,
    )
    .unwrap();

    assert_eq!(report.written(), 1);
    assert_matches!(
        report.tables[0].status,
        TableStatus::Written { rows: 3, columns: 4 }
    );
    let text = read_gz(store.table_path("K562").as_std_path());
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "chrom,chromStart,chromEnd,strand,CTCF.max,CTCF.mean,DNase-seq.median,H3K4me3.max"
    );
    assert_eq!(lines[2], "chr1,100,200,+,2.0,1.5,,0.46");
}

#[test]
fn existing_table_is_left_alone() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = Store::new(root.join("raw"), root.join("mined"));
    write_gz(store.table_path("K562").as_std_path(), "kept\n");

    let report = concatenate(
        &store,
        &[request("K562", &["CTCF"]), request("HepG2", &[])],
        &Executor::new(Workers::All),
        &JsonOutput,
    )
    .unwrap();

    assert_matches!(report.tables[0].status, TableStatus::Skipped);
    assert_matches!(report.tables[1].status, TableStatus::Missing);
    assert_eq!(read_gz(store.table_path("K562").as_std_path()), "kept\n");
    assert!(!store.table_path("HepG2").as_std_path().exists());
}

#[test]
fn misaligned_tables_fail_without_output() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = Store::new(root.join("raw"), root.join("mined"));
    mine(
        &store,
        "K562",
        "CTCF",
        &regions(&[0, 100, 200], &[Some(1.0)]),
        StatisticsConfig::default(),
    );
    mine(
        &store,
        "K562",
        "H3K27ac",
        &regions(&[0, 100], &[Some(1.0)]),
        StatisticsConfig::default(),
    );

    let err = concatenate(
        &store,
        &[request("K562", &["CTCF", "H3K27ac"])],
        &Executor::new(Workers::All),
        &JsonOutput,
    )
    .unwrap_err();

    assert_matches!(err, MinerError::MisalignedTables { cell_line, .. } if cell_line == "K562");
    assert!(!store.table_path("K562").as_std_path().exists());
}

#[test]
fn table_is_not_written_while_a_group_is_unmined() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = Store::new(root.join("raw"), root.join("mined"));
    mine(
        &store,
        "K562",
        "H3K4me3",
        &regions(&[0, 100], &[Some(1.0)]),
        StatisticsConfig::default(),
    );

    let report = concatenate(
        &store,
        &[request("K562", &["CTCF", "H3K4me3"])],
        &Executor::new(Workers::All),
        &JsonOutput,
    )
    .unwrap();

    assert_eq!(report.written(), 0);
    assert_matches!(
        &report.tables[0].status,
        TableStatus::Incomplete { missing } if missing == &vec!["CTCF".to_string()]
    );
    assert!(!store.table_path("K562").as_std_path().exists());
}

#[test]
fn rounding_ties_go_to_the_even_digit() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = Store::new(root.join("raw"), root.join("mined"));
    mine(
        &store,
        "K562",
        "CTCF",
        &(regions(&[0, 100], &[Some(0.125)]) + &regions(&[200], &[Some(0.375)])),
        StatisticsConfig::default(),
    );

    concatenate(
        &store,
        &[request("K562", &["CTCF"])],
        &Executor::new(Workers::All),
        &JsonOutput,
    )
    .unwrap();

    let text = read_gz(store.table_path("K562").as_std_path());
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines[1], "chr1,0,100,+,0.12");
    assert_eq!(lines[3], "chr1,200,300,+,0.38");
}

#[test]
fn mined_table_keeps_dotted_feature_names() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = Store::new(root.join("raw"), root.join("mined"));
    mine(
        &store,
        "K562",
        "ChIP-seq.CTCF",
        &regions(&[0], &[Some(3.0)]),
        StatisticsConfig::default(),
    );

    let table = MinedTable::read(&store.mined_path("K562", "ChIP-seq.CTCF")).unwrap();

    assert_eq!(table.feature, "ChIP-seq.CTCF");
    assert_eq!(table.columns, vec!["max"]);
    assert_eq!(table.rows, vec![vec![Some(3.0)]]);
}

#[test]
fn malformed_mined_table_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let path = root.join("bad.csv.gz");
    write_gz(path.as_std_path(), "region\tmax\nchr1:0-100\t1.0\n");

    assert_matches!(
        MinedTable::read(&path),
        Err(MinerError::MalformedTable { .. })
    );
}
