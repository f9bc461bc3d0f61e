mod common;

use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use common::{read_gz, uniform_source, utf8_root, write_gz, write_truncated_gz};
use epigenomic_miner::app::{App, Phase, ProgressEvent, ProgressSink};
use epigenomic_miner::concatenate::TableStatus;
use epigenomic_miner::config::{ConfigLoader, Overrides};
use epigenomic_miner::domain::{Grouping, StatisticsConfig};
use epigenomic_miner::executor::{Executor, TaskStatus, Workers};
use epigenomic_miner::merge::MergeOptions;
use epigenomic_miner::metadata::{MetadataRecord, MetadataTable};
use epigenomic_miner::output::JsonOutput;
use epigenomic_miner::planner::{PlanRequest, plan};
use epigenomic_miner::store::Store;

const METADATA: &str = "\
accession,cell_line,target,assay_term_name
ENCFF001,K562,CTCF,ChIP-seq
ENCFF002,K562,H3K4me3,ChIP-seq
ENCFF003,K562,CTCF,ChIP-seq
ENCFF004,HepG2,CTCF,ChIP-seq
";

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for Recorder {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn store(root: &Utf8PathBuf) -> Store {
    Store::new(root.join("raw"), root.join("mined"))
}

fn request(cell_lines: &[&str]) -> PlanRequest {
    PlanRequest {
        cell_lines: cell_lines.iter().map(|name| name.to_string()).collect(),
        assembly: None,
        grouping: Grouping::Target,
        statistics: StatisticsConfig::default(),
    }
}

fn seed_sources(store: &Store, accessions: &[&str]) {
    for accession in accessions {
        write_gz(store.source_path(accession).as_std_path(), &uniform_source(50, 2.0));
    }
}

#[test]
fn planner_groups_replicates_in_metadata_order() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = store(&root);
    let metadata = MetadataTable::from_reader(METADATA.as_bytes()).unwrap();

    let plan = plan(&metadata, &request(&["K562"]), &store);

    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.tasks[0].group.name(), "CTCF");
    assert_eq!(
        plan.tasks[0].sources,
        vec![store.source_path("ENCFF001"), store.source_path("ENCFF003")]
    );
    assert_eq!(plan.tasks[0].target, store.mined_path("K562", "CTCF"));
    assert_eq!(plan.tasks[1].group.name(), "H3K4me3");
    assert!(plan.skipped.is_empty());
}

#[test]
fn planner_skips_groups_already_mined() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = store(&root);
    let metadata = MetadataTable::from_reader(METADATA.as_bytes()).unwrap();
    write_gz(store.mined_path("K562", "CTCF").as_std_path(), "done\n");

    let plan = plan(&metadata, &request(&["K562", "HepG2"]), &store);

    let names = plan
        .tasks
        .iter()
        .map(|task| format!("{}/{}", task.group.cell_line, task.group.name()))
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["K562/H3K4me3", "HepG2/CTCF"]);
    assert_eq!(plan.skipped.len(), 1);
}

#[test]
fn assay_target_grouping_splits_by_assay() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&utf8_root(temp.path()));
    let metadata = MetadataTable::from_records(vec![
        MetadataRecord::new("K562", "CTCF", "A").with_assay("ChIP-seq"),
        MetadataRecord::new("K562", "CTCF", "B").with_assay("CUT&RUN"),
        MetadataRecord::new("K562", "Unknown", "C").with_assay("DNase-seq"),
    ]);
    let request = PlanRequest {
        grouping: Grouping::AssayTarget,
        ..request(&["K562"])
    };

    let plan = plan(&metadata, &request, &store);

    let names = plan.tasks.iter().map(|task| task.group.name()).collect::<Vec<_>>();
    assert_eq!(names, vec!["ChIP-seq.CTCF", "CUT_RUN.CTCF", "DNase-seq"]);
}

#[test]
fn executor_mines_every_task_and_reports_progress() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = store(&root);
    seed_sources(&store, &["ENCFF001", "ENCFF002", "ENCFF003", "ENCFF004"]);
    let metadata = MetadataTable::from_reader(METADATA.as_bytes()).unwrap();
    let plan = plan(&metadata, &request(&["K562", "HepG2"]), &store);
    let recorder = Recorder::default();

    let report = Executor::new(Workers::from_count(2).unwrap())
        .run(&plan.tasks, &MergeOptions::default(), &recorder)
        .unwrap();

    assert_eq!(report.mined(), 3);
    assert_eq!(report.corrupted(), 0);
    for task in &plan.tasks {
        let text = read_gz(task.target.as_std_path());
        assert_eq!(text.lines().count(), 51);
    }
    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|event| event.phase == Phase::Mine));
    assert!(events.iter().any(|event| event.completed == Some((3, 3))));
}

#[test]
fn corrupted_group_loses_its_sources_and_is_planned_again() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let store = store(&root);
    seed_sources(&store, &["ENCFF002"]);
    let rows = uniform_source(3000, 1.5);
    write_gz(store.source_path("ENCFF001").as_std_path(), &rows);
    write_truncated_gz(store.source_path("ENCFF003").as_std_path(), &rows);
    let metadata = MetadataTable::from_reader(METADATA.as_bytes()).unwrap();
    let plan_before = plan(&metadata, &request(&["K562"]), &store);

    let report = Executor::new(Workers::All)
        .run(&plan_before.tasks, &MergeOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(report.mined(), 1);
    assert_eq!(report.corrupted(), 1);
    let corrupted = report
        .tasks
        .iter()
        .find(|task| matches!(task.status, TaskStatus::Corrupted { .. }))
        .unwrap();
    assert_eq!(corrupted.name, "CTCF");
    assert!(!store.source_path("ENCFF001").as_std_path().exists());
    assert!(!store.source_path("ENCFF003").as_std_path().exists());
    assert!(store.source_path("ENCFF002").as_std_path().exists());
    assert!(!store.mined_path("K562", "CTCF").as_std_path().exists());

    let plan_after = plan(&metadata, &request(&["K562"]), &store);
    assert_eq!(plan_after.tasks.len(), 1);
    assert_eq!(plan_after.tasks[0].group.name(), "CTCF");
}

fn app(root: &Utf8PathBuf) -> App {
    let metadata_path = root.join("epigenomes.csv");
    fs::write(&metadata_path, METADATA).unwrap();
    let config = ConfigLoader::resolve_config(
        Default::default(),
        Overrides {
            metadata: Some(metadata_path.into_std_path_buf()),
            sources: Some(root.join("raw")),
            targets: Some(root.join("mined")),
            cell_lines: vec!["K562".to_string()],
            ..Overrides::default()
        },
    )
    .unwrap();
    App::new(config)
}

#[test]
fn table_waits_for_groups_lost_to_corruption() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let app = app(&root);
    let store = app.store();
    let rows = uniform_source(3000, 1.5);
    write_gz(store.source_path("ENCFF001").as_std_path(), &rows);
    write_gz(store.source_path("ENCFF002").as_std_path(), &rows);
    write_truncated_gz(store.source_path("ENCFF003").as_std_path(), &rows);

    let mined = app.mine(&JsonOutput).unwrap();
    assert_eq!((mined.mined, mined.corrupted), (1, 1));

    let concat = app.concatenate(&JsonOutput).unwrap();
    assert_eq!(concat.written, 0);
    assert_matches!(
        &concat.tables[0].status,
        TableStatus::Incomplete { missing } if missing == &vec!["CTCF".to_string()]
    );
    assert!(!store.table_path("K562").as_std_path().exists());

    write_gz(store.source_path("ENCFF001").as_std_path(), &rows);
    write_gz(store.source_path("ENCFF003").as_std_path(), &rows);
    assert_eq!(app.mine(&JsonOutput).unwrap().mined, 1);

    let concat = app.concatenate(&JsonOutput).unwrap();
    assert_matches!(
        concat.tables[0].status,
        TableStatus::Written { rows: 3000, columns: 2 }
    );
    let text = read_gz(store.table_path("K562").as_std_path());
    assert_eq!(
        text.lines().next(),
        Some("chrom,chromStart,chromEnd,strand,CTCF.max,H3K4me3.max")
    );
}

#[test]
fn second_mine_does_no_work() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(temp.path());
    let app = app(&root);
    seed_sources(app.store(), &["ENCFF001", "ENCFF002", "ENCFF003"]);

    let first = app.mine(&JsonOutput).unwrap();
    assert_eq!(first.mined, 2);
    assert!(!first.nothing_to_do);

    let mined = app.store().mined_path("K562", "CTCF");
    let modified = fs::metadata(mined.as_std_path()).unwrap().modified().unwrap();

    let second = app.mine(&JsonOutput).unwrap();
    assert!(second.nothing_to_do);
    assert_eq!(second.planned, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(
        fs::metadata(mined.as_std_path()).unwrap().modified().unwrap(),
        modified
    );
}
