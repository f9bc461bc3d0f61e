use camino::{Utf8Path, Utf8PathBuf};

use epigenomic_miner::store::{Store, feature_name};

#[test]
fn layout_paths() {
    let store = Store::new(Utf8PathBuf::from("targets"), Utf8PathBuf::from("targets"));

    let source = store.source_path("ENCFF123ABC");
    assert!(source.ends_with("ENCFF123ABC.bed.gz"));
    assert!(source.starts_with(store.sources_root()));

    let mined = store.mined_path("HepG2", "H3K27ac");
    assert_eq!(mined.parent(), Some(store.cell_line_dir("HepG2").as_path()));
    assert_eq!(feature_name(&mined), "H3K27ac");

    let table = store.table_path("HepG2");
    assert_eq!(table.parent(), Some(Utf8Path::new("targets")));
    assert!(table.as_str().ends_with("HepG2.csv.gz"));
}

#[test]
fn empty_targets_root_lists_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("absent")).unwrap();
    let store = Store::new(root.clone(), root);

    assert!(store.list_cell_lines().unwrap().is_empty());
    assert!(store.list_mined("K562").unwrap().is_empty());
}
