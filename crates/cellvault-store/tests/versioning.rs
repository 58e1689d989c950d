use cellvault_core::{CellPayload, ChunkCell, Color, FontSpec};
use cellvault_store::{
    CellUpdate, ChunkLocator, ExtractChunk, JsonExtractor, Store, StoreError, WorkbookExtract,
};
use std::fs;

fn workbook_extract() -> WorkbookExtract {
    WorkbookExtract::new(vec![
        ExtractChunk::new("Sheet1", 1, 100).with_cells(vec![
            vec![
                ChunkCell::new("A1", CellPayload::value("Revenue")),
                ChunkCell::new("B1", CellPayload::value(1200.0)),
            ],
            vec![
                ChunkCell::new("A2", CellPayload::value("Cost")),
                ChunkCell::new("B2", CellPayload::value(700.0)),
            ],
            vec![ChunkCell::new("B3", CellPayload::formula("=B1-B2"))],
        ]),
        ExtractChunk::new("Sheet1", 101, 200),
        ExtractChunk::new("Summary", 1, 50).with_cells(vec![vec![ChunkCell::new(
            "A1",
            CellPayload::formula("=Sheet1!B3"),
        )]]),
    ])
}

#[test]
fn new_version_is_exact_copy_of_parent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let book = dir.path().join("model.xlsx");
    let store = Store::open(dir.path().join("store.sqlite3")).expect("open store");

    let v1 = store
        .create_new_version(&book, "initial", Some(&workbook_extract()))
        .expect("create v1");
    store
        .update_cells(
            v1,
            &[CellUpdate::new(
                "Sheet1",
                "C1",
                CellPayload::value(3.0).with_font(FontSpec::new().with_bold(true)),
            )],
        )
        .expect("update v1");

    let v2 = store.create_new_version(&book, "fork", None).expect("create v2");

    let parent = store.get_all_chunks(v1, None).expect("v1 chunks");
    let child = store.get_all_chunks(v2, None).expect("v2 chunks");
    assert_eq!(parent.len(), child.len());
    for (p, c) in parent.iter().zip(&child) {
        assert_ne!(p.id, c.id);
        assert_eq!(c.version_id, v2);
        assert_eq!(p.chunk_index, c.chunk_index);
        assert_eq!(p.sheet_name, c.sheet_name);
        assert_eq!((p.start_row, p.end_row), (c.start_row, c.end_row));
        assert_eq!(p.payload, c.payload);
        assert_eq!(p.rollup_text, c.rollup_text);
        assert_eq!(p.content_hash, c.content_hash);
        assert_eq!(p.modified, c.modified);
    }

    for (sheet, address) in [("Sheet1", "A1"), ("Sheet1", "B3"), ("Sheet1", "C1"), ("Summary", "A1")] {
        assert_eq!(
            store.get_cell(v1, sheet, address).expect("v1 cell"),
            store.get_cell(v2, sheet, address).expect("v2 cell"),
            "{sheet}!{address}"
        );
    }
    assert_eq!(
        store.get_version_snapshot(v1).expect("v1 snapshot"),
        store.get_version_snapshot(v2).expect("v2 snapshot")
    );
}

#[test]
fn updates_to_child_leave_parent_untouched() {
    let store = Store::open_in_memory().expect("open store");
    let book = "/tmp/cellvault-it/parent.xlsx";

    let v1 = store
        .create_new_version(book, "initial", Some(&workbook_extract()))
        .expect("create v1");
    let v2 = store.create_new_version(book, "fork", None).expect("create v2");

    store
        .update_cells(v2, &[CellUpdate::new("Sheet1", "B1", CellPayload::value(1500.0))])
        .expect("update v2");

    assert_eq!(
        store.get_cell(v1, "Sheet1", "B1").expect("v1 cell"),
        Some(CellPayload::value(1200.0))
    );
    assert_eq!(
        store.get_cell(v2, "Sheet1", "B1").expect("v2 cell"),
        Some(CellPayload::value(1500.0))
    );

    let v1_chunk = store
        .get_chunk(v1, &ChunkLocator::Row { sheet: "Sheet1".into(), row: 1 })
        .expect("v1 chunk")
        .expect("chunk exists");
    assert!(!v1_chunk.modified);
}

#[test]
fn repeated_update_is_idempotent() {
    let store = Store::open_in_memory().expect("open store");
    let book = "/tmp/cellvault-it/idempotent.xlsx";
    let version = store
        .create_new_version(book, "initial", Some(&workbook_extract()))
        .expect("create version");

    let updates = [
        CellUpdate::new("Sheet1", "D5", CellPayload::value(9.0).with_fill(Color::rgb(1, 2, 3))),
        CellUpdate::new("Sheet1", "B2", CellPayload::default().with_number_format("0.00")),
    ];

    store.update_cells(version, &updates).expect("first update");
    let once = store.get_all_chunks(version, None).expect("chunks");
    let snapshot_once = store.get_version_snapshot(version).expect("snapshot");

    store.update_cells(version, &updates).expect("second update");
    let twice = store.get_all_chunks(version, None).expect("chunks");
    assert_eq!(once, twice);
    assert_eq!(snapshot_once, store.get_version_snapshot(version).expect("snapshot"));

    // Exactly one in-chunk cell and one cell row for D5
    let chunk = &twice[0];
    let d5: Vec<_> = chunk.payload.iter_cells().filter(|c| c.address == "D5").collect();
    assert_eq!(d5.len(), 1);
    assert_eq!(
        store.get_cell(version, "Sheet1", "d5").expect("cell"),
        Some(d5[0].payload.clone())
    );
}

#[test]
fn update_of_unknown_version_is_rejected() {
    let store = Store::open_in_memory().expect("open store");
    let book = "/tmp/cellvault-it/unknown-version.xlsx";
    let version = store
        .create_new_version(book, "initial", Some(&workbook_extract()))
        .expect("create version");

    let err = store
        .update_cells(version + 1, &[CellUpdate::new("Sheet1", "A1", CellPayload::value(0.0))])
        .expect_err("unknown version");
    assert!(matches!(err, StoreError::VersionNotFound(_)));
    assert_eq!(
        store.get_cell(version, "Sheet1", "A1").expect("cell"),
        Some(CellPayload::value("Revenue"))
    );
}

#[test]
fn failed_batch_rolls_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("store.sqlite3");
    let book = dir.path().join("model.xlsx");
    let store = Store::open(&db).expect("open store");
    let version = store
        .create_new_version(&book, "initial", Some(&workbook_extract()))
        .expect("create version");

    let chunks_before = store.get_all_chunks(version, Some("Sheet1")).expect("chunks");
    let snapshot_before = store.get_version_snapshot(version).expect("snapshot");

    // Make the Summary chunk unreadable so the second update errors mid-batch
    {
        let raw = rusqlite::Connection::open(&db).expect("raw connection");
        let changed = raw
            .execute(
                "UPDATE chunks SET payload = 'not json' WHERE version_id = ?1 AND sheet_name = 'Summary'",
                [version],
            )
            .expect("corrupt chunk");
        assert_eq!(changed, 1);
    }

    let err = store
        .update_cells(
            version,
            &[
                CellUpdate::new("Sheet1", "B1", CellPayload::value(1500.0)),
                CellUpdate::new("Summary", "A2", CellPayload::value(1.0)),
            ],
        )
        .expect_err("corrupt chunk");
    assert!(matches!(err, StoreError::Database(_)));

    // The first update had landed inside the transaction; none of it survives
    assert_eq!(
        store.get_all_chunks(version, Some("Sheet1")).expect("chunks"),
        chunks_before
    );
    assert_eq!(
        store.get_cell(version, "Sheet1", "B1").expect("cell"),
        Some(CellPayload::value(1200.0))
    );
    assert!(store.get_cell(version, "Summary", "A2").expect("cell").is_none());
    assert_eq!(store.get_version_snapshot(version).expect("snapshot"), snapshot_before);
}

#[test]
fn independent_stores_do_not_share_state() {
    let first = Store::open_in_memory().expect("open first");
    let second = Store::open_in_memory().expect("open second");
    let book = "/tmp/cellvault-it/shared-name.xlsx";

    first
        .create_new_version(book, "initial", Some(&workbook_extract()))
        .expect("create in first");

    assert!(first.get_latest_version(book).expect("first").is_some());
    assert!(second.get_latest_version(book).expect("second").is_none());
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("store.sqlite3");
    let book = dir.path().join("model.xlsx");

    let version = {
        let store = Store::open(&db).expect("open");
        store
            .create_new_version(&book, "initial", Some(&workbook_extract()))
            .expect("create version")
    };

    let reopened = Store::open(&db).expect("reopen");
    let latest = reopened
        .get_latest_version(&book)
        .expect("latest")
        .expect("version exists");
    assert_eq!(latest.id, version);
    assert_eq!(
        reopened.get_cell(version, "Summary", "A1").expect("cell"),
        Some(CellPayload::formula("=Sheet1!B3"))
    );
}

#[test]
fn ingest_reextracts_only_after_file_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let book = dir.path().join("model.xlsx");
    fs::write(&book, b"first contents").expect("write workbook");
    fs::write(
        JsonExtractor::sidecar_path(&book),
        serde_json::to_string(&workbook_extract()).expect("serialize extract"),
    )
    .expect("write sidecar");

    let store = Store::open_in_memory().expect("open store");
    let extractor = JsonExtractor::sidecar();

    let first = store.load_or_extract(&book, &extractor, false).expect("first ingest");
    assert!(!first.cached);

    let again = store.load_or_extract(&book, &extractor, false).expect("second ingest");
    assert!(again.cached);
    assert_eq!(again.version.id, first.version.id);

    fs::write(&book, b"second contents").expect("rewrite workbook");
    let changed = store.load_or_extract(&book, &extractor, false).expect("third ingest");
    assert!(!changed.cached);
    assert_eq!(changed.version.version_number, 2);

    // Dependencies were written into the stored payloads
    let b3 = store
        .get_cell(changed.version.id, "Sheet1", "B3")
        .expect("cell")
        .expect("B3 exists");
    assert_eq!(
        b3.precedents.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["Sheet1!B1", "Sheet1!B2"]
    );
    assert_eq!(
        b3.dependents.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["Summary!A1"]
    );
}
