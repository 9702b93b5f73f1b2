#[path = "../src/backup.rs"]
mod backup;

mod test_support;

use rusqlite::Connection;
use serde_json::json;
use std::fs::File;
use std::io::Read;
use test_support::{temp_dir, Session};

fn seed_sqlite(path: &std::path::Path) {
    let conn = Connection::open(path).expect("open sqlite");
    conn.execute_batch(
        "CREATE TABLE marker(v TEXT NOT NULL);
         INSERT INTO marker(v) VALUES('kept');",
    )
    .expect("seed");
}

fn marker(path: &std::path::Path) -> String {
    let conn = Connection::open(path).expect("open restored");
    conn.query_row("SELECT v FROM marker", [], |r| r.get(0))
        .expect("marker row")
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("marksd-backup-src");
    let workspace2 = temp_dir("marksd-backup-dst");
    let out_dir = temp_dir("marksd-backup-out");
    seed_sqlite(&workspace.join("marksd.sqlite3"));

    let bundle_path = out_dir.join("nested").join("workspace.marksd.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.entry_count, 2);
    assert!(export.bytes_written > 0);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));
    archive
        .by_name("db/marksd.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(marker(&workspace2.join("marksd.sqlite3")), "kept");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn raw_sqlite_files_import_and_other_files_are_refused() {
    let src_dir = temp_dir("marksd-backup-raw");
    let workspace = temp_dir("marksd-backup-raw-dst");
    let raw = src_dir.join("copy.sqlite3");
    seed_sqlite(&raw);

    let import = backup::import_workspace_bundle(&raw, &workspace).expect("import raw");
    assert_eq!(import.bundle_format_detected, backup::RAW_SQLITE_FORMAT);
    assert_eq!(marker(&workspace.join("marksd.sqlite3")), "kept");

    let junk = src_dir.join("notes.txt");
    std::fs::write(&junk, "hello").expect("write junk");
    assert!(backup::import_workspace_bundle(&junk, &workspace).is_err());
    // The previous database survives a refused import.
    assert_eq!(marker(&workspace.join("marksd.sqlite3")), "kept");

    let _ = std::fs::remove_dir_all(src_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn ipc_backup_restores_workspace_state() {
    let mut s = Session::open("marksd-backup-ipc");
    let bundle = s.workspace.join("exports").join("backup.zip");
    s.create_course("COS2102", "Data Structures");
    let exported = s.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["entryCount"], json!(2));

    s.create_course("COS9999", "Added after backup");
    let listed = s.ok("courses.list", json!({}));
    assert_eq!(listed["courses"].as_array().map(|v| v.len()), Some(2));

    let restored = s.ok(
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(restored["bundleFormatDetected"], json!("marksd-workspace-v1"));
    let listed = s.ok("courses.list", json!({}));
    assert_eq!(listed["courses"].as_array().map(|v| v.len()), Some(1));

    let e = s.err(
        "backup.importWorkspaceBundle",
        json!({ "inPath": s.workspace.join("missing.zip").to_string_lossy() }),
    );
    assert_eq!(e["code"], json!("not_found"));
    s.close();
}
