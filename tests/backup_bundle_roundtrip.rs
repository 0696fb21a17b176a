
use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn export_then_import_restores_the_catalog() {
    let source = temp_dir("curriculumd-backup-src");
    let target = temp_dir("curriculumd-backup-dst");
    let bundle = source.join("export").join("workspace.zip");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let level = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.nodes.create",
        json!({ "kind": "level", "name": "Seconde" }),
    )["nodeId"]
        .as_str()
        .expect("nodeId")
        .to_string();

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported["bundleFormat"].as_str(),
        Some("curriculum-workspace-v1")
    );
    assert_eq!(exported["entryCount"].as_u64(), Some(3));
    let digest = exported["dbSha256"].as_str().expect("dbSha256");
    assert_eq!(digest.len(), 64);
    assert!(bundle.is_file());

    // Import into a different workspace and read the catalog back.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": target.to_string_lossy() }),
    );
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "catalog.nodes.list",
        json!({ "kind": "level" }),
    );
    assert_eq!(empty["nodes"], json!([]));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.import",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        imported["bundleFormatDetected"].as_str(),
        Some("curriculum-workspace-v1")
    );

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "catalog.nodes.list",
        json!({ "kind": "level" }),
    );
    let nodes = restored["nodes"].as_array().expect("nodes");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["id"].as_str(), Some(level.as_str()));
    assert_eq!(nodes[0]["name"].as_str(), Some("Seconde"));

    let _ = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "backup.import",
        json!({ "inPath": target.join("missing.zip").to_string_lossy() }),
        "import_failed",
    );
}

#[test]
fn legacy_sqlite_file_imports_without_a_manifest() {
    let source = temp_dir("curriculumd-backup-legacy-src");
    let target = temp_dir("curriculumd-backup-legacy-dst");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.nodes.create",
        json!({ "kind": "level", "name": "Premiere" }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": target.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.import",
        json!({ "inPath": test_support::db_path(&source).to_string_lossy() }),
    );
    assert_eq!(
        imported["bundleFormatDetected"].as_str(),
        Some("legacy-sqlite3")
    );

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "catalog.nodes.list",
        json!({ "kind": "level" }),
    );
    assert_eq!(restored["nodes"][0]["name"].as_str(), Some("Premiere"));
}
