//! End-to-end checks of the doc-extract binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const SCHEMA: &str = r#"{
  "type": "object",
  "properties": {"patient_name": {"type": "string"}},
  "required": ["patient_name"]
}"#;

fn doc_extract(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("doc-extract").unwrap();
    cmd.current_dir(dir)
        .env_remove("DOC_EXTRACT_CONFIG")
        .env_remove("VA_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("DRIVE_ACCESS_TOKEN")
        .env("RUST_LOG", "doc_extract=warn");
    cmd
}

fn csv_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".csv"))
        .collect()
}

#[test]
fn test_missing_schema_fails_before_output() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("files.txt"), "/nowhere/a.pdf\n").unwrap();

    doc_extract(dir.path())
        .env("VA_API_KEY", "test-key")
        .args(["run", "--file-list", "files.txt", "--schema", "missing.json"])
        .args(["-o", "out.csv", "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));

    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_missing_api_key_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("schema.json"), SCHEMA).unwrap();
    fs::write(dir.path().join("files.txt"), "").unwrap();

    doc_extract(dir.path())
        .args(["run", "--file-list", "files.txt", "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("VA_API_KEY"));
}

#[test]
fn test_empty_file_list_has_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("schema.json"), SCHEMA).unwrap();
    fs::write(dir.path().join("files.txt"), "# nothing yet\n\n").unwrap();

    doc_extract(dir.path())
        .env("VA_API_KEY", "test-key")
        .args(["run", "--file-list", "files.txt", "--no-progress"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to do"));

    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_list_writes_file_list() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(docs.join("a.pdf"), b"%PDF").unwrap();
    fs::write(docs.join("nested/b.DOCX"), b"PK").unwrap();
    fs::write(docs.join("notes.bin"), b"\0").unwrap();

    doc_extract(dir.path())
        .args(["list", "docs", "--output-dir", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("Listed 2 file(s)"));

    let list = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("file_list_") && n.ends_with(".txt"))
        })
        .unwrap();
    let body = fs::read_to_string(list).unwrap();
    assert_eq!(body.lines().count(), 2);
    assert!(body.lines().all(|l| Path::new(l).is_absolute()));
    assert!(!body.contains("notes.bin"));
}

#[test]
fn test_merge_drops_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    fs::create_dir(&results).unwrap();
    fs::write(
        results.join("run1.csv"),
        "source_identifier,extracted_record_json\n/a.pdf,\"{\"\"x\"\":1}\"\n",
    )
    .unwrap();
    fs::write(
        results.join("run2.csv"),
        "source_identifier,extracted_record_json\n/a.pdf,\"{\"\"x\"\":1}\"\n/b.pdf,\"{\"\"x\"\":2}\"\n",
    )
    .unwrap();

    doc_extract(dir.path())
        .args(["merge", "results", "-o", "merged.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 duplicates dropped"));

    let merged = fs::read_to_string(dir.path().join("merged.csv")).unwrap();
    assert_eq!(merged.lines().count(), 3);
    assert!(merged.starts_with("source_identifier,extracted_record_json\n"));
}
