use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trialmap_protocol::{ContentNode, DocumentType, Language, ParsedDocument};

fn protocol(id: &str, extra: Option<&str>) -> ParsedDocument {
    let mut doc = ParsedDocument::new(id, DocumentType::Protocol, Language::En)
        .node(ContentNode::heading(1, "1 Adverse Events", &["1 Adverse Events"]))
        .node(ContentNode::paragraph(
            "All adverse events are recorded from signing the informed consent.",
            &["1 Adverse Events"],
        ))
        .node(ContentNode::heading(1, "2 Study Population", &["2 Study Population"]))
        .node(ContentNode::list_item(
            "Adults aged 18 to 65 years.",
            &["2 Study Population"],
        ));
    if let Some(text) = extra {
        doc = doc.node(ContentNode::paragraph(text, &["1 Adverse Events"]));
    }
    doc
}

fn write_doc(dir: &Path, name: &str, doc: &ParsedDocument) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(doc).unwrap()).unwrap();
    path
}

#[allow(deprecated)]
fn trialmap() -> Command {
    let mut cmd = Command::cargo_bin("trialmap").unwrap();
    cmd.env_remove("TRIALMAP_CAMPAIGN_CONCURRENCY");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn config_hash_lists_every_source() {
    let output = trialmap()
        .args(["config-hash", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["config_hash"].as_str().unwrap().len(), 64);
    let names: Vec<&str> = json["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["csr", "facts", "generic", "protocol", "sections", "topics"]
    );
}

#[test]
fn ingest_writes_runs_and_artifacts() {
    let dir = TempDir::new().unwrap();
    let doc = write_doc(dir.path(), "p1.json", &protocol("P-1:v1", None));
    let out = dir.path().join("out");

    let output = trialmap()
        .arg("ingest")
        .arg(&doc)
        .arg("--output-dir")
        .arg(&out)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let runs = stdout_json(&output);
    let run = &runs.as_array().unwrap()[0];
    assert_eq!(run["doc_version_id"], "P-1:v1");
    assert_eq!(run["status"], "completed");
    assert_eq!(run["metrics"]["anchors"], 4);
    assert_eq!(run["metrics"]["lock_wait_ms"], 0);

    let artifacts: Value =
        serde_json::from_slice(&std::fs::read(out.join("P-1_v1.json")).unwrap()).unwrap();
    assert_eq!(artifacts["schema_version"], 1);
    assert_eq!(artifacts["doc_version_id"], "P-1:v1");
    assert_eq!(artifacts["anchors"].as_array().unwrap().len(), 4);
}

#[test]
fn ingest_fails_when_a_document_fails() {
    let dir = TempDir::new().unwrap();
    let good = write_doc(dir.path(), "good.json", &protocol("P-1:v1", None));
    let empty = write_doc(
        dir.path(),
        "empty.json",
        &ParsedDocument::new("P-2:v1", DocumentType::Protocol, Language::En),
    );

    trialmap()
        .arg("ingest")
        .arg(&good)
        .arg(&empty)
        .assert()
        .failure()
        .stdout(predicate::str::contains("P-1:v1"))
        .stdout(predicate::str::contains("P-2:v1: failed"))
        .stderr(predicate::str::contains("1 of 2 documents failed"));
}

#[test]
fn diff_reports_added_anchor() {
    let dir = TempDir::new().unwrap();
    let prev = write_doc(dir.path(), "v1.json", &protocol("P-1:v1", None));
    let curr = write_doc(
        dir.path(),
        "v2.json",
        &protocol("P-1:v2", Some("Serious adverse events are reported within 24 hours.")),
    );

    let output = trialmap()
        .arg("diff")
        .arg(&prev)
        .arg(&curr)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["prev_doc_version_id"], "P-1:v1");
    assert_eq!(report["matches"].as_array().unwrap().len(), 4);
    assert_eq!(report["added"].as_array().unwrap().len(), 1);
    assert!(report["deleted"].as_array().unwrap().is_empty());
}

#[test]
fn classify_prints_one_line_per_anchor() {
    let dir = TempDir::new().unwrap();
    let doc = write_doc(dir.path(), "p1.json", &protocol("P-1:v1", None));

    let output = trialmap().arg("classify").arg(&doc).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 4);
    assert!(stdout.contains("Adults aged 18 to 65"));
}

#[test]
fn unreadable_document_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, b"not json").unwrap();

    trialmap()
        .arg("classify")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.json"));
}

#[test]
fn missing_rules_dir_is_an_error() {
    let dir = TempDir::new().unwrap();
    trialmap()
        .arg("config-hash")
        .arg("--rules-dir")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
