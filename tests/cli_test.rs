// Exit-code contract of the codewiki binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, text) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
    dir
}

fn codewiki(cwd: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("codewiki").unwrap();
    // keep a stray codewiki.toml in the caller's directory out of the run
    cmd.current_dir(cwd.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_analyze_writes_outputs() {
    let src = project(&[
        ("app/main.py", "from .util import clean\n\ndef main():\n    clean()\n"),
        ("app/util.py", "def clean():\n    return 1\n"),
    ]);
    let out = TempDir::new().unwrap();

    codewiki(&out)
        .arg("analyze")
        .arg(src.path())
        .arg("--output")
        .arg(out.path().join("docs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Analysis complete: 2 files"));

    let document = fs::read_to_string(out.path().join("docs/document.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&document).unwrap();
    assert_eq!(document["files"][0]["path"], "app/main.py");
    assert_eq!(document["files"][1]["path"], "app/util.py");

    let index = fs::read_to_string(out.path().join("docs/search_index.json")).unwrap();
    let index: serde_json::Value = serde_json::from_str(&index).unwrap();
    let records = index.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["language"], "python");
    assert_eq!(records[0]["file_type"], "source");
    assert_eq!(records[0]["security_level"], "");
}

#[test]
fn test_partial_parse_errors_still_succeed() {
    let src = project(&[
        ("ok.py", "def fine():\n    return 1\n"),
        ("bad.py", "def good():\n    pass\n\ndef broken(:\n    pass\n"),
    ]);
    let out = TempDir::new().unwrap();

    codewiki(&out)
        .arg("analyze")
        .arg(src.path())
        .arg("--output")
        .arg(out.path().join("docs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Recoverable problems"))
        .stdout(predicate::str::contains("bad.py"));
}

#[test]
fn test_security_flag_sets_level() {
    let src = project(&[("run.py", "import os\n\ndef run(cmd):\n    os.system(cmd)\n")]);
    let out = TempDir::new().unwrap();

    codewiki(&out)
        .arg("analyze")
        .arg(src.path())
        .args(["--security", "--output"])
        .arg(out.path().join("docs"))
        .assert()
        .success();

    let index = fs::read_to_string(out.path().join("docs/search_index.json")).unwrap();
    let index: serde_json::Value = serde_json::from_str(&index).unwrap();
    assert_eq!(index[0]["security_level"], "high");
}

#[test]
fn test_missing_root_fails() {
    let out = TempDir::new().unwrap();
    codewiki(&out)
        .args(["analyze", "/definitely/not/a/project"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_broken_config_fails() {
    let src = project(&[("a.py", "x = 1\n")]);
    let out = project(&[("codewiki.toml", "[enrichment]\nconcurrency = 0\n")]);

    codewiki(&out)
        .arg("analyze")
        .arg(src.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_edge_limit_reports_gathered_diagnostics() {
    let src = project(&[
        ("a.py", "from b import helper\n\ndef main():\n    helper()\n"),
        ("b.py", "def helper():\n    return 1\n\ndef broken(:\n    pass\n"),
    ]);
    let out = project(&[("codewiki.toml", "[analysis]\nmax_edges = 1\n")]);

    codewiki(&out)
        .arg("analyze")
        .arg(src.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Resource limit exceeded during graph"))
        .stderr(predicate::str::contains("Diagnostics gathered before the abort"))
        .stderr(predicate::str::contains("b.py"));
}

#[test]
fn test_version() {
    let out = TempDir::new().unwrap();
    codewiki(&out)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("codewiki "));
}
