use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn repo_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("expected crates/<name> layout")
        .to_path_buf()
}

fn fixture(name: &str) -> PathBuf {
    let path = repo_root().join("fixtures").join("graphs").join(name);
    assert!(path.exists(), "fixture missing: {}", path.display());
    path
}

fn run_json(args: &[&str]) -> Value {
    let exe = assert_cmd::cargo_bin!("narwhal-cli");
    let output = Command::new(exe)
        .current_dir(repo_root())
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

#[test]
fn cli_lays_out_chain_fixture() {
    let path = fixture("chain.json");
    let out = run_json(&["layout", "--seed", "3", path.to_string_lossy().as_ref()]);

    assert_eq!(out["converged"], Value::Bool(true));
    let nodes = out["nodes"].as_array().expect("nodes");
    let ids: Vec<&str> = nodes.iter().map(|n| n["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["A", "B", "C"]);
    for n in nodes {
        assert!(n["x"].as_f64().unwrap().is_finite());
        let sx = n["screenX"].as_f64().expect("screenX");
        let sy = n["screenY"].as_f64().expect("screenY");
        assert!((0.0..=800.0).contains(&sx) && (0.0..=600.0).contains(&sy));
    }
    assert_eq!(out["edges"].as_array().unwrap().len(), 2);
    assert!(out["energy"]["mean"].as_f64().unwrap() <= 0.05);
}

#[test]
fn cli_layout_is_reproducible_with_a_seed() {
    let path = fixture("star.json");
    let p = path.to_string_lossy();
    let a = run_json(&["--seed", "11", p.as_ref()]);
    let b = run_json(&["--seed", "11", p.as_ref()]);
    assert_eq!(a, b);

    let hub = a["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == "hub")
        .expect("hub");
    assert_eq!(hub["x"].as_f64(), Some(0.0));
    assert_eq!(hub["y"].as_f64(), Some(0.0));
    assert_eq!(hub["fixed"], Value::Bool(true));
}

#[test]
fn cli_reads_options_file_and_stdin() {
    let root = repo_root();
    let options = root.join("fixtures").join("exact-repulsion.options.json");
    let graph = fs::read(fixture("chain.json")).expect("read fixture");

    let tmp = tempfile::tempdir().expect("tempdir");
    let stdin_path = tmp.path().join("chain.json");
    fs::write(&stdin_path, &graph).expect("write graph");

    let exe = assert_cmd::cargo_bin!("narwhal-cli");
    let output = Command::new(exe)
        .current_dir(&root)
        .args([
            "layout",
            "--options",
            options.to_string_lossy().as_ref(),
            "--max-ticks",
            "20",
            "-",
        ])
        .stdin(fs::File::open(&stdin_path).expect("open graph"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let out: Value = serde_json::from_slice(&output).expect("stdout is JSON");

    assert_eq!(out["ticks"].as_u64(), Some(20));
    assert_eq!(out["converged"], Value::Bool(false));
    for n in out["nodes"].as_array().unwrap() {
        assert!(n["screenX"].as_f64().is_some_and(f64::is_finite));
    }
}

#[test]
fn cli_check_reports_counts() {
    let path = fixture("star.json");
    let out = run_json(&["check", path.to_string_lossy().as_ref()]);
    assert_eq!(out["nodes"].as_u64(), Some(7));
    assert_eq!(out["edges"].as_u64(), Some(5));
    assert_eq!(out["components"].as_u64(), Some(2));
    assert_eq!(out["isolated"], serde_json::json!(["loner"]));
    assert_eq!(out["problems"], serde_json::json!([]));
}

#[test]
fn cli_rejects_broken_graph() {
    let path = fixture("broken.json");
    let exe = assert_cmd::cargo_bin!("narwhal-cli");
    Command::new(exe)
        .args(["layout", path.to_string_lossy().as_ref()])
        .assert()
        .code(3);

    let exe = assert_cmd::cargo_bin!("narwhal-cli");
    let assert = Command::new(exe)
        .args(["check", path.to_string_lossy().as_ref()])
        .assert()
        .code(3);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("unknown node `missing`"), "{stderr}");
    assert!(stderr.contains("self loop"), "{stderr}");
}

#[test]
fn cli_usage_errors_exit_with_two() {
    let exe = assert_cmd::cargo_bin!("narwhal-cli");
    Command::new(exe).args(["--nope"]).assert().code(2);
}
