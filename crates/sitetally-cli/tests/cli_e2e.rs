use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};

fn sitetally_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sitetally"))
}

fn sitetally(args: &[&str]) -> Output {
    Command::new(sitetally_bin())
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("SITETALLY_STATE_DIR")
        .env_remove("SITETALLY_ENDPOINT")
        .env_remove("SITETALLY_COOKIE")
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn sitetally")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "sitetally failed:\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).expect("write json");
}

/// An endpoint nothing is listening on.
fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}/overview?key={{key}}&from={{from}}&to={{to}}")
}

#[test]
fn format_prints_scaled_metric() {
    let output = sitetally(&["format", "12345"]);
    assert_ok(&output);
    assert_eq!(stdout(&output).trim(), "1.2万");

    let output = sitetally(&["format", "150000000"]);
    assert_ok(&output);
    assert_eq!(stdout(&output).trim(), "1.5亿");

    let output = sitetally(&["format", ""]);
    assert_ok(&output);
    assert_eq!(stdout(&output).trim(), "—");
}

#[test]
fn format_rejects_non_numbers() {
    let output = sitetally(&["format", "lots"]);
    assert!(!output.status.success());
}

#[test]
fn discover_lists_entries_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog.json");
    write_json(
        &catalog,
        &json!({
            "Search": {
                "g": {"reference": "https://www.google.com/search"},
                "b": {"reference": "bing.com"}
            },
            "Tools": [{"reference": "https://github.com"}]
        }),
    );

    let output = sitetally(&["discover", "--catalog", catalog.to_str().unwrap()]);
    assert_ok(&output);
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "Search.b\tbing.com",
            "Search.g\tgoogle.com",
            "Tools.0\tgithub.com",
        ]
    );
}

#[test]
fn merge_prints_combined_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    let custom = dir.path().join("custom.json");
    write_json(
        &base,
        &json!({"Search": {"g": {"reference": "google.com", "tags": ["engine"]}}}),
    );
    write_json(&custom, &json!({"Search": {"e": {"reference": "example.com"}}}));

    let output = sitetally(&[
        "merge",
        "--base",
        base.to_str().unwrap(),
        "--custom",
        custom.to_str().unwrap(),
    ]);
    assert_ok(&output);
    let merged: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(merged["Search"]["g"]["tags"], json!(["engine"]));
    assert_eq!(merged["Search"]["e"]["reference"], json!("example.com"));

    let output = sitetally(&[
        "merge",
        "--base",
        base.to_str().unwrap(),
        "--custom",
        custom.to_str().unwrap(),
        "--mode",
        "override",
    ]);
    assert_ok(&output);
    let merged: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(merged["Search"].get("g").is_none());
}

#[test]
fn status_without_state_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let output = sitetally(&["status", "--state-dir", missing.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn run_without_any_catalog_fails() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state");
    let output = sitetally(&["run", "--state-dir", state.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no entries to enrich"));
}

#[test]
fn run_against_unreachable_endpoint_records_failures() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state");
    let config = dir.path().join("config.json");
    let out = dir.path().join("out.json");
    write_json(
        &config,
        &json!({
            "pacing": {"chunk_min": 1, "chunk_max": 2, "pause_min_secs": 0, "pause_max_secs": 0},
            "http": {"endpoint": refused_endpoint(), "timeout_secs": 5}
        }),
    );

    let output = sitetally(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--state-dir",
        state.to_str().unwrap(),
        "--input",
        r#"["example.com", "https://www.rust-lang.org"]"#,
        "--seed",
        "7",
        "-o",
        out.to_str().unwrap(),
    ]);
    assert_ok(&output);

    let catalog: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    for key in ["entry1", "entry2"] {
        let entry = &catalog["Manual"][key];
        assert_eq!(entry["tags"], json!(["manual"]));
        assert!(
            entry["failureReason"]
                .as_str()
                .is_some_and(|reason| reason.starts_with("Network error")),
            "{entry}"
        );
        assert!(entry.get("metric").is_none(), "{entry}");
    }

    // Checkpoint and settings survive the run.
    let checkpoint: Value =
        serde_json::from_str(&fs::read_to_string(state.join("current.json")).unwrap()).unwrap();
    assert_eq!(checkpoint, catalog);

    let output = sitetally(&["status", "--state-dir", state.to_str().unwrap()]);
    assert_ok(&output);
    let text = stdout(&output);
    assert!(text.contains("entries:  2"), "{text}");
    assert!(text.contains("failed:   2"), "{text}");
    assert!(text.contains("mode:     merge"), "{text}");
}
