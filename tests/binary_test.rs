//! Integration tests for the trace-replay binary
//!
//! These tests run the compiled binary as a subprocess against trace files
//! written to a temporary directory.

mod common;

use common::*;
use kvreplay::trace::SeekType;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn trace_replay(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_trace-replay"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run trace-replay")
}

fn stdout_json(output: &Output) -> Vec<serde_json::Value> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::Deserializer::from_str(&stdout)
        .into_iter::<serde_json::Value>()
        .map(|v| v.expect("stdout should be JSON"))
        .collect()
}

fn sample_trace(path: &Path) {
    write_trace_file(
        path,
        2,
        1_000,
        &[
            put(1_000, 1, "alice", "1"),
            get(1_010, 1, "alice"),
            get(1_020, 2, "order-1"),
            seek(1_030, 1, "a", SeekType::SeekForPrev),
            multi_get(1_040, &[1, 2], &["alice", "order-2"]),
        ],
    );
}

#[test]
fn test_help_lists_commands() {
    let output = trace_replay(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("replay"));
}

#[test]
fn test_inspect_reports_counts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.trace");
    sample_trace(&path);

    let output = trace_replay(&["inspect", path.to_str().unwrap()]);
    assert!(output.status.success(), "{:?}", output);

    let report = &stdout_json(&output)[0];
    assert_eq!(report["trace_file_version"], 2);
    assert_eq!(report["header_timestamp"], 1_000);
    assert_eq!(report["records"], 5);
    assert_eq!(report["by_kind"]["get"], 2);
    assert_eq!(report["by_kind"]["iterator_seek_for_prev"], 1);
    assert_eq!(report["last_timestamp"], 1_040);
    assert_eq!(report["ended_cleanly"], true);
}

#[test]
fn test_replay_against_memory_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.trace");
    sample_trace(&path);

    let output = trace_replay(&[
        "replay",
        path.to_str().unwrap(),
        "--threads",
        "2",
        "--fast-forward",
        "10",
        "--column-families",
        "users,orders",
    ]);
    assert!(output.status.success(), "{:?}", output);

    let docs = stdout_json(&output);
    let summary = &docs[0];
    assert_eq!(summary["records_dispatched"], 5);
    assert_eq!(summary["records_failed"], 0);
    assert_eq!(summary["footer_seen"], true);

    let stats = &docs[1];
    assert_eq!(stats["writes"], 1);
}

#[test]
fn test_replay_unknown_column_family_counts_failures() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.trace");
    sample_trace(&path);

    // Only cf 1 exists; records on cf 2 fail but the replay completes
    let output = trace_replay(&[
        "replay",
        path.to_str().unwrap(),
        "--column-families",
        "users",
    ]);
    assert!(output.status.success(), "{:?}", output);
    let summary = &stdout_json(&output)[0];
    assert_eq!(summary["records_failed"], 2);
}

#[test]
fn test_replay_uses_config_file() {
    let dir = tempdir().unwrap();
    let trace = dir.path().join("sample.trace");
    sample_trace(&trace);
    let config = dir.path().join("replay.toml");
    std::fs::write(&config, "[replay]\nfast_forward_ratio = 0.0\n").unwrap();

    let output = trace_replay(&[
        "replay",
        trace.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("fast_forward_ratio"));
}

#[test]
fn test_missing_trace_file_fails() {
    let dir = tempdir().unwrap();
    let output = trace_replay(&["inspect", dir.path().join("nope.trace").to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open trace file"));
}

#[test]
fn test_example_config_parses() {
    let output = trace_replay(&["example-config"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(kvreplay::ConfigFile::parse(&text).is_ok());
}
