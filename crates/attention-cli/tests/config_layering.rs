//! Integration tests for configuration layering.
//!
//! Tests the full priority chain: hardcoded defaults < XDG config < project config < CLI args

#![allow(clippy::unwrap_used)] // Test code uses unwrap for brevity
#![allow(deprecated)] // cargo_bin deprecation warning

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use attention_adapters::RecordDump;
use attention_test_support::RecordBuilder;
use predicates::prelude::*;
use serde_json::Value;

/// One phase of 20 feature events: 2 windows at the default stride of 4,
/// 3 at stride 2 and 1 at stride 8.
fn write_records(dir: &Path) {
    let dump = RecordDump {
        results: vec![RecordBuilder::result(1, 10, &[(1, 5.0, 0.0, 0.0)])],
        events: RecordBuilder::events(1, 10, 1, 20, 0),
    };
    fs::write(dir.join("records.json"), serde_json::to_string(&dump).unwrap()).unwrap();
}

fn export(dir: &Path, extra: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("attention-ml").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("SEQUENCE_LENGTH")
        .env_remove("WINDOW_STRIDE")
        .env_remove("DATASET_PATH")
        .args(["export", "records.json", "--quiet", "-o", "out.jsonl"])
        .args(extra);
    cmd
}

fn samples_written(cmd: &mut Command) -> u64 {
    let output = cmd.assert().success().get_output().stdout.clone();
    let stats: Value = serde_json::from_slice(&output).unwrap();
    stats["samples_written"].as_u64().unwrap()
}

#[test]
fn test_hardcoded_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    assert_eq!(samples_written(&mut export(temp_dir.path(), &[])), 2);
}

#[test]
fn test_project_config_applies_stride() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    fs::write(
        temp_dir.path().join(".attention-ml.toml"),
        r"
[export]
stride = 2
",
    )
    .unwrap();

    assert_eq!(samples_written(&mut export(temp_dir.path(), &[])), 3);
}

#[test]
fn test_cli_overrides_project_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    fs::write(
        temp_dir.path().join(".attention-ml.toml"),
        r"
[export]
stride = 2
",
    )
    .unwrap();

    assert_eq!(samples_written(&mut export(temp_dir.path(), &["--stride", "4"])), 2);
}

#[test]
fn test_env_overrides_project_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    fs::write(
        temp_dir.path().join(".attention-ml.toml"),
        r"
[export]
stride = 2
",
    )
    .unwrap();

    let mut cmd = export(temp_dir.path(), &[]);
    cmd.env("WINDOW_STRIDE", "8");
    assert_eq!(samples_written(&mut cmd), 1);
}

#[test]
fn test_project_config_overrides_xdg_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    let xdg_dir = temp_dir.path().join("attention-ml");
    fs::create_dir_all(&xdg_dir).unwrap();
    fs::write(
        xdg_dir.join("config.toml"),
        r"
[export]
stride = 8
out = 'from-xdg.jsonl'
",
    )
    .unwrap();

    // XDG alone
    let mut cmd = Command::cargo_bin("attention-ml").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("XDG_CONFIG_HOME", temp_dir.path())
        .env_remove("WINDOW_STRIDE")
        .env_remove("SEQUENCE_LENGTH")
        .env_remove("DATASET_PATH")
        .args(["export", "records.json", "--quiet"]);
    assert_eq!(samples_written(&mut cmd), 1);
    assert!(temp_dir.path().join("from-xdg.jsonl").is_file());

    // Project config wins for the values it sets
    fs::write(
        temp_dir.path().join(".attention-ml.toml"),
        r"
[export]
stride = 2
",
    )
    .unwrap();
    assert_eq!(samples_written(&mut export(temp_dir.path(), &[])), 3);
}

#[test]
fn test_invalid_config_value_falls_back_to_default() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    fs::write(
        temp_dir.path().join(".attention-ml.toml"),
        r"
[export]
stride = 0
",
    )
    .unwrap();

    export(temp_dir.path(), &[])
        .assert()
        .success()
        .stderr(predicate::str::contains("export.stride must be positive"))
        .stdout(predicate::str::contains("\"samples_written\":2"));
}

#[test]
fn test_config_window_length_applies() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_records(temp_dir.path());
    fs::write(
        temp_dir.path().join(".attention-ml.toml"),
        r"
[window]
sequence_length = 20
",
    )
    .unwrap();

    assert_eq!(samples_written(&mut export(temp_dir.path(), &[])), 1);
}
