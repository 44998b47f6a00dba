//! CLI argument validation tests.
//!
//! Tests command-line argument parsing, validation, and error handling.

#![allow(clippy::unwrap_used)]
#![allow(deprecated)] // cargo_bin deprecation

use assert_cmd::Command;
use predicates::prelude::*;

fn attention_ml(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("attention-ml").unwrap();
    // Keep a developer's config files out of the run
    cmd.current_dir(dir).env("HOME", dir).env("XDG_CONFIG_HOME", dir);
    for var in ["SEQUENCE_LENGTH", "WINDOW_STRIDE", "DATASET_PATH", "MODEL_PATH", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

// === Help and Subcommand Tests ===

#[test]
fn test_help_lists_subcommands() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("serve")
                .and(predicate::str::contains("export"))
                .and(predicate::str::contains("train"))
                .and(predicate::str::contains("models")),
        );
}

#[test]
fn test_missing_subcommand_is_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path()).assert().failure();
}

#[test]
fn test_backend_token_value_is_hidden_in_help() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .env("BACKEND_TOKEN", "super-secret")
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BACKEND_TOKEN").and(predicate::str::contains("super-secret").not()));
}

// === Export Argument Tests ===

#[test]
fn test_export_requires_records() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RECORDS").or(predicate::str::contains("required")));
}

#[test]
fn test_export_rejects_zero_stride() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["export", "records.json", "--stride", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be at least 1"));
}

#[test]
fn test_export_rejects_unknown_mode() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["export", "records.json", "--mode", "parquet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("features").and(predicate::str::contains("frames")));
}

#[test]
fn test_export_missing_records_file_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["export", "missing.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to open records"));
}

// === Train and Serve Argument Tests ===

#[test]
fn test_train_rejects_non_positive_learning_rate() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["train", "--lr", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a positive learning rate"));
}

#[test]
fn test_train_missing_dataset_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["train", "--dataset", "missing.jsonl", "--quiet"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.jsonl"));
}

#[test]
fn test_serve_rejects_bad_confidence() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["serve", "--min-face-confidence", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in range"));
}

// === Models Tests ===

#[test]
fn test_models_path_prints_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["models", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("attention-ml").and(predicate::str::contains("models")));
}

#[test]
fn test_models_list_reports_missing_weights() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .env("XDG_DATA_HOME", temp_dir.path())
        .args(["models", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blazeface").and(predicate::str::contains("0/2 models installed")));
}

#[test]
fn test_models_inspect_missing_artifact_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    attention_ml(temp_dir.path())
        .args(["models", "inspect", "nowhere/model"])
        .assert()
        .code(2);
}
