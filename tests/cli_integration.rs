//! Integration tests for the toxmap CLI
//!
//! These tests exercise the binary end-to-end against a temporary
//! workspace. The remote host is never contacted - runs use
//! --skip-publish, and the publish failure paths are covered by the
//! library-level tests with a scripted transport.

use chrono::Local;
use serde_json::{json, Value as Json};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run toxmap with the given arguments
fn run_toxmap(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_toxmap"))
        .args(args)
        .output()
        .expect("Failed to execute toxmap")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_toxmap(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("toxmap"));
    assert!(out.contains("Poison-control call ETL"));
    assert!(out.contains("run"));
    assert!(out.contains("publish"));
}

#[test]
fn test_version_command() {
    let output = run_toxmap(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("toxmap"));
}

// =============================================================================
// Shell Completion Tests
// =============================================================================

#[test]
fn test_completion_zsh() {
    let output = run_toxmap(&["completion", "zsh"]);
    assert!(
        output.status.success(),
        "completion zsh failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("#compdef toxmap"),
        "zsh completion should contain #compdef"
    );
}

#[test]
fn test_completion_bash() {
    let output = run_toxmap(&["completion", "bash"]);
    assert!(
        output.status.success(),
        "completion bash failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("_toxmap"),
        "bash completion should contain _toxmap function"
    );
}

#[test]
fn test_completion_fish() {
    let output = run_toxmap(&["completion", "fish"]);
    assert!(
        output.status.success(),
        "completion fish failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("complete -c toxmap"),
        "fish completion should contain complete command"
    );
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[test]
fn test_run_with_missing_config_fails_with_banner() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = temp_dir.path().join("nope.toml");
    let output = run_toxmap(&["run", "--config", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("ERROR MESSAGE"));
    assert!(out.contains("nope.toml"));
}

// =============================================================================
// Full Local Run
// =============================================================================

/// Build a complete workspace fixture whose input records are dated "now",
/// so the run's today/this-hour windows contain them.
fn write_fixture(dir: &Path) -> PathBuf {
    let gdb = dir.join("gdb");
    std::fs::create_dir_all(&gdb).unwrap();

    std::fs::write(
        gdb.join("counties.locator.json"),
        json!({"counties": {"King": [-121.8, 47.5], "Pierce": [-122.1, 47.0]}}).to_string(),
    )
    .unwrap();

    let county_ref = json!({
        "schema": [{"name": "NAME10", "field_type": "Text"}],
        "rows": [[{"Text": "King"}], [{"Text": "Pierce"}]]
    });
    std::fs::write(gdb.join("county_ref.json"), county_ref.to_string()).unwrap();

    let now = Local::now().format("%b %e %Y %I:%M%p").to_string();
    let records: Vec<Json> = (1..=3)
        .map(|id| {
            json!({
                "CaseID": id,
                "Case_Details_StartDate": now,
                "Caller_Info_CallerZip": 98101,
                "Caller_Info_CallerCounty": "KING",
                "Caller_Info_CallerState_Text": "WA",
                "Major_Category_MajorCatDescription": "Analgesics",
                "Patient_Age_Groupings_PatAgeRange_Toxicall_Text": "20-29 years"
            })
        })
        .collect();
    let input = dir.join("toxdata.json");
    std::fs::write(&input, Json::Array(records).to_string()).unwrap();

    let config = format!(
        r#"
[workspace]
dir = "{gdb}"
input_file = "{input}"
locator = "counties"
diff_report = "{report}"
"#,
        gdb = gdb.display(),
        input = input.display(),
        report = dir.join("table-compare-output.txt").display(),
    );
    let config_path = dir.join("toxmap.toml");
    std::fs::write(&config_path, config).unwrap();
    config_path
}

#[test]
fn test_local_run_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_fixture(temp_dir.path());

    let output = run_toxmap(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--skip-publish",
    ]);
    assert!(
        output.status.success(),
        "run failed:\nstdout: {}\nstderr: {}",
        stdout(&output),
        stderr(&output)
    );

    let out = stdout(&output);
    assert!(out.contains("finished."));
    assert!(out.contains("Published:   skipped"));

    // The input artifact was consumed and renamed
    assert!(!temp_dir.path().join("toxdata.json").exists());

    // This month's master exists in the workspace
    let month_table = format!("calls_{}.json", Local::now().format("%Y%m"));
    assert!(temp_dir.path().join("gdb").join(month_table).exists());
    assert!(temp_dir.path().join("gdb").join("calls_this_day.json").exists());
}

#[test]
fn test_rerun_without_new_input_fails_cleanly() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_fixture(temp_dir.path());

    let output = run_toxmap(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--skip-publish",
    ]);
    assert!(output.status.success());

    // The first run consumed the input; a blind re-run must not
    // double-count anything.
    let output = run_toxmap(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--skip-publish",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Unable to find"));
}
