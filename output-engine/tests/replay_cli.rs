//! Integration tests for the engine-replay CLI.
//!
//! These tests run the binary against the demo scenario and check its output
//! and exit codes.

use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_engine-replay"))
}

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

/// Replaying the demo session prints one line per step with output.
#[test]
fn test_replay_demo_scenario() {
    let output = binary()
        .arg("replay")
        .arg(demo("checkbox_focus.json"))
        .arg("--config")
        .arg(demo("engine.toml"))
        .output()
        .expect("Failed to execute engine-replay");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let lines = json_lines(&output.stdout);
    let steps: Vec<u64> = lines.iter().map(|l| l["step"].as_u64().unwrap()).collect();
    assert_eq!(steps, vec![0, 1, 3, 4, 5]);

    assert_eq!(lines[1]["speech"][0]["text"], "Enable");
    assert_eq!(lines[1]["speech"][1]["text"], "check box");
    assert_eq!(lines[1]["speech"][2]["text"], "not checked");

    // The application script overrides the state-change template
    let changed: Vec<&str> = lines[2]["speech"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["text"].as_str().unwrap())
        .collect();
    assert_eq!(changed, vec!["Enable", "checked"]);

    let regions = lines[1]["braille"].as_array().unwrap();
    assert_eq!(regions[0]["text"], "Preferences");
    assert_eq!(regions[0]["focused"], false);
    assert_eq!(regions[1]["text"], "< >");
    assert_eq!(regions[1]["focused"], true);
    assert_eq!(regions[2]["text"], "Enable");
    assert_eq!(regions[2]["focused"], false);
}

#[test]
fn test_missing_scenario_fails() {
    let dir = TempDir::new().unwrap();
    let output = binary()
        .arg("replay")
        .arg(dir.path().join("absent.json"))
        .arg("--config")
        .arg(demo("engine.toml"))
        .output()
        .expect("Failed to execute engine-replay");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read"));
}

#[test]
fn test_unknown_command_fails() {
    let output = binary().arg("launch").output().expect("Failed to execute engine-replay");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown command"));
}

#[test]
fn test_help_succeeds() {
    let output = binary().arg("--help").output().expect("Failed to execute engine-replay");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("USAGE"));
}

/// check-config reports templates naming attributes nothing resolves.
#[test]
fn test_check_config_reports_unknown_attributes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[templates]]
channel = "speech"
role = "slider"
context = "focused"
template = "labelOrName + sliderMood"
"#,
    )
    .unwrap();

    let output = binary()
        .arg("check-config")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute engine-replay");

    assert!(output.status.success());
    let report = &json_lines(&output.stdout)[0];
    assert_eq!(report["valid"], true);
    let diagnostics = report["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["unknown"][0], "sliderMood");
}

#[test]
fn test_check_config_rejects_malformed_template() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[templates]]
channel = "speech"
role = "slider"
template = "(labelOrName or"
"#,
    )
    .unwrap();

    let output = binary()
        .arg("check-config")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute engine-replay");

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json_lines(&output.stdout)[0]["valid"], false);
}

/// A schema error in a named config file is reported, not replaced by defaults.
#[test]
fn test_check_config_rejects_misspelled_context() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[templates]]
channel = "speech"
role = "check-box"
context = "focussed"
template = "name + roleName"
"#,
    )
    .unwrap();

    let output = binary()
        .arg("check-config")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute engine-replay");

    assert_eq!(output.status.code(), Some(1));
    let report = &json_lines(&output.stdout)[0];
    assert_eq!(report["valid"], false);
    assert!(report["error"].as_str().unwrap().contains("focussed"));

    let replay = binary()
        .arg("replay")
        .arg(demo("checkbox_focus.json"))
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute engine-replay");

    assert_eq!(replay.status.code(), Some(1));
    assert!(replay.stdout.is_empty());
    assert!(String::from_utf8_lossy(&replay.stderr).contains("Invalid configuration"));
}

#[test]
fn test_check_config_rejects_missing_file() {
    let dir = TempDir::new().unwrap();
    let output = binary()
        .arg("check-config")
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .output()
        .expect("Failed to execute engine-replay");

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json_lines(&output.stdout)[0]["valid"], false);
}
