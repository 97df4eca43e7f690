use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let claude_dir = home.join(".claude");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_log_fixture(&claude_dir);

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("tokenscope").expect("binary should build");
        cmd.env("HOME", &self.home)
            .env("XDG_CONFIG_HOME", &self.xdg_config)
            .env("XDG_STATE_HOME", &self.xdg_state)
            .env_remove("RUST_LOG");
        cmd
    }
}

fn seed_log_fixture(claude_dir: &Path) {
    let project = claude_dir.join("projects").join("-Users-jo-dev-widget");
    fs::create_dir_all(&project).expect("failed to create project dir");

    fs::write(
        project.join("session-a.jsonl"),
        concat!(
            "{\"sessionId\":\"session-a\",\"timestamp\":\"2025-06-02T10:00:00Z\",",
            "\"message\":{\"role\":\"user\",\"content\":\"hi\"}}\n",
            "{\"sessionId\":\"session-a\",\"timestamp\":\"2025-06-02T10:01:00Z\",",
            "\"message\":{\"role\":\"assistant\",\"content\":[",
            "{\"type\":\"tool_use\",\"id\":\"c1\",\"name\":\"Read\",\"input\":{\"file_path\":\"x\"}}],",
            "\"usage\":{\"input_tokens\":1000,\"output_tokens\":200}}}\n",
        ),
    )
    .expect("failed to write fixture");
}

#[test]
fn json_report_lands_on_stdout() {
    let env = CliTestEnv::new();

    let assert = env.command().arg("--quiet").assert().success();
    let output = assert.get_output();

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON");
    assert_eq!(report["summary"]["session_count"], 1);
    assert_eq!(report["summary"]["files_scanned"], 1);
    assert_eq!(report["tokens"]["input"], 1000);
    assert_eq!(report["tools"][0]["name"], "Read");
}

#[test]
fn summary_goes_to_stderr_not_stdout() {
    let env = CliTestEnv::new();

    env.command()
        .assert()
        .success()
        .stderr(predicate::str::contains("1 sessions"))
        .stderr(predicate::str::contains("Cost at sonnet (default)"))
        .stdout(predicate::str::starts_with("{"));
}

#[test]
fn html_dashboard_embeds_the_report() {
    let env = CliTestEnv::new();
    let out = env.home.join("dashboard.html");

    env.command()
        .args(["--format", "html", "--output"])
        .arg(&out)
        .assert()
        .success();

    let html = fs::read_to_string(&out).expect("dashboard file should exist");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("\"session_count\": 1"));
    assert!(!html.contains("__DATA_PLACEHOLDER__"));
}

#[test]
fn explicit_claude_dir_overrides_home() {
    let env = CliTestEnv::new();
    let other = env.home.join("elsewhere");
    seed_log_fixture(&other);

    env.command()
        .args(["--claude-dir"])
        .arg(&other)
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"session_count\": 1"));
}

#[test]
fn missing_root_fails_with_a_useful_message() {
    let env = CliTestEnv::new();

    env.command()
        .args(["--claude-dir", "/nonexistent/claude"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("log root not found"));
}

#[test]
fn tier_flag_selects_pricing() {
    let env = CliTestEnv::new();

    let assert = env
        .command()
        .args(["--tier", "opus", "--quiet"])
        .assert()
        .success();
    let report: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("valid JSON");
    assert_eq!(report["costs"]["default_tier"], "opus");

    env.command()
        .args(["--tier", "nonexistent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown tier"));
}

#[test]
fn config_file_sets_defaults() {
    let env = CliTestEnv::new();
    let config_dir = env.xdg_config.join("tokenscope");
    fs::create_dir_all(&config_dir).expect("failed to create config dir");
    fs::write(
        config_dir.join("config.toml"),
        "[pricing]\ndefault_tier = \"haiku\"\n",
    )
    .expect("failed to write config");

    let assert = env.command().arg("--quiet").assert().success();
    let report: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("valid JSON");
    assert_eq!(report["costs"]["default_tier"], "haiku");
}
