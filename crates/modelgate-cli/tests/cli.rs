use assert_cmd::Command;
use predicates::str::contains;
use std::io::Write;

/// A command isolated from the developer's config file and environment.
fn modelgate(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("modelgate"));
    cmd.env("MODELGATE_CONFIG", config_dir.path().join("config.toml"))
        .env("RUST_LOG", "warn");
    for var in [
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "DEEPSEEK_API_KEY",
        "DEFAULT_PLANNER_MODEL",
        "DEFAULT_PROGRAMMER_MODEL",
        "DEFAULT_REVIEWER_MODEL",
        "DEFAULT_ROUTER_MODEL",
        "DEFAULT_SUMMARIZER_MODEL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    modelgate(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("ModelGate"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    modelgate(&dir).arg("--version").assert().success();
}

#[test]
fn test_resolve_repeats_primary() {
    let dir = tempfile::tempdir().unwrap();
    let output = modelgate(&dir)
        .args(["resolve", "planner", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let keys: Vec<&str> = value["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["modelKey"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["openai:o3", "openai:o3", "openai:o3"]);
}

#[test]
fn test_resolve_applies_corrections() {
    let dir = tempfile::tempdir().unwrap();
    modelgate(&dir)
        .args(["resolve", "programmer", "--model", "deepseek:deepseek-coder"])
        .assert()
        .success()
        .stdout(contains("deepseek:deepseek-chat"))
        .stdout(contains("deepseek-coder"));
}

#[test]
fn test_resolve_rejects_unknown_task() {
    let dir = tempfile::tempdir().unwrap();
    modelgate(&dir)
        .args(["resolve", "astrologer"])
        .assert()
        .failure()
        .stderr(contains("unknown task"));
}

#[test]
fn test_resolve_uses_pinned_provider_from_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[routing]\npinned_provider = \"deepseek\"\n",
    )
    .unwrap();
    modelgate(&dir)
        .args(["resolve", "planner"])
        .assert()
        .success()
        .stdout(contains("deepseek:deepseek-reasoner"));
}

#[test]
fn test_health_in_memory_has_no_tracked_models() {
    let dir = tempfile::tempdir().unwrap();
    modelgate(&dir)
        .arg("health")
        .assert()
        .success()
        .stdout(contains("No tracked models"));
}

#[test]
fn test_invoke_without_key_is_authentication_error() {
    let dir = tempfile::tempdir().unwrap();
    modelgate(&dir)
        .args(["invoke", "router", "hello"])
        .assert()
        .failure()
        .stderr(contains("Fix the API key"));
}

#[test]
fn test_compact_under_budget_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcript.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{"messages": [
            {{"role": "user", "content": "read the config"}},
            {{"type": "ai", "content": "", "tool_calls": [{{"id": "c1", "name": "read_file", "args": {{"path": "a.toml"}}}}]}},
            {{"type": "tool", "tool_call_id": "c1", "content": "x = 1"}}
        ]}}"#
    )
    .unwrap();

    let output = modelgate(&dir)
        .args(["compact", path.to_str().unwrap(), "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["report"]["outcome"], "under_budget");
    assert_eq!(value["entries"], 3);
}
