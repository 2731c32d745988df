//! CLI commands against a sled queue in a temporary workspace.

use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vigil::cli::{Cli, RunContext};
use vigil::queue::QueuedMutation;

/// Workspace whose config keeps the queue inside it and points the gateway at
/// a closed local port.
fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("vigil.toml"),
        r#"
[storage]
queue_path = "state/queue"

[gateway]
base_url = "http://127.0.0.1:9/api/screen-time"
connect_timeout_secs = 1
request_timeout_secs = 2
"#,
    )
    .unwrap();
    temp
}

fn run(workspace: &Path, args: &[&str]) -> Result<String, String> {
    let config = workspace.join("vigil.toml");
    let ws = workspace.to_string_lossy().to_string();
    let cfg = config.to_string_lossy().to_string();
    let mut argv = vec!["vigil", "--workspace", ws.as_str(), "--config", cfg.as_str()];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).map_err(|e| e.to_string())?;
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .map_err(|e| vigil::cli::map_error(&e))?;
    context
        .execute(&cli.command)
        .map_err(|e| vigil::cli::map_error(&e))
}

fn queued(workspace: &Path) -> Vec<QueuedMutation> {
    let listed = run(workspace, &["queue", "list", "--format", "json"]).unwrap();
    serde_json::from_str(&listed).unwrap()
}

#[test]
fn queue_lives_under_the_workspace() {
    let ws = workspace();
    run(
        ws.path(),
        &["queue", "enqueue", "--url", "http://127.0.0.1:9/api/mood", "--method", "put"],
    )
    .unwrap();
    assert!(PathBuf::from(ws.path()).join("state").join("queue").exists());

    let pending = queued(ws.path());
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].method, "PUT");
    assert_eq!(pending[0].max_retries, 3);
}

#[test]
fn enqueue_list_remove_across_invocations() {
    let ws = workspace();
    let out = run(
        ws.path(),
        &[
            "queue",
            "enqueue",
            "--url",
            "http://127.0.0.1:9/api/sessions",
            "--priority",
            "low",
            "--max-retries",
            "5",
        ],
    )
    .unwrap();
    let id = out.strip_prefix("Queued ").unwrap().to_string();

    let text = run(ws.path(), &["queue", "list"]).unwrap();
    assert!(text.contains(&id));
    assert!(text.contains("0/5"));

    assert_eq!(run(ws.path(), &["queue", "remove", id.as_str()]).unwrap(), format!("Removed {}", id));
    assert!(queued(ws.path()).is_empty());
    assert!(run(ws.path(), &["queue", "remove", id.as_str()]).is_err());
}

#[test]
fn sync_once_against_unreachable_remote_keeps_records() {
    let ws = workspace();
    run(
        ws.path(),
        &["queue", "enqueue", "--url", "http://127.0.0.1:9/api/sessions", "--body", "{}"],
    )
    .unwrap();

    let out = run(ws.path(), &["sync", "once"]).unwrap();
    assert_eq!(
        out,
        "Sync complete: 0 delivered, 0 dropped, 1 kept for retry (1 total)"
    );
    let pending = queued(ws.path());
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);
}

#[test]
fn unreachable_remote_is_reported_with_a_hint() {
    let ws = workspace();
    let err = run(ws.path(), &["thresholds", "get", "kid-1"]).unwrap_err();
    assert!(err.contains("reachable"), "unexpected error: {}", err);
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let ws = workspace();
    std::fs::write(
        ws.path().join("vigil.toml"),
        "[monitor]\nidle_timeout_secs = 0\n",
    )
    .unwrap();
    let err = run(ws.path(), &["queue", "list"]).unwrap_err();
    assert!(err.contains("monitor: idle_timeout_secs"));
}
