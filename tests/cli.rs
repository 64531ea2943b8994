use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

/// `concierge` isolated from the developer's own config and environment.
fn concierge(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("concierge").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("GEMINI_API_KEY")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT");
    cmd
}

#[test]
fn schema_lists_config_sections() {
    let dir = tempfile::tempdir().unwrap();
    concierge(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("trigger_word"))
        .stdout(predicate::str::contains("backoff_base_ms"));
}

#[test]
fn status_on_empty_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let output = concierge(dir.path())
        .args(["status", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["escalated"], 0);
    assert_eq!(report["known"], 0);
    assert_eq!(report["windows"]["live"], 0);
}

#[test]
fn status_with_malformed_state_exits_with_state_code() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("blocklist.json"), "not json").unwrap();
    concierge(dir.path())
        .args(["status", "--format", "text"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("blocklist.json"));
}

#[test]
fn init_non_interactive_writes_config() {
    let dir = tempfile::tempdir().unwrap();
    concierge(dir.path())
        .args(["init", "--no-interactive", "--trigger-word", "HUMANO", "--staff-group", "120363@g.us"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated"));

    let written = fs::read_to_string(dir.path().join("concierge.toml")).unwrap();
    assert!(written.contains("trigger_word = \"HUMANO\""));
    assert!(written.contains("group = \"120363@g.us\""));

    concierge(dir.path())
        .args(["init", "--no-interactive"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn doctor_flags_malformed_state() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("context.json"), "{broken").unwrap();
    concierge(dir.path())
        .args(["doctor", "--format", "text"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("malformed"))
        .stdout(predicate::str::contains("issue"));
}

#[test]
fn missing_explicit_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    concierge(dir.path())
        .args(["run", "--config", "nope.toml"])
        .assert()
        .code(2);
}

#[test]
fn missing_bridge_program_is_a_bridge_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("concierge.toml"),
        "[bridge]\ncommand = \"concierge-test-no-such-bridge\"\n",
    )
    .unwrap();
    concierge(dir.path())
        .arg("run")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

/// A scripted bridge: becomes ready, delivers one hand-off request, records
/// the three commands it receives, then reports the account as logged out.
#[test]
fn run_hands_off_trigger_word_and_stops_on_logout() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("bridge.log");
    let script = dir.path().join("bridge.sh");
    fs::write(
        &script,
        format!(
            r#"echo '{{"type":"ready"}}'
echo '{{"type":"message","chat":"120363@g.us","author":"5511@s.whatsapp.net","from_me":false,"text":"group chatter"}}'
echo '{{"type":"message","chat":"5511900000001@s.whatsapp.net","author":null,"from_me":false,"text":"quero o mingau"}}'
for i in 1 2 3; do read -r line; echo "$line" >> '{log}'; done
echo '{{"type":"closed","logged_out":true}}'
exec sleep 5
"#,
            log = log.display()
        ),
    )
    .unwrap();
    fs::write(
        dir.path().join("concierge.toml"),
        format!(
            "[responder]\nhandoff_message = \"One moment please\"\n\n[bridge]\ncommand = \"sh\"\nargs = [\"{}\"]\n",
            script.display()
        ),
    )
    .unwrap();

    concierge(dir.path())
        .args(["run", "--state-dir", "state"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(3);

    let sent: Vec<serde_json::Value> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0]["op"], "presence");
    assert_eq!(sent[0]["state"], "composing");
    assert_eq!(sent[1]["op"], "send_text");
    assert_eq!(sent[1]["text"], "One moment please");
    assert_eq!(sent[2]["state"], "unavailable");

    let blocklist: Vec<String> =
        serde_json::from_str(&fs::read_to_string(dir.path().join("state/blocklist.json")).unwrap()).unwrap();
    assert_eq!(blocklist, vec!["5511900000001@s.whatsapp.net".to_string()]);
}

#[test]
fn schema_can_be_written_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    concierge(dir.path())
        .args(["schema", "--output", "concierge.schema.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    let schema: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("concierge.schema.json")).unwrap()).unwrap();
    assert!(schema["properties"]["responder"].is_object());
}
