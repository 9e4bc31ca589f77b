//! Integration tests for the agent: config files, offline parsing, and the
//! snapshot output loop.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use shinhai_gas::testing::{sample_bill, ScriptedSource};
use shinhai_gas::{scheduler, AccountId, BillingSensor, Poller, RawResponse, SchedulerConfig};
use shinhai_gas_agent::config::{load_file_config, resolve_with, FileConfig, Overrides, ENV_CONFIG};
use shinhai_gas_agent::{info, parse_file, run_scheduler, AgentError};

// ─────────────────────── helpers ───────────────────────

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn no_env(_: &str) -> Option<String> {
    None
}

fn account() -> AccountId {
    AccountId::new("12345678909").unwrap()
}

// ─────────────────────── config ───────────────────────

#[test]
fn test_config_file_supplies_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "config.json",
        r#"{
            "account": "12345678909",
            "endpoint": "http://127.0.0.1:8080/billquery.php",
            "scan_interval_secs": 600,
            "recovery_interval_secs": 3600,
            "request_timeout_secs": 3
        }"#,
    );

    let overrides = Overrides {
        config: Some(path.clone()),
        ..Overrides::default()
    };
    let config = resolve_with(overrides, no_env).unwrap();

    assert_eq!(config.account.as_str(), "12345678909");
    assert_eq!(config.endpoint, "http://127.0.0.1:8080/billquery.php");
    assert_eq!(config.scan_interval_secs, 600);
    assert_eq!(config.recovery_interval_secs, 3600);
    assert_eq!(config.request_timeout(), Duration::from_secs(3));
    assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
}

#[test]
fn test_env_beats_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "config.json", r#"{"account": "11111111111"}"#);
    let path_str = path.display().to_string();

    let config = resolve_with(Overrides::default(), |key| match key {
        "SHINHAI_GAS_ACCOUNT" => Some("22222222222".to_string()),
        k if k == ENV_CONFIG => Some(path_str.clone()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.account.as_str(), "22222222222");
    assert_eq!(config.config_file, Some(path));
}

#[test]
fn test_home_config_is_found() {
    let home = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(home.path().join(".shinhai-gas")).unwrap();
    write_file(&home, ".shinhai-gas/config.json", r#"{"account": "33333333333"}"#);
    let home_str = home.path().display().to_string();

    let config = resolve_with(Overrides::default(), |key| {
        (key == "HOME").then(|| home_str.clone())
    })
    .unwrap();
    assert_eq!(config.account.as_str(), "33333333333");
}

#[test]
fn test_malformed_config_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "config.json", "{ not json");

    assert!(load_file_config(&path).is_err());

    let overrides = Overrides {
        config: Some(path),
        ..Overrides::default()
    };
    let err = resolve_with(overrides, no_env).unwrap_err();
    assert!(matches!(err, AgentError::MissingAccount));
}

#[test]
fn test_partial_config_file_parses() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "config.json", r#"{"scan_interval_secs": 45}"#);
    let file = load_file_config(&path).unwrap();
    assert_eq!(
        file,
        FileConfig {
            scan_interval_secs: Some(45),
            ..FileConfig::default()
        }
    );
}

#[test]
fn test_info_reports_sensor_name() {
    let config = resolve_with(
        Overrides {
            account: Some("12345678909".into()),
            ..Overrides::default()
        },
        no_env,
    )
    .unwrap();
    let value = info(&config);
    assert_eq!(value["sensor"], "shinhai_gas_fee_12345678909");
    assert_eq!(value["config"]["account"], "12345678909");
    assert_eq!(value["config"]["scan_interval_secs"], 1800);
}

// ─────────────────────── parse ───────────────────────

#[test]
fn test_parse_saved_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "bill.html", &sample_bill("1,234.50 元"));

    let snapshot = parse_file(&path, &account()).unwrap();
    assert_eq!(snapshot.state.as_deref(), Some("1234.50"));
    assert_eq!(snapshot.attributes["billing_amount"].as_deref(), Some("1,234.50 元"));
    assert_eq!(snapshot.attributes["https_result"].as_deref(), Some("success"));
}

#[test]
fn test_parse_page_without_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "empty.html", "<html><body></body></html>");

    let snapshot = parse_file(&path, &account()).unwrap();
    assert_eq!(snapshot.state, None);
    assert_eq!(snapshot.attributes["https_result"].as_deref(), Some("not_found"));
}

#[test]
fn test_parse_missing_file() {
    let err = parse_file(std::path::Path::new("/nonexistent/bill.html"), &account()).unwrap_err();
    assert!(matches!(err, AgentError::Io(_)));
}

// ─────────────────────── serve loop ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_run_scheduler_writes_json_lines() {
    let source = ScriptedSource::new(vec![Ok(RawResponse::new(200, sample_bill("350 元")))]);
    let sensor = BillingSensor::new(&account());
    let poller = Poller::new(account(), source.clone());
    let handle = scheduler::spawn(
        Arc::new(Mutex::new(poller)),
        sensor,
        SchedulerConfig::default(),
    );

    let mut out: Vec<u8> = Vec::new();
    tokio_test::assert_ok!(
        run_scheduler(handle, &mut out, tokio::time::sleep(Duration::from_secs(600))).await
    );

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);

    let snapshot: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(snapshot["name"], "shinhai_gas_fee_12345678909");
    assert_eq!(snapshot["state"], "350");
    assert_eq!(snapshot["session"], "active");
    assert_eq!(source.calls(), 1);
}
