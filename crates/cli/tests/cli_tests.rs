// Binary tests: exit codes, offline export, and a relay sync end to end.
//
// Run with: cargo test -p sheetsync-cli --test cli_tests -- --nocapture

use std::path::Path;
use std::process::{Command, Output};

use httpmock::prelude::*;
use serde_json::json;

const ENV_VARS: &[&str] = &[
    "CRM_API_KEY",
    "CRM_BASE_URL",
    "RELAY_URL",
    "RELAY_SECRET",
    "SPREADSHEET_ID",
    "GOOGLE_ACCESS_TOKEN",
    "SHEET_NAME",
    "FILTER_CATEGORY",
    "FILTER_STATUSES",
    "DEAL_TYPE_ID",
    "PAGE_SIZE",
    "RATE_LIMIT_MS",
    "RUST_LOG",
];

/// Isolated from the caller's environment, config dir, and any `.env`.
fn sheetsync(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sheetsync"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_deals(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("deals.json");
    let deals = json!({
        "deals": [
            {
                "id": 1,
                "name": "Suite 10ユーザー 12ヶ月",
                "customer": { "id": 501, "name": "Acme" },
                "phase": { "name": "Won" },
                "product": { "name": "Suite" },
                "amount": 120000,
                "createdAt": "2024-01-01",
                "updatedAt": "2024-02-01",
                "productDetails": [
                    { "productName": "Suite Pro", "quantity": 2, "unitPrice": 50000, "amount": 100000 },
                    { "productName": "Support", "quantity": 1, "unitPrice": 20000, "amount": 20000 }
                ]
            },
            {
                "id": 2,
                "name": "Lost deal",
                "phase": { "name": "Lost" },
                "createdAt": "2024-01-05",
                "updatedAt": "2024-01-06"
            }
        ],
        "totalCount": 2
    });
    std::fs::write(&path, deals.to_string()).unwrap();
    path
}

// ===========================================================================
// Configuration errors
// ===========================================================================

#[test]
fn sync_without_settings_lists_every_problem() {
    let dir = tempfile::tempdir().unwrap();

    let output = sheetsync(dir.path()).args(["sync"]).output().unwrap();

    assert_eq!(output.status.code(), Some(3));
    let err = stderr(&output);
    assert!(err.contains("CRM API key is not set"), "stderr: {}", err);
    assert!(err.contains("destination is not set"), "stderr: {}", err);
    assert!(err.contains("hint:"), "stderr: {}", err);
}

#[test]
fn both_destinations_is_config_error() {
    let dir = tempfile::tempdir().unwrap();

    let output = sheetsync(dir.path())
        .args(["ping", "--relay-url", "http://127.0.0.1:9/exec", "--spreadsheet-id", "abc"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("not both"));
}

#[test]
fn page_size_from_env_is_validated() {
    let dir = tempfile::tempdir().unwrap();

    let output = sheetsync(dir.path())
        .args(["deal-types"])
        .env("CRM_API_KEY", "k")
        .env("PAGE_SIZE", "5000")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("page size"));
}

#[test]
fn unknown_config_key_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("sheetsync.toml");
    std::fs::write(&config, "[source]\napi_kye = \"typo\"\n").unwrap();

    let output = sheetsync(dir.path())
        .args(["export", "--config", config.to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("sheetsync.toml"));
}

#[test]
fn bad_mode_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();

    let output = sheetsync(dir.path()).args(["sync", "--mode", "merge"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// export
// ===========================================================================

#[test]
fn export_from_file_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());
    let out = dir.path().join("deals.csv");

    let output = sheetsync(dir.path())
        .args(["export", "--input", input.to_str().unwrap(), "--out", out.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let csv = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4, "{}", csv);
    assert!(lines[0].starts_with("Deal ID,Deal Name,Customer,"));
    assert!(lines[1].starts_with("1,Suite 10ユーザー 12ヶ月,Acme,501,"));
    assert!(lines[1].contains(",Suite Pro,2,50000,100000,120000,"));
    assert!(lines[1].ends_with(",10,12ヶ月"));
    assert!(lines[2].contains(",Support,1,20000,20000,"));
    assert!(lines[3].starts_with("2,Lost deal,"));
}

#[test]
fn export_applies_status_filter_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());

    let output = sheetsync(dir.path())
        .args(["export", "--input", input.to_str().unwrap(), "--statuses", "Lost"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let csv = String::from_utf8_lossy(&output.stdout);
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().starts_with("2,"));
}

#[test]
fn export_missing_input_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();

    let output = sheetsync(dir.path())
        .args(["export", "--input", "nope.json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("nope.json"));
}

// ===========================================================================
// sync against a relay
// ===========================================================================

#[test]
fn sync_json_report_against_relay() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());
    let server = MockServer::start();

    let get_ids = server.mock(|when, then| {
        when.method(POST)
            .path("/exec")
            .body_includes("\"action\":\"get_ids\"")
            .body_includes("\"secret_key\":\"s3cret\"");
        then.status(200).json_body(json!({ "success": true, "ids": [1, 3] }));
    });
    let sync = server.mock(|when, then| {
        when.method(POST)
            .path("/exec")
            .body_includes("\"action\":\"sync\"")
            .body_includes("\"delete_ids\":[\"3\"]")
            .body_includes("\"new_rows\":[]");
        then.status(200).json_body(json!({ "success": true, "message": "ok", "deleted": 1, "added": 0 }));
    });

    let output = sheetsync(dir.path())
        .args(["sync", "--json", "--input", input.to_str().unwrap(), "--statuses", "Won"])
        .env("RELAY_URL", server.url("/exec"))
        .env("RELAY_SECRET", "s3cret")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    get_ids.assert();
    sync.assert();

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["fetched"], 2);
    assert_eq!(report["filtered"], 1);
    assert_eq!(report["existing"], 2);
    assert_eq!(report["added_rows"], 0);
    assert_eq!(report["deleted"], 1);
    assert_eq!(report["skipped"], 1);
    assert_eq!(report["destination"], "relay");
    assert_eq!(report["success"], true);
}

#[test]
fn sync_dry_run_sends_no_writes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/exec").body_includes("\"action\":\"get_ids\"");
        then.status(200).json_body(json!({ "success": true, "ids": [] }));
    });
    let writes = server.mock(|when, then| {
        when.method(POST).path("/exec").body_includes("\"action\":\"sync\"");
        then.status(200).json_body(json!({ "success": true }));
    });

    let output = sheetsync(dir.path())
        .args(["sync", "--dry-run", "--input", input.to_str().unwrap()])
        .env("RELAY_URL", server.url("/exec"))
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    writes.assert_calls(0);
    let err = stderr(&output);
    assert!(err.contains("added:         2 keys (3 rows)"), "stderr: {}", err);
    assert!(err.contains("nothing written"), "stderr: {}", err);
}

#[test]
fn rejected_apply_prints_summary_and_exits_62() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/exec").body_includes("\"action\":\"get_ids\"");
        then.status(200).json_body(json!({ "success": true, "ids": [] }));
    });
    server.mock(|when, then| {
        when.method(POST).path("/exec").body_includes("\"action\":\"sync\"");
        then.status(200).json_body(json!({ "success": false, "message": "Invalid secret key" }));
    });

    let output = sheetsync(dir.path())
        .args(["sync", "--input", input.to_str().unwrap()])
        .env("RELAY_URL", server.url("/exec"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(62));
    let err = stderr(&output);
    assert!(err.contains("FAILED"), "stderr: {}", err);
    assert!(err.contains("error: rejected by destination: Invalid secret key"), "stderr: {}", err);
}

#[test]
fn unreachable_relay_exits_60() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());

    let output = sheetsync(dir.path())
        .args(["sync", "--input", input.to_str().unwrap()])
        .env("RELAY_URL", "http://127.0.0.1:9/exec")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn full_mode_replaces_sheet_in_one_write() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_deals(dir.path());
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/exec").body_includes("\"action\":\"get_ids\"");
        then.status(200).json_body(json!({ "success": true, "ids": [1, 9] }));
    });
    let write = server.mock(|when, then| {
        when.method(POST)
            .path("/exec")
            .body_includes("\"action\":\"write\"")
            .body_includes("\"clear_before\":true");
        then.status(200).json_body(json!({ "success": false, "message": "quota" }));
    });
    let clear = server.mock(|when, then| {
        when.method(POST).path("/exec").body_includes("\"action\":\"clear\"");
        then.status(200).json_body(json!({ "success": true }));
    });

    let output = sheetsync(dir.path())
        .args(["sync", "--mode", "full", "--input", input.to_str().unwrap()])
        .env("RELAY_URL", server.url("/exec"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(62));
    write.assert_calls(1);
    clear.assert_calls(0);
}
