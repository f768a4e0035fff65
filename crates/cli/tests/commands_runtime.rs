use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use clap::Parser;
use serde_json::Value;
use sge_cli::commands::CommandResult;
use sge_cli::{execute, Cli};

fn run_cli(args: &[&str]) -> CommandResult {
    let mut argv = vec!["sge"];
    argv.extend_from_slice(args);
    execute(Cli::try_parse_from(argv).expect("arguments should parse"))
}

#[test]
fn student_lists_only_their_own_requests() {
    with_env(&[], || {
        let result = run_cli(&["requests", "list"]);
        assert_eq!(result.exit_code, 0, "expected successful listing");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "requests");
        assert_eq!(payload["status"], "ok");
        let rows = payload["data"]["rows"].as_array().expect("rows array");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row["requester"] == "stu-001"));
        assert_eq!(payload["data"]["counts"]["NEW"], 2);
    });
}

#[test]
fn staff_filters_by_type_and_status() {
    with_env(&[("SGE_SESSION_USER_ID", "adm-001"), ("SGE_SESSION_ROLE", "administrator")], || {
        let result = run_cli(&["requests", "list", "--type", "diploma", "--status", "ready"]);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let rows = payload["data"]["rows"].as_array().expect("rows array");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "REQ-0004");
        assert_eq!(rows[0]["badge"]["label"], "Ready");
    });
}

#[test]
fn http_backend_without_token_is_a_config_failure() {
    with_env(&[("SGE_BACKEND_KIND", "http")], || {
        let result = run_cli(&["requests", "list"]);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "requests");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("backend.api_token"));
    });
}

#[test]
fn presence_request_with_one_teacher_is_refused_locally() {
    with_env(&[], || {
        let result = run_cli(&[
            "submit",
            "--type",
            "certificate_presence",
            "--year",
            "2025-2026",
            "--teacher",
            "tch-001",
        ]);
        assert_eq!(result.exit_code, 3, "expected validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation");
        assert!(payload["correlation_id"].is_string());
    });
}

#[test]
fn standard_request_is_created_new() {
    with_env(&[], || {
        let result = run_cli(&[
            "submit",
            "--type",
            "transcript",
            "--language",
            "ar",
            "--reception",
            "personal",
            "--year",
            "2025-2026",
        ]);
        assert_eq!(result.exit_code, 0, "expected successful submission: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["request"]["status"], "NEW");
        assert_eq!(payload["data"]["request"]["language"], "ar");
        assert_eq!(payload["data"]["badge"]["label"], "New");
    });
}

#[test]
fn teacher_sees_and_approves_their_task() {
    with_env(&[], || {
        let listed = run_cli(&["--user", "tch-001", "--role", "teacher", "approvals", "list"]);
        assert_eq!(listed.exit_code, 0);
        let payload = parse_payload(&listed.output);
        assert_eq!(payload["data"]["pending"], 1);
        assert_eq!(payload["data"]["rows"][0]["id"], "APR-0001");

        let decided = run_cli(&[
            "--user", "tch-001", "--role", "teacher", "approvals", "approve", "APR-0001",
        ]);
        assert_eq!(decided.exit_code, 0, "expected approval: {}", decided.output);
        let payload = parse_payload(&decided.output);
        assert_eq!(payload["data"]["approval"]["status"], "APPROVED");
    });
}

#[test]
fn teacher_cannot_decide_someone_elses_task() {
    with_env(&[], || {
        let result = run_cli(&[
            "--user", "tch-001", "--role", "teacher", "approvals", "reject", "APR-0002",
        ]);
        assert_eq!(result.exit_code, 4, "expected collaborator failure code");
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "collaborator");
    });
}

#[test]
fn staff_fulfills_a_success_certificate_end_to_end() {
    let out_dir = tempfile::tempdir().expect("temp dir");
    let upload = out_dir.path().join("official.pdf");
    fs::write(&upload, b"%PDF-1.7 official").expect("write upload");
    let out = out_dir.path().join("out");

    with_env(&[("SGE_SESSION_USER_ID", "adm-001"), ("SGE_SESSION_ROLE", "administrator")], || {
        let result = run_cli(&[
            "fulfill",
            "REQ-0003",
            "--out-dir",
            out.to_str().expect("utf-8 path"),
            "--upload",
            upload.to_str().expect("utf-8 path"),
            "--decision",
            "approve",
        ]);
        assert_eq!(result.exit_code, 0, "expected fulfillment: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["state"], "Approved");
        assert_eq!(payload["data"]["request"]["status"], "READY");
        assert_eq!(payload["data"]["step"], Value::Null);
        assert!(out.join("demande_REQ-0003.pdf").exists());
        assert!(out.join("certificate_success_REQ-0003_ar.pdf").exists());
    });
}

#[test]
fn fulfillment_stops_at_the_upload_step_without_a_file() {
    let out_dir = tempfile::tempdir().expect("temp dir");

    with_env(&[("SGE_SESSION_USER_ID", "adm-001"), ("SGE_SESSION_ROLE", "administrator")], || {
        let result = run_cli(&[
            "fulfill",
            "REQ-0001",
            "--out-dir",
            out_dir.path().to_str().expect("utf-8 path"),
        ]);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["state"], "AwaitingUpload");
        assert_eq!(payload["data"]["step"], 3);
        assert_eq!(payload["data"]["approve_enabled"], false);
        assert_eq!(payload["data"]["files"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn approval_gate_blocks_presence_request_without_teacher_approvals() {
    let out_dir = tempfile::tempdir().expect("temp dir");
    let upload = out_dir.path().join("presence.pdf");
    fs::write(&upload, b"%PDF-1.7 presence").expect("write upload");

    with_env(&[("SGE_SESSION_USER_ID", "adm-001"), ("SGE_SESSION_ROLE", "administrator")], || {
        let result = run_cli(&[
            "fulfill",
            "REQ-0002",
            "--out-dir",
            out_dir.path().to_str().expect("utf-8 path"),
            "--upload",
            upload.to_str().expect("utf-8 path"),
            "--decision",
            "approve",
        ]);
        assert_eq!(result.exit_code, 3, "expected gate refusal: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("0/2"));
    });
}

#[test]
fn no_approval_gate_flag_lets_staff_approve_presence() {
    let out_dir = tempfile::tempdir().expect("temp dir");
    let upload = out_dir.path().join("presence.pdf");
    fs::write(&upload, b"%PDF-1.7 presence").expect("write upload");

    with_env(&[("SGE_SESSION_USER_ID", "adm-001"), ("SGE_SESSION_ROLE", "administrator")], || {
        let result = run_cli(&[
            "--no-approval-gate",
            "fulfill",
            "REQ-0002",
            "--out-dir",
            out_dir.path().to_str().expect("utf-8 path"),
            "--upload",
            upload.to_str().expect("utf-8 path"),
            "--decision",
            "approve",
        ]);
        assert_eq!(result.exit_code, 0, "expected override: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["request"]["status"], "READY");
    });
}

#[test]
fn config_names_the_flag_that_set_a_value() {
    with_env(&[], || {
        let result = run_cli(&["--no-approval-gate", "--log-level", "debug", "config"]);
        assert_eq!(result.exit_code, 0, "expected config output: {}", result.output);
        let gate = "workflow.enforce_approval_gate = false (source: flag (--no-approval-gate))";
        assert!(result.output.contains(gate));
        assert!(result.output.contains("- logging.level = debug (source: flag (--log-level))"));
    });
}

#[test]
fn doctor_passes_on_the_memory_backend() {
    with_env(&[], || {
        let result = run_cli(&["doctor", "--json"]);
        assert_eq!(result.exit_code, 0, "expected passing doctor: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<_> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, vec!["config_validation", "backend_readiness", "gateway_connectivity"]);
    });
}

#[test]
fn doctor_skips_connectivity_when_config_is_invalid() {
    with_env(&[("SGE_BACKEND_TIMEOUT_SECS", "0")], || {
        let result = run_cli(&["doctor"]);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] gateway_connectivity"));
    });
}

#[test]
fn config_reports_sources_and_redacts_the_token() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("sge.toml");
    fs::write(
        &path,
        "[backend]\nkind = \"http\"\nbase_url = \"https://sge.example.edu/api\"\napi_token = \"sge_live_secret\"\n",
    )
    .expect("write config");

    with_env(&[("SGE_SESSION_ROLE", "teacher")], || {
        let result = run_cli(&["config", "--config", path.to_str().expect("utf-8 path")]);
        assert_eq!(result.exit_code, 0, "expected config output: {}", result.output);

        let file_source = format!("(source: file ({}))", path.display());
        assert!(result.output.contains(&format!("- backend.kind = http {file_source}")));
        assert!(result.output.contains(&format!("- backend.api_token = sge_*** {file_source}")));
        assert!(!result.output.contains("sge_live_secret"));
        assert!(result
            .output
            .contains("- session.role = teacher (source: env (SGE_SESSION_ROLE))"));
        assert!(result.output.contains("- upload.max_bytes = 10485760 (source: default)"));
    });
}

#[test]
fn missing_explicit_config_file_fails() {
    with_env(&[], || {
        let result = run_cli(&["--config", "does-not-exist/sge.toml", "requests", "list"]);
        assert_eq!(result.exit_code, 2);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SGE_BACKEND_KIND",
        "SGE_BACKEND_BASE_URL",
        "SGE_BACKEND_API_TOKEN",
        "SGE_BACKEND_TIMEOUT_SECS",
        "SGE_SESSION_USER_ID",
        "SGE_SESSION_ROLE",
        "SGE_UPLOAD_MAX_BYTES",
        "SGE_WORKFLOW_ENFORCE_APPROVAL_GATE",
        "SGE_LOGGING_LEVEL",
        "SGE_LOGGING_FORMAT",
        "SGE_LOG_LEVEL",
        "SGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
