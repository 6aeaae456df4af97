//! Invokes the `rowaudit` binary against temporary config, schema and row
//! files.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use serde_json::{Value, json};
use std::path::Path;
use std::process::{Command, Output};

fn rowaudit(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rowaudit"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run rowaudit")
}

fn write_json(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path.display().to_string()
}

fn config(extra: Value) -> Value {
    let mut document = json!({
        "rule_info": {
            "r1": {"ruleType": "regex", "ruleCode": "email", "columnNames": ["email"]}
        },
        "open": true,
        "model_id": "m-1",
        "model_name": "customer emails",
        "ds_id": "ds-1",
        "ds_name": "crm",
        "dept_id": "d-1",
        "dept_name": "data",
        "create_by": "u-42",
        "tenant_id": "t-1",
        "job_mode": "batch",
        "resource": "crm.customers"
    });
    for (key, value) in extra.as_object().unwrap() {
        document[key] = value.clone();
    }
    document
}

#[test]
fn test_cli_rules_lists_builtin_families() {
    let output = rowaudit(&["rules"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("regex"));
    assert!(stdout.contains("notEmpty"));
    assert!(stdout.contains("length"));
}

#[test]
fn test_cli_check_config_reports_missing_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(dir.path(), "job.json", &json!({"job_mode": "batch"}));

    let output = rowaudit(&["check-config", "--config", &path]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("rule_info"));
}

#[test]
fn test_cli_check_config_binds_schema() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_json(dir.path(), "job.json", &config(json!({"preview": true})));
    let good = write_json(dir.path(), "good.json", &json!(["id", "email"]));
    let bad = write_json(dir.path(), "bad.json", &json!(["id", "phone"]));

    let output = rowaudit(&["check-config", "--config", &job, "--schema", &good]);
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("Configuration is valid"));

    let output = rowaudit(&["check-config", "--config", &job, "--schema", &bad]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_run_writes_verdicts_and_merges_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store_url = format!("sqlite://{}", dir.path().join("metrics.db").display());
    let job = write_json(
        dir.path(),
        "job.json",
        &config(json!({"metric_store": {"url": store_url, "key": "quality:m-1"}})),
    );
    let schema = write_json(dir.path(), "schema.json", &json!(["id", "email"]));

    let input = dir.path().join("rows.ndjson");
    std::fs::write(
        &input,
        "[1, \"a@x.com\"]\n{\"id\": 2, \"email\": \"nope\"}\n[3, \"b@y.com\"]\n",
    )
    .unwrap();
    let output_path = dir.path().join("out.ndjson");

    let output = rowaudit(&[
        "-q",
        "run",
        "--config",
        &job,
        "--schema",
        &schema,
        "--input",
        &input.display().to_string(),
        "--output",
        &output_path.display().to_string(),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let verdicts: Vec<Value> = std::fs::read_to_string(&output_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["fields"][2].clone())
        .collect();
    assert_eq!(verdicts, vec![json!("true"), json!("false"), json!("true")]);
    assert!(dir.path().join("metrics.db").exists());
}

#[test]
fn test_cli_run_stops_on_invalid_row() {
    let dir = tempfile::tempdir().unwrap();
    let job = write_json(dir.path(), "job.json", &config(json!({"preview": true})));
    let schema = write_json(dir.path(), "schema.json", &json!(["id", "email"]));
    let input = dir.path().join("rows.ndjson");
    std::fs::write(&input, "[1, \"a@x.com\"]\n[2]\n").unwrap();
    let input = input.display().to_string();

    let output = rowaudit(&["run", "-c", &job, "-s", &schema, "-i", &input]);
    assert!(!output.status.success());

    let output = rowaudit(&[
        "run",
        "-c",
        &job,
        "-s",
        &schema,
        "-i",
        &input,
        "--skip-invalid",
    ]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap().lines().count(), 1);
}
