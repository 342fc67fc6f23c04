#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ROOT_SECRET: &str = "cli-test-root-secret";

fn stratumctl() -> Command {
    let mut cmd = Command::cargo_bin("stratumctl").unwrap();
    cmd.env_remove("STORJ_ACCESS_GRANT")
        .env_remove("STRATUM_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

fn issue_grant() -> String {
    let output = stratumctl()
        .args(["grant", "issue", "--satellite", "127.0.0.1:7777", "--secret", ROOT_SECRET])
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// A filesystem network that survives across invocations.
struct Workspace {
    dir: TempDir,
    grant: String,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            grant: issue_grant(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = stratumctl();
        cmd.env("STORJ_ACCESS_GRANT", &self.grant)
            .env("STORJ_NETWORK__TYPE", "filesystem")
            .env("STORJ_NETWORK__PATH", self.dir.path().join("network"))
            .env("STORJ_NETWORK__ROOT_SECRET", ROOT_SECRET);
        cmd
    }

    fn write(&self, name: &str, value: &Value) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    fn run_json(&self, args: &[&str], file: &Path) -> Value {
        let output = self.cmd().args(args).arg(file).output().unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn grant_issue_then_inspect() {
    let grant = issue_grant();
    stratumctl()
        .args(["grant", "inspect"])
        .env("STORJ_ACCESS_GRANT", &grant)
        .assert()
        .success()
        .stdout(contains("\"satellite_address\": \"127.0.0.1:7777\""))
        .stdout(contains("\"allow_upload\": true"));
}

#[test]
fn grant_inspect_rejects_garbage() {
    stratumctl()
        .args(["grant", "inspect", "--grant", "not-a-grant"])
        .assert()
        .failure()
        .stderr(contains("failed to parse access grant"));
}

#[test]
fn missing_grant_is_a_configuration_error() {
    stratumctl()
        .args(["types"])
        .assert()
        .failure()
        .stderr(contains("failed to load provider configuration"));
}

#[test]
fn types_lists_every_kind() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("types")
        .assert()
        .success()
        .stdout(contains("storj_edge_credentials"))
        .stdout(contains("storj_objects"));
}

#[test]
fn bucket_and_object_lifecycle_across_invocations() {
    let ws = Workspace::new();

    let bucket_config = ws.write("bucket.json", &json!({ "bucket": "photos" }));
    let bucket = ws.run_json(&["apply", "storj_bucket"], &bucket_config);
    assert_eq!(bucket["id"], "photos");
    let bucket_state = ws.write("bucket.state.json", &bucket);

    let object_config = ws.write(
        "object.json",
        &json!({ "bucket": "photos", "key": "cat.txt", "content": "meow" }),
    );
    let object = ws.run_json(&["apply", "storj_object"], &object_config);
    let object_state = ws.write("object.state.json", &object);

    let read = ws.run_json(&["read", "storj_object"], &object_state);
    assert_eq!(read["attributes"]["content"]["value"], "meow");

    let query = ws.write("objects.json", &json!({ "bucket": "photos" }));
    let listing = ws.run_json(&["query", "storj_objects"], &query);
    assert_eq!(listing["attributes"]["keys"]["value"], json!(["cat.txt"]));

    ws.cmd()
        .args(["destroy", "storj_bucket"])
        .arg(&bucket_state)
        .assert()
        .failure()
        .stderr(contains("Failed to delete bucket"))
        .stderr(contains("bucket not empty"));

    ws.cmd()
        .args(["destroy", "storj_object"])
        .arg(&object_state)
        .assert()
        .success();
    ws.cmd()
        .args(["destroy", "storj_bucket"])
        .arg(&bucket_state)
        .assert()
        .success();
}

#[test]
fn derived_grant_is_hidden_unless_requested() {
    let ws = Workspace::new();
    let config = ws.write(
        "grant.json",
        &json!({
            "access_grant": ws.grant,
            "allow_download": true,
            "bucket": [{ "name": "photos", "paths": ["2024/"] }]
        }),
    );

    let hidden = ws.run_json(&["apply", "storj_access_grant"], &config);
    assert_eq!(hidden["attributes"]["derived_access_grant"]["value"], "<sensitive>");
    assert_eq!(hidden["attributes"]["access_grant"]["value"], "<sensitive>");
    assert_eq!(hidden["attributes"]["derived_access_grant"]["sensitive"], true);

    let shown = ws.run_json(&["--show-sensitive", "apply", "storj_access_grant"], &config);
    let derived = shown["attributes"]["derived_access_grant"]["value"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(derived, ws.grant);
    assert_eq!(shown["id"], hidden["id"]);

    stratumctl()
        .args(["grant", "inspect", "--grant", &derived])
        .assert()
        .success()
        .stdout(contains("sj://photos/2024/"))
        .stdout(contains("\"allow_upload\": false"));
}

#[test]
fn config_from_stdin() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["apply", "storj_bucket", "-"])
        .write_stdin(r#"{ "bucket": "logs" }"#)
        .assert()
        .success()
        .stdout(contains("\"id\": \"logs\""));
}

#[test]
fn unknown_type_fails() {
    let ws = Workspace::new();
    let config = ws.write("x.json", &json!({}));
    ws.cmd()
        .args(["apply", "storj_nope"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("Unknown resource type"));
}

#[test]
fn edge_credentials_unreachable_service() {
    let ws = Workspace::new();
    let config = ws.write(
        "edge.json",
        &json!({ "access_grant": ws.grant, "auth_service_address": "http://127.0.0.1:1" }),
    );
    ws.cmd()
        .args(["apply", "storj_edge_credentials"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("Failed to create edge credentials"));
}

#[test]
fn provider_config_file_alongside_resource_file() {
    let dir = TempDir::new().unwrap();
    let grant = issue_grant();
    let network = dir.path().join("network");
    let provider_config = dir.path().join("stratum.toml");
    fs::write(
        &provider_config,
        format!(
            "access_grant = \"{grant}\"\n\n[network]\ntype = \"filesystem\"\npath = \"{}\"\nroot_secret = \"{ROOT_SECRET}\"\n",
            network.display()
        ),
    )
    .unwrap();
    let bucket_config = dir.path().join("bucket.json");
    fs::write(&bucket_config, r#"{ "bucket": "archive" }"#).unwrap();

    stratumctl()
        .arg("--config")
        .arg(&provider_config)
        .args(["apply", "storj_bucket"])
        .arg(&bucket_config)
        .assert()
        .success()
        .stdout(contains("\"id\": \"archive\""));

    stratumctl()
        .args(["query", "storj_bucket"])
        .arg(&bucket_config)
        .env("STRATUM_CONFIG", &provider_config)
        .assert()
        .success()
        .stdout(contains("\"id\": \"archive\""));
}
