//! The trigger binary's stdout carries the outcome code and nothing else.

use mockito::{Server, ServerGuard};
use std::io::Write;
use std::process::Output;
use tempfile::NamedTempFile;
use tokio::process::Command;

const QUERY_PATH: &str = "/v1/projects/P/location/global/prometheus/api/v1/query";

fn config_file(server: &ServerGuard) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
scanned_project = "P"
monitoring_endpoint = "{}"

[storage]
type = "memory"

[auth]
type = "none"

[[metrics]]
name = "UP"
query = "up"
"#,
        server.url()
    )
    .unwrap();
    file
}

async fn trigger(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sluice-exporter"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("SLUICE_CONFIG")
        .output()
        .await
        .unwrap()
}

#[tokio::test]
async fn unwritable_metrics_file_keeps_outcome() {
    let mut server = Server::new_async().await;
    let _up = server
        .mock("POST", QUERY_PATH)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"result":[{"metric":{"instance_name":"a"},"values":[[1700000000,"1"]]}]}}"#)
        .create_async()
        .await;
    let config = config_file(&server);
    let dir = tempfile::tempdir().unwrap();
    let metrics_file = dir.path().join("missing").join("sluice.prom");

    let output = trigger(&[
        "--config",
        config.path().to_str().unwrap(),
        "--metrics-file",
        metrics_file.to_str().unwrap(),
    ])
    .await;

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "LOAD_SUCCESS\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to write metrics"));
}

#[tokio::test]
async fn json_logs_stay_off_stdout() {
    let mut server = Server::new_async().await;
    let _up = server
        .mock("POST", QUERY_PATH)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"result":[{"metric":{},"values":[[1700000000,"1"]]}]}}"#)
        .create_async()
        .await;
    let config = config_file(&server);

    let output = trigger(&["--config", config.path().to_str().unwrap(), "--log-json", "-v"]).await;

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "LOAD_SUCCESS\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains(r#""level":"#));
}

#[tokio::test]
async fn setup_failure_prints_failed_code() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let output = trigger(&["--config", missing.to_str().unwrap()]).await;

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "LOAD_FAILED\n");
}
