//! E2E tests for the sitefetch CLI

#![allow(deprecated)] // cargo_bin deprecation - will update when assert_cmd stabilizes replacement

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sitefetch() -> Command {
    let mut cmd = Command::cargo_bin("sitefetch").unwrap();
    cmd.env_remove("SITEFETCH_COOKIE")
        .env_remove("SITEFETCH_PROXY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help() {
    sitefetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_version() {
    sitefetch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitefetch"));
}

#[test]
fn test_probe_help() {
    sitefetch()
        .args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--url"))
        .stdout(predicate::str::contains("--cookie"))
        .stdout(predicate::str::contains("--emulate"))
        .stdout(predicate::str::contains("--proxy"));
}

#[test]
fn test_probe_no_args() {
    sitefetch()
        .arg("probe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_probe_invalid_url() {
    sitefetch()
        .args(["probe", "--url", "not a url", "--cookie", "sid=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid URL"));
}

#[test]
fn test_probe_without_cookie_is_rejected() {
    sitefetch()
        .args(["probe", "--url", "https://example.test", "--site", "Example"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""ok":false"#))
        .stdout(predicate::str::contains("no cookie supplied"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_reports_schema() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "sid=1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>t</title><link rel="search" href="/s"><link rel="stylesheet" href="static/styles/global.css"></head></html>"#,
            "text/html; charset=utf-8",
        ))
        .expect(1)
        .mount(&server)
        .await;

    sitefetch()
        .args(["probe", "--url", &server.uri(), "--site", "Mock"])
        .env("SITEFETCH_COOKIE", "sid=1")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""ok":true"#))
        .stdout(predicate::str::contains(r#""schema":"gazelle""#));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_bad_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    sitefetch()
        .args(["probe", "--url", &server.uri(), "--cookie", "sid=1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("status 503"));
}
