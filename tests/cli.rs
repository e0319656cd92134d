use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_help_lists_options() {
    Command::new(env!("CARGO_BIN_EXE_lilith-bridge"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--check"));
}

#[test]
fn test_check_valid_config() {
    let file = config_file(
        r#"
server:
  name: weather
  url: http://backend:8000/sse
  transport: sse
  securitySchemes:
    - { id: Backend, type: http, scheme: bearer, defaultCredential: tok }
  defaultUpstreamSecurity: { id: Backend }
tools:
  - name: get_weather
"#,
    );
    Command::new(env!("CARGO_BIN_EXE_lilith-bridge"))
        .env_remove("LILITH_BRIDGE_CONFIG")
        .arg("--config")
        .arg(file.path())
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK: server 'weather' (Sse)"))
        .stdout(predicate::str::contains("1 security scheme(s), 1 tool(s)"));
}

#[test]
fn test_check_rejects_unknown_scheme() {
    let file = config_file("server: { url: 'http://b/mcp', defaultUpstreamSecurity: { id: Ghost } }");
    Command::new(env!("CARGO_BIN_EXE_lilith-bridge"))
        .arg("--config")
        .arg(file.path())
        .arg("--check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ghost"));
}

#[test]
fn test_missing_config_fails() {
    Command::new(env!("CARGO_BIN_EXE_lilith-bridge"))
        .env_remove("LILITH_BRIDGE_CONFIG")
        .arg("--check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no gateway configuration"));
}

#[test]
fn test_json_logging_initializes() {
    let file = config_file("server: { url: 'http://b/mcp' }");
    Command::new(env!("CARGO_BIN_EXE_lilith-bridge"))
        .env("LOG_FORMAT", "json")
        .env("LOG_LEVEL", "debug")
        .arg("--config")
        .arg(file.path())
        .arg("--check")
        .assert()
        .success()
        .stderr(predicate::str::contains("Failed to initialize tracing").not());
}
