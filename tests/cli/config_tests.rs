//! Tests for the `config` CLI command

use smrp_session::ClientConfig;

use super::CliEnv;
use crate::common::assert_contains;

#[tokio::test]
async fn test_config_show_defaults() {
    let env = CliEnv::new();
    let output = env.run_success(&["config"]).await;

    assert_contains(&output, "[connection]", "config show");
    assert_contains(&output, "ws://localhost:8000/ws", "config show");
    assert_contains(&output, "[reconnect]", "config show");
}

#[tokio::test]
async fn test_config_url_override_is_shown() {
    let env = CliEnv::new();
    let output = env
        .run_success(&["--url", "wss://smrp.example.org/ws", "config", "show"])
        .await;
    assert_contains(&output, "wss://smrp.example.org/ws", "config show with --url");
}

#[tokio::test]
async fn test_config_set_then_get() {
    let env = CliEnv::new();
    env.run_success(&["config", "set", "defaults.mode", "soft"]).await;
    env.run_success(&["config", "set", "reconnect.max_attempts", "3"]).await;

    let mode = env.run_success(&["config", "get", "defaults.mode"]).await;
    assert_eq!(mode.trim(), "soft");

    let saved = ClientConfig::load_from(&env.config_path()).unwrap();
    assert_eq!(saved.reconnect.max_attempts, 3);
}

#[tokio::test]
async fn test_config_set_rejects_invalid_value() {
    let env = CliEnv::new();
    let (code, stderr) = env
        .run_failure(&["config", "set", "defaults.temperature", "9.5"])
        .await;
    assert_eq!(code, Some(2));
    assert_contains(&stderr, "temperature", "invalid temperature");
}

#[tokio::test]
async fn test_invalid_url_exit_code() {
    let env = CliEnv::new();
    let (code, stderr) = env
        .run_failure(&["--url", "http://localhost:8000/ws", "config"])
        .await;
    assert_eq!(code, Some(2));
    assert_contains(&stderr, "ws or wss", "invalid url");
}

#[tokio::test]
async fn test_unparseable_config_file_exit_code() {
    let env = CliEnv::new();
    std::fs::write(env.config_path(), "[connection\n").unwrap();
    let (code, _) = env.run_failure(&["config"]).await;
    assert_eq!(code, Some(1));
}

#[tokio::test]
async fn test_config_reset() {
    let env = CliEnv::new();
    env.run_success(&["config", "set", "defaults.candidate_count", "9"]).await;
    env.run_success(&["config", "reset"]).await;

    let saved = ClientConfig::load_from(&env.config_path()).unwrap();
    assert_eq!(saved, ClientConfig::default());
    assert!(env.path().join("session.toml").exists());
}
