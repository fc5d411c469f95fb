//! CLI command integration tests
//!
//! These run the built `smrp-session` binary with an isolated config file.

pub mod config_tests;
pub mod session_command_tests;

use std::path::{Path, PathBuf};
use std::process::Output;

use tempfile::TempDir;

/// A throwaway config directory for one CLI run
pub struct CliEnv {
    dir: TempDir,
}

impl CliEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("session.toml")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn command(&self, args: &[&str]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_smrp-session"));
        cmd.arg("--config")
            .arg(self.config_path())
            .args(args)
            .env_remove("SMRP_WS_URL")
            .env_remove("SMRP_SESSION_ID")
            .env_remove("RUST_LOG");
        cmd
    }

    pub async fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().await.expect("Failed to run CLI")
    }

    /// Run and expect success, return stdout
    pub async fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args).await;
        assert!(
            output.status.success(),
            "CLI command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Run and expect failure, return (exit code, stderr)
    pub async fn run_failure(&self, args: &[&str]) -> (Option<i32>, String) {
        let output = self.run(args).await;
        assert!(
            !output.status.success(),
            "CLI command {:?} should have failed",
            args
        );
        (
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }
}
