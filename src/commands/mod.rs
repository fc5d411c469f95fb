//! Command modules for the smrp-session CLI
//!
//! Each module implements one top-level command:
//! - `watch` - Stay connected and log events
//! - `reconstruct` - One reconstruction request, ranked results as JSON
//! - `ask` - One assistant query
//! - `config` - Show or edit configuration
//!
//! Handlers take their `Args` struct from `cli.rs` plus a shared
//! `CommandContext` and return the text to print. `watch` also streams event
//! lines to a writer the caller passes in.

pub mod ask;
pub mod config;
pub mod reconstruct;
pub mod watch;

pub use ask::run_ask;
pub use config::run_config;
pub use reconstruct::run_reconstruct;
pub use watch::run_watch;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch as status_watch;

use crate::cli::Cli;
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::session::{ConnectionStatus, ReconstructionSession};

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Effective configuration after CLI overrides
    pub config: ClientConfig,
    /// Where the configuration was read from
    pub config_path: Option<PathBuf>,
    pub session_id: Option<String>,
    pub verbose: bool,
}

impl CommandContext {
    /// Load configuration and apply command-line overrides
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().or_else(ClientConfig::default_path);
        let mut config = match &config_path {
            Some(path) => ClientConfig::load_from(path)?,
            None => ClientConfig::default(),
        };
        if let Some(url) = &cli.url {
            config.connection.base_url = url.clone();
        }
        config.validate()?;

        let session_id = cli
            .session
            .clone()
            .or_else(|| config.connection.session_id.clone());

        Ok(Self {
            config,
            config_path,
            session_id,
            verbose: cli.verbose,
        })
    }

    /// Start a session and wait until it is connected
    pub async fn connect(&self, timeout: Duration) -> Result<ReconstructionSession> {
        let session = ReconstructionSession::start(&self.config, self.session_id.as_deref())?;
        let mut status = session.watch_status();
        match tokio::time::timeout(timeout, wait_connected(&mut status)).await {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => {
                session.close().await;
                Err(e)
            }
            Err(_) => {
                session.close().await;
                Err(SessionError::Transport {
                    message: format!("not connected after {:?}", timeout),
                })
            }
        }
    }
}

/// Wait for `Connected`; a terminal status is an error
async fn wait_connected(status: &mut status_watch::Receiver<ConnectionStatus>) -> Result<()> {
    loop {
        match *status.borrow_and_update() {
            ConnectionStatus::Connected => return Ok(()),
            ConnectionStatus::Failed => {
                return Err(SessionError::Transport {
                    message: "reconnect attempts exhausted".to_string(),
                })
            }
            _ => {}
        }
        if status.changed().await.is_err() {
            return Err(SessionError::NotConnected);
        }
    }
}
