//! CLI argument definitions for smrp-session
//!
//! Global flags pick the config file, endpoint and session; each subcommand
//! drives one short-lived session.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::state::ReconstructionMode;

/// Live reconstruction session client
#[derive(Parser, Debug)]
#[command(name = "smrp-session")]
#[command(about = "Client for the manuscript reconstruction session protocol")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to <config dir>/smrp/session.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// WebSocket base URL, overrides the config file
    #[arg(long, global = true, env = "SMRP_WS_URL", value_name = "URL")]
    pub url: Option<String>,

    /// Session to join, overrides the config file
    #[arg(long, global = true, env = "SMRP_SESSION_ID", value_name = "ID")]
    pub session: Option<String>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and log session events until Ctrl-C
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Request a reconstruction and print the ranked candidates as JSON
    #[command(visible_alias = "r")]
    Reconstruct(ReconstructArgs),

    /// Ask the assistant a question and print the response
    Ask(AskArgs),

    /// Show or change configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Send this mask selection once connected
    #[arg(long = "mask", value_name = "ID")]
    pub masks: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReconstructArgs {
    /// Damaged regions to reconstruct
    #[arg(long = "mask", value_name = "ID", required = true)]
    pub masks: Vec<String>,

    /// Manuscript image the masks belong to
    #[arg(long, value_name = "ID")]
    pub image: Option<String>,

    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Number of candidates to request
    #[arg(long, value_name = "N")]
    pub candidates: Option<u32>,

    #[arg(long, value_name = "T")]
    pub temperature: Option<f64>,

    /// Give up if the request has not finished after this long
    #[arg(long, default_value = "120", value_name = "SECS")]
    pub timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question
    pub query: String,

    /// JSON context sent along with the question
    #[arg(long, value_name = "JSON")]
    pub context: Option<String>,

    #[arg(long, default_value = "60", value_name = "SECS")]
    pub timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Get one value, e.g. `defaults.mode`
    Get { key: String },
    /// Set one value and save
    Set { key: String, value: String },
    /// Reset to defaults and save
    Reset,
}

/// Reconstruction mode as a command-line value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Soft,
    Hard,
    Adaptive,
}

impl From<ModeArg> for ReconstructionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Soft => ReconstructionMode::Soft,
            ModeArg::Hard => ReconstructionMode::Hard,
            ModeArg::Adaptive => ReconstructionMode::Adaptive,
        }
    }
}
