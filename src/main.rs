//! smrp-session CLI entry point
//!
//! # Usage
//!
//! ```bash
//! smrp-session --session s-1 watch
//! smrp-session --url ws://localhost:8000/ws reconstruct --mask mask_0 --mask mask_1
//! smrp-session ask "What does the second line say?"
//! smrp-session config set defaults.mode soft
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use smrp_session::cli::{Cli, Command};
use smrp_session::commands::{run_ask, run_config, run_reconstruct, run_watch, CommandContext};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let ctx = match CommandContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };
    init_logging(&ctx);

    let result = match &cli.command {
        Command::Watch(args) => run_watch(args, &ctx, &mut std::io::stdout()).await,
        Command::Reconstruct(args) => run_reconstruct(args, &ctx).await,
        Command::Ask(args) => run_ask(args, &ctx).await,
        Command::Config(args) => run_config(args, &ctx),
    };

    match result {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// Logs go to stderr so command output stays pipeable
fn init_logging(ctx: &CommandContext) {
    let level = if ctx.verbose {
        "debug"
    } else {
        ctx.config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("smrp_session={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
