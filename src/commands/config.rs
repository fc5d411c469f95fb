//! Config command - show or edit the config file

use super::CommandContext;
use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};

/// Run the config command
pub fn run_config(args: &ConfigArgs, ctx: &CommandContext) -> Result<String> {
    match args.action.as_ref().unwrap_or(&ConfigAction::Show) {
        ConfigAction::Show => ctx.config.to_toml(),
        ConfigAction::Path => Ok(match &ctx.config_path {
            Some(path) => format!("{}\n", path.display()),
            None => "(no config directory)\n".to_string(),
        }),
        ConfigAction::Get { key } => match ctx.config.get(key) {
            Some(value) => Ok(format!("{}\n", value)),
            None => Err(SessionError::ConfigError {
                message: format!("No value for {}", key),
            }),
        },
        ConfigAction::Set { key, value } => {
            let path = config_path(ctx)?;
            // Edit the file's contents, not the CLI-overridden view
            let mut config = ClientConfig::load_from(&path)?;
            config.set(key, value)?;
            config.save_to(&path)?;
            Ok(format!("Set {} = {}\n", key, value))
        }
        ConfigAction::Reset => {
            let path = config_path(ctx)?;
            ClientConfig::default().save_to(&path)?;
            Ok("Configuration reset to defaults\n".to_string())
        }
    }
}

fn config_path(ctx: &CommandContext) -> Result<std::path::PathBuf> {
    ctx.config_path.clone().ok_or_else(|| SessionError::ConfigError {
        message: "No config directory on this platform; pass --config".to_string(),
    })
}
