//! Ask command - one assistant query

use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use super::CommandContext;
use crate::cli::AskArgs;
use crate::error::{Result, SessionError};
use crate::state::StoreEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the ask command
pub async fn run_ask(args: &AskArgs, ctx: &CommandContext) -> Result<String> {
    let context: Value = match &args.context {
        Some(raw) => serde_json::from_str(raw)?,
        None => Value::Object(Default::default()),
    };

    let session = ctx.connect(CONNECT_TIMEOUT).await?;
    let mut events = session.subscribe();

    if !session.facade().send_assistant_query(&args.query, context) {
        session.close().await;
        return Err(SessionError::NotConnected);
    }

    let wait = async {
        loop {
            match events.recv().await {
                Ok(StoreEvent::AssistantResponse(turn)) => return Some(turn.content),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    };
    let response = tokio::time::timeout(Duration::from_secs(args.timeout_secs), wait).await;
    session.close().await;

    match response {
        Ok(Some(content)) => Ok(format!("{}\n", render(&content))),
        Ok(None) => Err(SessionError::NotConnected),
        Err(_) => Err(SessionError::Transport {
            message: format!("no assistant response after {}s", args.timeout_secs),
        }),
    }
}

/// Plain text when the response carries it, pretty JSON otherwise
fn render(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("text").or_else(|| map.get("answer")) {
            Some(Value::String(text)) => text.clone(),
            _ => serde_json::to_string_pretty(content).unwrap_or_default(),
        },
        other => other.to_string(),
    }
}
