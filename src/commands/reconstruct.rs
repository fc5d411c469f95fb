//! Reconstruct command - one request, ranked candidates as JSON

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::CommandContext;
use crate::cli::ReconstructArgs;
use crate::error::{Result, SessionError};
use crate::session::ReconstructionPayload;
use crate::state::{Candidate, Settings, Severity, SortKey, StoreEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconstructionReport<'a> {
    request_id: &'a str,
    selected: Option<&'a str>,
    candidates: Vec<&'a Candidate>,
}

/// Run the reconstruct command
pub async fn run_reconstruct(args: &ReconstructArgs, ctx: &CommandContext) -> Result<String> {
    let settings = settings_for(args, &ctx.config.defaults);
    settings.validate()?;

    let session = ctx.connect(CONNECT_TIMEOUT).await?;
    session.update_settings(settings)?;
    let mut events = session.subscribe();

    let payload = ReconstructionPayload {
        image_id: args.image.clone(),
        mask_ids: args.masks.clone(),
    };
    let request_id = match session.facade().send_reconstruction_request(&payload) {
        Some(id) => id,
        None => {
            session.close().await;
            return Err(SessionError::NotConnected);
        }
    };
    info!("Sent reconstruction request {}", request_id);

    // Server errors arrive as notifications just before the request finishes
    let wait = async {
        let mut failure = None;
        loop {
            match events.recv().await {
                Ok(StoreEvent::Notification(n)) if n.severity == Severity::Error => {
                    failure = Some(n.message);
                }
                Ok(StoreEvent::RequestFinished { request_id: done }) if done == request_id => {
                    return failure;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => return failure,
            }
        }
    };
    match tokio::time::timeout(Duration::from_secs(args.timeout_secs), wait).await {
        Ok(Some(message)) => {
            session.close().await;
            return Err(SessionError::RequestFailed {
                request_id,
                message,
            });
        }
        Ok(None) => {}
        Err(_) => warn!(
            "Request {} did not finish within {}s; reporting what arrived",
            request_id, args.timeout_secs
        ),
    }

    let output = {
        let store = session.store().read();
        let report = ReconstructionReport {
            request_id: &request_id,
            selected: store.selected_id(),
            candidates: store.sorted(&SortKey::Combined),
        };
        serde_json::to_string_pretty(&report)?
    };

    session.close().await;
    Ok(format!("{}\n", output))
}

/// Config defaults with command-line overrides
fn settings_for(args: &ReconstructArgs, defaults: &Settings) -> Settings {
    Settings {
        mode: args.mode.map(Into::into).unwrap_or(defaults.mode),
        candidate_count: args.candidates.unwrap_or(defaults.candidate_count),
        temperature: args.temperature.unwrap_or(defaults.temperature),
    }
}
