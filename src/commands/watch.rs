//! Watch command - stay connected and stream what the server pushes

use std::io::Write;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{info, warn};

use super::CommandContext;
use crate::cli::WatchArgs;
use crate::error::Result;
use crate::session::ConnectionStatus;
use crate::state::StoreEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the watch command until Ctrl-C, writing one line per event to `out`
pub async fn run_watch<W: Write>(
    args: &WatchArgs,
    ctx: &CommandContext,
    out: &mut W,
) -> Result<String> {
    let session = ctx.connect(CONNECT_TIMEOUT).await?;
    info!("Watching session {}", session.session_id());

    if !args.masks.is_empty() && !session.facade().send_mask_selection(&args.masks) {
        warn!("Mask selection not sent");
    }

    let mut events = session.subscribe();
    let mut status = session.watch_status();
    let mut seen = 0usize;

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => Ok(()),
        result = forward_events(&mut events, &mut status, out, &mut seen) => result,
    };

    session.close().await;
    result?;
    Ok(format!("{} events\n", seen))
}

/// Write store events to `out` until the event stream or status channel closes
async fn forward_events<W: Write>(
    events: &mut broadcast::Receiver<StoreEvent>,
    status: &mut watch::Receiver<ConnectionStatus>,
    out: &mut W,
    seen: &mut usize,
) -> Result<()> {
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                info!("Connection {}", current);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    *seen += 1;
                    writeln!(out, "{}", describe(&event))?;
                    out.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// One line per store event
fn describe(event: &StoreEvent) -> String {
    match event {
        StoreEvent::RequestStarted { request_id } => format!("request {} started", request_id),
        StoreEvent::RequestFinished { request_id } => format!("request {} finished", request_id),
        StoreEvent::CandidatesChanged { request_id } => {
            format!("candidates changed ({})", request_id.as_deref().unwrap_or("-"))
        }
        StoreEvent::SelectionChanged { candidate_id } => {
            format!("selected {}", candidate_id.as_deref().unwrap_or("nothing"))
        }
        StoreEvent::StreamingUpdated { request_id } => format!("streaming {}", request_id),
        StoreEvent::Progress(p) => format!(
            "progress {:.0}% {}",
            p.percent,
            p.stage.as_deref().unwrap_or("")
        ),
        StoreEvent::Notification(n) => {
            format!("[{}] {}", n.severity, n.message)
        }
        StoreEvent::ContextUpdated => "context updated".to_string(),
        StoreEvent::AssistantResponse(turn) => format!("assistant: {}", turn.content),
        StoreEvent::FeedbackRecorded(record) => {
            format!("feedback {:?} {}", record.disposition, record.candidate_id)
        }
        StoreEvent::SettingsChanged(settings) => format!(
            "settings mode={} candidates={} temperature={}",
            settings.mode, settings.candidate_count, settings.temperature
        ),
        StoreEvent::ServerInfo(info) => format!(
            "server: {} [{}]",
            info.message.as_deref().unwrap_or(""),
            info.features.join(", ")
        ),
    }
}
