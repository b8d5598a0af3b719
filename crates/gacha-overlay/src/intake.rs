//! Chat command intake.
//!
//! Commands arrive from two places: viewer chat forwarded by the browser
//! overlay on `gacha.{channel}.chat`, and lines typed on the operator
//! console (credited to [`CONSOLE_USER`]).

use std::io::BufRead as _;
use std::sync::Arc;

use futures::{Stream, StreamExt as _};
use gacha_types::ChatMessage;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::service::GachaService;

/// Requester name for commands typed on the console.
pub const CONSOLE_USER: &str = "console";

/// Feed chat payloads to the service until shutdown or the stream ends.
pub async fn run_chat<S, P>(
    service: Arc<GachaService>,
    mut payloads: S,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = P> + Unpin,
    P: AsRef<[u8]>,
{
    info!("chat intake started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            payload = payloads.next() => {
                let Some(payload) = payload else {
                    warn!("chat subscription ended");
                    break;
                };
                match serde_json::from_slice::<ChatMessage>(payload.as_ref()) {
                    Ok(message) => match service.handle_message(&message.user, &message.text) {
                        Some(Ok(events)) => info!(
                            user = %message.user,
                            rolled = events.len(),
                            queued = service.queued(),
                            "chat command done"
                        ),
                        // Rejections are already logged with the offending text.
                        Some(Err(e)) => debug!(user = %message.user, error = %e, "chat command failed"),
                        None => {}
                    },
                    Err(e) => debug!(error = %e, "ignoring malformed chat payload"),
                }
            }
        }
    }
    info!("chat intake stopped");
}

/// Feed console lines to the service until shutdown or end of input.
pub async fn run_console(
    service: Arc<GachaService>,
    mut lines: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            line = lines.recv() => {
                let Some(line) = line else {
                    debug!("console input closed");
                    break;
                };
                match service.handle_message(CONSOLE_USER, line.trim()) {
                    Some(Ok(events)) => info!(
                        rolled = events.len(),
                        queued = service.queued(),
                        "console command done"
                    ),
                    Some(Err(e)) => warn!(error = %e, "console command failed"),
                    None => debug!("console line is not a command"),
                }
            }
        }
    }
}

/// Read stdin lines on a detached thread.
///
/// Blocking stdin reads stay off the runtime; the thread ends with the
/// process.
pub fn console_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
