//! Roll handling: chat command in, queued and recorded gacha events out.

use std::sync::{Arc, Mutex, PoisonError};

use gacha_core::command::{Command, CommandParser};
use gacha_core::queue::SharedQueue;
use gacha_core::selector::WeightTable;
use gacha_sync::SyncHub;
use gacha_types::GachaEvent;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::error::OverlayError;

/// Turns rolls into queued, history-tracked gacha events.
#[derive(Debug)]
pub struct GachaService {
    table: WeightTable,
    rng: Mutex<StdRng>,
    queue: SharedQueue<GachaEvent>,
    hub: Arc<SyncHub>,
    parser: CommandParser,
}

impl GachaService {
    /// Wire a service to the display queue and the sync hub.
    pub const fn new(
        table: WeightTable,
        rng: StdRng,
        queue: SharedQueue<GachaEvent>,
        hub: Arc<SyncHub>,
        parser: CommandParser,
    ) -> Self {
        Self {
            table,
            rng: Mutex::new(rng),
            queue,
            hub,
            parser,
        }
    }

    /// Roll once for `requested_by`.
    ///
    /// The event is recorded in its tier's history and queued for display.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Select`] if the table cannot be sampled.
    pub fn roll(&self, requested_by: &str) -> Result<GachaEvent, OverlayError> {
        let tier = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.table.select(&mut *rng)?.clone()
        };
        let event = GachaEvent::new(tier, requested_by);
        info!(
            event_id = %event.id,
            tier = %event.tier.label,
            requested_by,
            "gacha rolled"
        );
        self.hub.record(&event);
        self.queue.push(event.clone());
        Ok(event)
    }

    /// Run a chat command.
    ///
    /// Returns `None` for messages that are not commands. `+roll <name>`
    /// rolls for `<name>`; `+rollcount <n>` rolls `n` times for `user`.
    pub fn handle_message(
        &self,
        user: &str,
        text: &str,
    ) -> Option<Result<Vec<GachaEvent>, OverlayError>> {
        let command = match self.parser.parse(text)? {
            Ok(command) => command,
            Err(e) => {
                warn!(user, text, error = %e, "chat command rejected");
                return Some(Err(e.into()));
            }
        };

        let requested_by = match &command {
            Command::Roll { name } => name.as_str(),
            Command::RollCount { .. } => user,
        };
        let result = (0..command.rolls())
            .map(|_| self.roll(requested_by))
            .collect::<Result<Vec<_>, _>>();
        if let Err(e) = &result {
            warn!(user, error = %e, "roll failed");
        }
        Some(result)
    }

    /// Events waiting for display.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
