//! Line-based game integration
//!
//! Stands in for a real game connection: each JSON item read from the input
//! is queued for sending, and every item received from other worlds is
//! written to the output as one JSON line.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Mutex, PoisonError};

use worldlink_client::{GameContext, GameIntegration, ItemBridge, ItemQueue};
use worldlink_protocol::ItemDto;

pub struct LineGame {
    outbound: ItemQueue,
    input: Mutex<Option<Box<dyn BufRead + Send>>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl LineGame {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            outbound: ItemQueue::new(),
            input: Mutex::new(Some(input)),
            output: Mutex::new(output),
        }
    }

    /// Game reading stdin and writing stdout
    pub fn stdio() -> Self {
        Self::new(Box::new(BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    pub fn pending_to_send(&self) -> usize {
        self.outbound.pending_to_send()
    }

    fn write_item(&self, item: &ItemDto) -> anyhow::Result<()> {
        let line = item.to_json()?;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(output, "{}", line)?;
        output.flush()?;
        Ok(())
    }
}

impl ItemBridge for LineGame {
    fn items_to_send(&self) -> Vec<ItemDto> {
        self.outbound.items_to_send()
    }

    fn remove_item_to_send(&self, item: &ItemDto) {
        self.outbound.remove_item_to_send(item)
    }

    fn push_item_to_process(&self, item: ItemDto) {
        if let Err(e) = self.write_item(&item) {
            tracing::error!(error = %e, item_id = item.item_id, "Failed to write received item");
        }
    }
}

impl GameIntegration for LineGame {
    fn connect(&self, ctx: GameContext) {
        if !ctx.scanner_enabled {
            tracing::info!("Item scanner disabled, not reading items");
            return;
        }

        let Some(input) = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!("Game input already consumed");
            return;
        };

        tracing::debug!(world_id = ctx.world_id, "Reading items from input");
        for line in input.lines() {
            if ctx.interrupt.is_cancelled() {
                break;
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read game input");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match ItemDto::from_json(line) {
                Ok(item) => {
                    if item.source_player_world_id != ctx.world_id {
                        tracing::warn!(
                            source = item.source_player_world_id,
                            world_id = ctx.world_id,
                            "Queued item claims another source world"
                        );
                    }
                    self.outbound.queue_item_to_send(item);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping malformed item line"),
            }
        }
        tracing::debug!("Game input finished");
    }
}
