//! Item exchange between the network session and the local game integration
//!
//! The game side runs on its own thread; the session runs on the tokio
//! runtime. Neither blocks the other: all operations take a short lock or
//! push into an unbounded channel.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use worldlink_protocol::ItemDto;

/// The queue interface the session sees
pub trait ItemBridge: Send + Sync {
    /// Snapshot of items waiting to be sent, oldest first
    fn items_to_send(&self) -> Vec<ItemDto>;

    /// Removes the first queued item equal to `item`; no-op if none is queued
    fn remove_item_to_send(&self, item: &ItemDto);

    /// Hands a received item to the game side
    fn push_item_to_process(&self, item: ItemDto);
}

/// Thread-safe outbound/inbound item queues
///
/// Outbound items keep their enqueue order. Inbound items go through an
/// unbounded channel the game side drains with [`ItemQueue::try_take`].
pub struct ItemQueue {
    outbound: Mutex<VecDeque<ItemDto>>,
    inbound_tx: mpsc::UnboundedSender<ItemDto>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<ItemDto>>,
}

impl ItemQueue {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            outbound: Mutex::new(VecDeque::new()),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        }
    }

    /// Queues an item found locally for delivery to the other worlds
    pub fn queue_item_to_send(&self, item: ItemDto) {
        self.outbound().push_back(item);
    }

    pub fn pending_to_send(&self) -> usize {
        self.outbound().len()
    }

    /// Takes one received item, if any (non-blocking)
    pub fn try_take(&self) -> Option<ItemDto> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    /// Takes every received item currently queued
    pub fn drain_received(&self) -> Vec<ItemDto> {
        let mut items = Vec::new();
        while let Some(item) = self.try_take() {
            items.push(item);
        }
        items
    }

    fn outbound(&self) -> MutexGuard<'_, VecDeque<ItemDto>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ItemQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemBridge for ItemQueue {
    fn items_to_send(&self) -> Vec<ItemDto> {
        self.outbound().iter().cloned().collect()
    }

    fn remove_item_to_send(&self, item: &ItemDto) {
        let mut outbound = self.outbound();
        if let Some(pos) = outbound.iter().position(|queued| queued == item) {
            outbound.remove(pos);
        }
    }

    fn push_item_to_process(&self, item: ItemDto) {
        // The receiver lives in `self`, so the channel cannot be closed here
        let _ = self.inbound_tx.send(item);
    }
}
