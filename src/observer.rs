/*!
Observing what nodes do during a simulation

Every [`Node`](crate::node::Node) reports what it does through an
[`Observer`] handed to it at construction. [`TracingObserver`] forwards events
to [`tracing`], [`EventLog`] keeps them in memory for later analysis.
*/

use std::{fmt::Debug, sync::Mutex};

use crate::{
    block::BlockId,
    message::Inventory,
    node::NodeId,
    simulation::Tick,
    transaction::TxId,
};

/// Something a node did or noticed while processing a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A block body arrived. `duplicate` is true if it was already known.
    BlockReceived { block: BlockId, duplicate: bool },
    /// The node mined a block on top of `parent`.
    BlockMined { block: BlockId, parent: BlockId, height: u64, txns: usize },
    /// A transaction body arrived.
    TransactionReceived { tx: TxId, duplicate: bool },
    /// An advertisement arrived. `requested` is true if the node answered it
    /// with a data request.
    InventoryReceived { from: NodeId, item: Inventory, requested: bool },
    /// A data request arrived and was answered.
    DataRequested { from: NodeId, item: Inventory },
    /// A data request arrived for an item whose body this node does not hold.
    UnanswerableRequest { from: NodeId, item: Inventory },
    /// A message needing a reply came from a node which is not a peer.
    UnknownPeer { from: NodeId },
}

/// Receives the [`Event`]s produced by nodes.
pub trait Observer: Debug + Send + Sync {
    fn observe(&self, tick: Tick, node: NodeId, event: &Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn observe(&self, _: Tick, _: NodeId, _: &Event) {}
}

/// Logs every event through [`tracing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, tick: Tick, node: NodeId, event: &Event) {
        use Event::*;

        match *event {
            BlockReceived { block, duplicate } => {
                tracing::info!(tick, %node, %block, duplicate, "received block")
            }
            BlockMined { block, parent, height, txns } => tracing::info!(
                tick,
                %node,
                %block,
                %parent,
                height,
                txns,
                "generated block"
            ),
            TransactionReceived { tx, duplicate } => {
                tracing::debug!(tick, %node, %tx, duplicate, "received tx")
            }
            InventoryReceived { from, item, requested } => tracing::debug!(
                tick,
                %node,
                %from,
                %item,
                requested,
                "received inv"
            ),
            DataRequested { from, item } => {
                tracing::debug!(tick, %node, %from, %item, "received getdata")
            }
            UnanswerableRequest { from, item } => tracing::warn!(
                tick,
                %node,
                %from,
                %item,
                "getdata for an item without a known body"
            ),
            UnknownPeer { from } => {
                tracing::warn!(tick, %node, %from, "dropped message from non-peer")
            }
        }
    }
}

/// An event as recorded by [`EventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub tick: Tick,
    pub node: NodeId,
    pub event: Event,
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Mutex<Vec<Record>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record so far, in the order they arrived.
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Returns the records matching `filter`.
    pub fn filter<F>(&self, filter: F) -> Vec<Record>
    where
        F: Fn(&Record) -> bool,
    {
        self.lock().iter().filter(|r| filter(r)).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Record>> {
        // A panic while holding the lock cannot leave the vector half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Observer for EventLog {
    fn observe(&self, tick: Tick, node: NodeId, event: &Event) {
        self.lock().push(Record { tick, node, event: event.clone() });
    }
}
