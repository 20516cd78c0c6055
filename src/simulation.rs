//! Running a network of nodes tick by tick

use std::{collections::BTreeMap, sync::Arc};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
    block::BlockId,
    message::{Envelope, Message},
    node::{Node, NodeId, Outbound},
    snapshot::SimulationSnapshot,
    transaction::{Transaction, TransactionError, TxId},
};

pub mod builder;
pub mod workload;

pub use builder::{SimulationBuildError, SimulationBuilder};
pub use workload::Workload;

/// Discrete simulation time.
pub type Tick = u64;

/// Items waiting to be delivered to one node, keyed by delivery tick.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    due: BTreeMap<Tick, Vec<Envelope>>,
    len: usize,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `envelope` for delivery at tick `at`.
    pub fn enqueue(&mut self, envelope: Envelope, at: Tick) {
        self.due.entry(at).or_default().push(envelope);
        self.len += 1;
    }

    /// Removes and returns every item due at or before `tick`, in order of
    /// delivery tick, then in order of enqueueing.
    pub fn drain_due(&mut self, tick: Tick) -> Vec<Envelope> {
        let later = match tick.checked_add(1) {
            Some(next) => self.due.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.due, later);

        let items: Vec<_> = due.into_values().flatten().collect();
        self.len -= items.len();

        items
    }

    /// The earliest tick at which an item is due.
    pub fn next_due(&self) -> Option<Tick> {
        self.due.keys().next().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A network of [`Node`]s advancing in lockstep.
///
/// # Details
/// In every tick, each node drains the items due in its [`Inbox`] and runs
/// [`Node::step`]. Nodes never touch each other's state within a tick, so
/// with the `rayon` feature they are stepped in parallel. The messages they
/// send are then placed into the destinations' inboxes one node at a time, in
/// order of node ID, which keeps runs with a fixed seed reproducible.
#[derive(Debug, Clone)]
pub struct Simulation {
    nodes: Vec<Node>,
    inboxes: Vec<Inbox>,
    difficulty: f64,
    tick: Tick,
    next_tx: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("no node with ID {0} exists")]
    UnknownNode(NodeId),
    #[error("difficulty {0} gives a mining probability outside 0.0..=1.0")]
    BadDifficulty(f64),
    #[error("invalid transaction")]
    TransactionError(#[from] TransactionError),
}

impl Simulation {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    pub(crate) fn new(
        nodes: Vec<Node>,
        difficulty: f64,
        tick: Tick,
        next_tx: u64,
    ) -> Self {
        let inboxes = vec![Inbox::new(); nodes.len()];

        Simulation { nodes, inboxes, difficulty, tick, next_tx }
    }

    /// The tick which will be processed by the next call to
    /// [`Simulation::step`].
    #[inline]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    #[inline]
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    /// All nodes, in order of ID.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        id.0.checked_sub(1).and_then(|i| self.nodes.get(i))
    }

    /// Mutable access to a node, for forcing blocks or other interventions
    /// between ticks.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        id.0.checked_sub(1).and_then(|i| self.nodes.get_mut(i))
    }

    /// Number of items waiting in all inboxes.
    pub fn in_flight(&self) -> usize {
        self.inboxes.iter().map(Inbox::len).sum()
    }

    /// The best head of every node, in order of node ID.
    pub fn best_heads(&self) -> Vec<BlockId> {
        self.nodes
            .iter()
            .map(|node| node.ledger().choose_best_head().id)
            .collect()
    }

    /// True if every node currently mines on the same block.
    pub fn converged(&self) -> bool {
        let heads = self.best_heads();
        heads.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Changes the difficulty of every node.
    pub fn set_difficulty(
        &mut self,
        difficulty: f64,
    ) -> Result<(), SimulationError> {
        let valid = difficulty.is_finite()
            && difficulty >= 0.0
            && self.nodes.iter().all(|n| n.power() * difficulty <= 1.0);
        if !valid {
            return Err(SimulationError::BadDifficulty(difficulty));
        }

        for node in self.nodes.iter_mut() {
            node.set_difficulty(difficulty);
        }
        self.difficulty = difficulty;

        Ok(())
    }

    /// Creates a transaction and delivers it to `origin` in the current tick,
    /// as if a wallet connected to `origin` had broadcast it.
    pub fn submit_transaction(
        &mut self,
        origin: NodeId,
        size: u64,
        fee: u64,
        value: u64,
    ) -> Result<TxId, SimulationError> {
        let index = self.index_of(origin)?;

        let id = TxId(self.next_tx);
        let tx = Transaction::new(id, size, fee, value, self.tick)?;
        self.next_tx += 1;

        let message = Message::Transaction(Arc::new(tx));
        let envelope = Envelope::new(origin, message);
        self.inboxes[index].enqueue(envelope, self.tick);

        Ok(id)
    }

    /// Runs a single tick.
    pub fn step(&mut self) {
        let tick = self.tick;

        let work: Vec<_> = self
            .nodes
            .iter_mut()
            .zip(self.inboxes.iter_mut())
            .map(|(node, inbox)| (node, inbox.drain_due(tick)))
            .collect();

        #[cfg(feature = "rayon")]
        let outbound: Vec<Vec<Outbound>> = work
            .into_par_iter()
            .map(|(node, items)| node.step(tick, items))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let outbound: Vec<Vec<Outbound>> = work
            .into_iter()
            .map(|(node, items)| node.step(tick, items))
            .collect();

        for out in outbound.into_iter().flatten() {
            self.deliver(out);
        }

        self.tick += 1;
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Runs ticks until nothing is in flight and every node mines on the same
    /// block, or until `max_ticks` ticks have passed. Returns true if the
    /// network settled.
    pub fn run_until_settled(&mut self, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            if self.in_flight() == 0 && self.converged() {
                return true;
            }
            self.step();
        }

        self.in_flight() == 0 && self.converged()
    }

    /// Collects the messages a node buffered outside of [`Simulation::step`],
    /// e.g. after [`Node::mine_block`] was called through
    /// [`Simulation::node_mut`], and schedules them.
    pub fn flush(&mut self, id: NodeId) -> Result<(), SimulationError> {
        let index = self.index_of(id)?;

        for out in self.nodes[index].take_outbound() {
            self.deliver(out);
        }

        Ok(())
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            tick: self.tick,
            next_tx: self.next_tx,
            nodes: self.nodes.iter().map(Node::snapshot).collect(),
        }
    }

    fn deliver(&mut self, out: Outbound) {
        let Outbound { destination, envelope, deliver_at } = out;

        match self.index_of(destination) {
            Ok(index) => self.inboxes[index].enqueue(envelope, deliver_at),
            Err(_) => tracing::warn!(
                %destination,
                "dropped message for a node outside the network"
            ),
        }
    }

    fn index_of(&self, id: NodeId) -> Result<usize, SimulationError> {
        match id.0.checked_sub(1) {
            Some(index) if index < self.nodes.len() => Ok(index),
            _ => Err(SimulationError::UnknownNode(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Inbox;
    use crate::message::{Envelope, Inventory, Message};

    fn inv(n: u64) -> Envelope {
        let item = Inventory::Transaction(n.into());
        Envelope::new(1.into(), Message::Inventory(item))
    }

    #[test]
    fn inbox_drains_due_items_in_order() {
        let mut inbox = Inbox::new();
        inbox.enqueue(inv(1), 5);
        inbox.enqueue(inv(2), 3);
        inbox.enqueue(inv(3), 5);
        inbox.enqueue(inv(4), 9);

        assert_eq!(inbox.len(), 4);
        assert!(inbox.drain_due(2).is_empty());
        assert_eq!(inbox.drain_due(5), vec![inv(2), inv(1), inv(3)]);
        assert_eq!(inbox.next_due(), Some(9));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.drain_due(u64::MAX), vec![inv(4)]);
        assert!(inbox.is_empty());
    }
}
