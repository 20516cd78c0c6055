//! Delivery ordering over a node's outgoing links.

use std::collections::HashMap;

use crate::{node::NodeId, simulation::Tick};

/// Computes delivery ticks for messages sent over a node's outgoing links.
///
/// A link delivers messages in the order they were sent: a message can never
/// arrive before one sent earlier on the same link, even if its own transit
/// delay is shorter. Each destination is tracked separately.
#[derive(Debug, Clone, Default)]
pub struct LinkScheduler {
    last_scheduled: HashMap<NodeId, Tick>,
}

impl LinkScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tick at which a message sent to `destination` at tick
    /// `now` with a transit delay of `delay` ticks becomes visible there.
    pub fn schedule(
        &mut self,
        destination: NodeId,
        now: Tick,
        delay: f64,
    ) -> Tick {
        let last = self.last_scheduled.entry(destination).or_default();
        let start = now.max(*last);
        let deliver_at = (start as f64 + delay.max(0.0)).ceil() as Tick;

        *last = deliver_at;
        deliver_at
    }

    /// The delivery tick of the last message scheduled to `destination`.
    pub fn last_scheduled(&self, destination: NodeId) -> Option<Tick> {
        self.last_scheduled.get(&destination).copied()
    }
}
