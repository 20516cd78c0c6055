/*!
The per-node protocol engine

A [`Node`] consumes every [`Envelope`] delivered to it in a tick, updates its
[`Ledger`] and [`Mempool`], decides whether it mined a block, and produces
[`Outbound`] messages which the [`Simulation`](crate::simulation::Simulation)
places in the destinations' inboxes.

Gossip is advertise-then-pull: a node announces every block or transaction it
learns of with an [`Inventory`] message, and only sends a body in answer to a
[`DataRequest`](Message::DataRequest).
*/

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    sync::Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    block::{Block, BlockId},
    ledger::Ledger,
    link::LinkScheduler,
    mempool::Mempool,
    message::{Envelope, Inventory, Message},
    network::{DelayModel, Region},
    observer::{Event, NullObserver, Observer},
    power_dist::PowerValue,
    simulation::Tick,
    snapshot::NodeSnapshot,
    transaction::TxId,
};

/// Unique identifier of a [`Node`]. Corresponds to a [`usize`].
///
/// # Invariants
///
/// `NodeId(0)` is reserved for [`NodeId::GENESIS`], the creator of the
/// genesis block, and cannot be instantiated through [`From<usize>`].
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const GENESIS: NodeId = NodeId(0);

    /// Returns the [`usize`] corresponding to this [`NodeId`].
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        assert_ne!(value, 0, "newly made NodeId must be greater than 0");
        Self(value)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self(1)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Parameters shared by every node of a network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Largest allowed block size in bytes, header included.
    pub max_block_size: u64,
    /// Size of a block header in bytes.
    pub header_size: u64,
    /// Real-world seconds represented by one tick.
    pub tick_seconds: f64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        ProtocolParams {
            max_block_size: 1_000_000,
            header_size: Block::HEADER_SIZE,
            tick_seconds: 1.0,
        }
    }
}

/// A message leaving a node, and when it reaches its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub destination: NodeId,
    pub envelope: Envelope,
    pub deliver_at: Tick,
}

/// Tick at which a node first received each block and transaction. A node's
/// own blocks count as received when they are mined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptStats {
    pub blocks: HashMap<BlockId, Tick>,
    pub txs: HashMap<TxId, Tick>,
}

/// A miner in a simulated proof-of-work network.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    region: Region,
    power: PowerValue,
    mining_probability: f64,
    params: ProtocolParams,
    ledger: Ledger,
    mempool: Mempool,
    links: LinkScheduler,
    /// Outgoing connections and the region of the node on the other end.
    peers: BTreeMap<NodeId, Region>,
    stats: ReceiptStats,
    /// Number of blocks mined so far, used to number new blocks.
    blocks_mined: u64,
    now: Tick,
    outbox: Vec<Outbound>,
    delay: Box<dyn DelayModel>,
    rng: StdRng,
    observer: Arc<dyn Observer>,
}

impl Node {
    /// Creates a node which holds only the genesis block. Its mining
    /// probability stays 0 until [`Node::set_difficulty`] is called.
    pub fn new<N>(
        id: NodeId,
        name: N,
        region: Region,
        power: PowerValue,
        params: ProtocolParams,
        delay: Box<dyn DelayModel>,
        seed: u64,
    ) -> Self
    where
        N: Into<String>,
    {
        Node {
            id,
            name: name.into(),
            region,
            power,
            mining_probability: 0.0,
            params,
            ledger: Ledger::new(Arc::new(Block::genesis())),
            mempool: Mempool::new(),
            links: LinkScheduler::new(),
            peers: BTreeMap::new(),
            stats: ReceiptStats::default(),
            blocks_mined: 0,
            now: 0,
            outbox: vec![],
            delay,
            rng: StdRng::seed_from_u64(seed),
            observer: Arc::new(NullObserver),
        }
    }

    /// Rebuilds a node from a snapshot. Mining power, connections and
    /// difficulty are not part of a snapshot and must be supplied again.
    pub fn restore(
        snapshot: NodeSnapshot,
        power: PowerValue,
        params: ProtocolParams,
        delay: Box<dyn DelayModel>,
        seed: u64,
    ) -> Self {
        let NodeSnapshot {
            id,
            name,
            region,
            blocks_mined,
            ledger,
            mempool,
            block_receipts,
            tx_receipts,
        } = snapshot;

        let mut node = Node::new(id, name, region, power, params, delay, seed);
        node.blocks_mined = blocks_mined;
        node.ledger = Ledger::restore(ledger);
        node.mempool = Mempool::restore(mempool);
        node.stats = ReceiptStats {
            blocks: block_receipts.into_iter().collect(),
            txs: tx_receipts.into_iter().collect(),
        };

        node
    }

    /// Reports events to `observer` instead of discarding them.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;

        self
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn region(&self) -> Region {
        self.region
    }

    #[inline]
    pub fn power(&self) -> PowerValue {
        self.power
    }

    /// Probability of mining a block in any given tick.
    #[inline]
    pub fn mining_probability(&self) -> f64 {
        self.mining_probability
    }

    #[inline]
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    #[inline]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[inline]
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    #[inline]
    pub fn stats(&self) -> &ReceiptStats {
        &self.stats
    }

    #[inline]
    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined
    }

    /// IDs of the nodes this node has outgoing connections to.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.keys().copied()
    }

    /// Opens an outgoing connection to `peer`, located in `region`.
    pub fn connect(&mut self, peer: NodeId, region: Region) {
        self.peers.insert(peer, region);
    }

    /// Sets the probability of mining a block in one tick with a mining power
    /// of 1.
    ///
    /// ## Panics
    /// Panics if the resulting mining probability is not in `0.0..=1.0`.
    pub fn set_difficulty(&mut self, difficulty: f64) {
        let probability = self.power * difficulty;
        assert!(
            (0.0..=1.0).contains(&probability),
            "mining probability {} is not in the range 0.0..=1.0",
            probability
        );

        self.mining_probability = probability;
    }

    /// Processes every item delivered to this node in tick `tick`, then mines
    /// a block with probability [`Node::mining_probability`]. Returns the
    /// messages sent along the way.
    pub fn step(&mut self, tick: Tick, items: Vec<Envelope>) -> Vec<Outbound> {
        self.now = tick;
        for item in items {
            self.consume(item);
        }

        if self.rng.gen_bool(self.mining_probability) {
            self.mine_block(tick);
        }

        self.take_outbound()
    }

    /// Mines a block at tick `tick` on top of the best head, filled from the
    /// mempool, and advertises it to every peer. Outgoing messages are
    /// buffered until [`Node::take_outbound`] (or the next step) collects
    /// them.
    pub fn mine_block(&mut self, tick: Tick) -> Arc<Block> {
        self.now = tick;

        let parent = self.ledger.choose_best_head().clone();
        let ProtocolParams { max_block_size, header_size, .. } = self.params;
        let txns = self.mempool.assemble(max_block_size, header_size);

        self.blocks_mined += 1;
        let id = BlockId::new(self.id, self.blocks_mined);
        let block =
            Arc::new(Block::on_top_of(&parent, id, tick, header_size, txns));

        self.ledger.add_block(block.clone());
        self.stats.blocks.insert(id, tick);
        self.emit(Event::BlockMined {
            block: id,
            parent: parent.id,
            height: block.height,
            txns: block.txns.len(),
        });

        self.advertise(Inventory::Block(id));

        block
    }

    /// Removes and returns every buffered outgoing message.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Captures the state of this node which survives a reload.
    pub fn snapshot(&self) -> NodeSnapshot {
        let mut block_receipts: Vec<_> =
            self.stats.blocks.iter().map(|(&k, &v)| (k, v)).collect();
        block_receipts.sort();
        let mut tx_receipts: Vec<_> =
            self.stats.txs.iter().map(|(&k, &v)| (k, v)).collect();
        tx_receipts.sort();

        NodeSnapshot {
            id: self.id,
            name: self.name.clone(),
            region: self.region,
            blocks_mined: self.blocks_mined,
            ledger: self.ledger.snapshot(),
            mempool: self.mempool.snapshot(),
            block_receipts,
            tx_receipts,
        }
    }

    fn consume(&mut self, envelope: Envelope) {
        let Envelope { sender, message } = envelope;

        match message {
            Message::Block(block) => {
                let id = block.id;
                self.stats.blocks.entry(id).or_insert(self.now);

                let added = self.ledger.add_block(block);
                self.emit(Event::BlockReceived {
                    block: id,
                    duplicate: !added,
                });
                self.advertise(Inventory::Block(id));
            }
            Message::Transaction(tx) => {
                let id = tx.id;
                self.stats.txs.entry(id).or_insert(self.now);

                let added = self.mempool.add(tx);
                self.emit(Event::TransactionReceived {
                    tx: id,
                    duplicate: !added,
                });
                self.advertise(Inventory::Transaction(id));
            }
            Message::Inventory(item) => {
                let known = match item {
                    Inventory::Block(id) => self.ledger.contains(id),
                    Inventory::Transaction(id) => self.mempool.contains(id),
                };
                if known {
                    self.emit(Event::InventoryReceived {
                        from: sender,
                        item,
                        requested: false,
                    });
                    return;
                }

                let Some(region) = self.peer_region(sender) else {
                    return;
                };

                match item {
                    Inventory::Block(id) => self.ledger.register_pending(id),
                    Inventory::Transaction(id) => {
                        self.mempool.register_pending(id)
                    }
                };
                self.send(sender, region, Message::DataRequest(item));
                self.emit(Event::InventoryReceived {
                    from: sender,
                    item,
                    requested: true,
                });
            }
            Message::DataRequest(item) => {
                let Some(region) = self.peer_region(sender) else {
                    return;
                };

                let body = match item {
                    Inventory::Block(id) => {
                        self.ledger.get(id).cloned().map(Message::Block)
                    }
                    Inventory::Transaction(id) => {
                        self.mempool.get(id).cloned().map(Message::Transaction)
                    }
                };

                match body {
                    Some(body) => {
                        self.send(sender, region, body);
                        self.emit(Event::DataRequested { from: sender, item });
                    }
                    None => {
                        self.emit(Event::UnanswerableRequest {
                            from: sender,
                            item,
                        });
                    }
                }
            }
        }
    }

    /// Returns the region of `peer`, reporting [`Event::UnknownPeer`] if
    /// there is no connection to it.
    fn peer_region(&self, peer: NodeId) -> Option<Region> {
        let region = self.peers.get(&peer).copied();
        if region.is_none() {
            self.emit(Event::UnknownPeer { from: peer });
        }

        region
    }

    /// Sends an advertisement for `item` over every outgoing connection.
    fn advertise(&mut self, item: Inventory) {
        let peers: Vec<_> =
            self.peers.iter().map(|(&id, &region)| (id, region)).collect();

        for (peer, region) in peers {
            self.send(peer, region, Message::Inventory(item));
        }
    }

    fn send(&mut self, destination: NodeId, region: Region, message: Message) {
        let size = message.size();
        let seconds =
            self.delay.delay(self.region, region, size, &mut self.rng);
        let deliver_at = self.links.schedule(
            destination,
            self.now,
            seconds / self.params.tick_seconds,
        );

        self.outbox.push(Outbound {
            destination,
            envelope: Envelope::new(self.id, message),
            deliver_at,
        });
    }

    #[inline]
    fn emit(&self, event: Event) {
        self.observer.observe(self.now, self.id, &event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Node, NodeId, ProtocolParams};
    use crate::{
        block::{Block, BlockId},
        message::{Envelope, Inventory, Message},
        network::{ConstantDelay, Region},
        observer::{Event, EventLog},
        transaction::{Transaction, TxId},
    };

    fn node(id: usize) -> Node {
        Node::new(
            id.into(),
            format!("node-{}", id),
            Region::Europe,
            0.5,
            ProtocolParams::default(),
            Box::new(ConstantDelay(2.5)),
            id as u64,
        )
    }

    fn connected(id: usize, peers: &[usize]) -> Node {
        let mut node = node(id);
        for &peer in peers {
            node.connect(peer.into(), Region::Europe);
        }

        node
    }

    fn tx(id: u64, fee: u64) -> Arc<Transaction> {
        Arc::new(Transaction::new(id.into(), 400, fee, 100, 0).unwrap())
    }

    #[test]
    #[should_panic]
    fn genesis_id_is_reserved() {
        let _ = NodeId::from(0);
    }

    #[test]
    fn received_block_is_stored_and_advertised() {
        let mut n = connected(2, &[1, 3]);
        let block = Arc::new(Block::on_top_of(
            &Block::genesis(),
            BlockId::new(1.into(), 1),
            0,
            Block::HEADER_SIZE,
            vec![],
        ));

        let envelope = Envelope::new(1.into(), Message::Block(block));
        let out = n.step(4, vec![envelope]);

        assert_eq!(n.ledger().height(), 1);
        assert_eq!(n.stats().blocks[&BlockId::new(1.into(), 1)], 4);
        assert_eq!(out.len(), 2);
        for o in &out {
            assert_eq!(
                o.envelope.message,
                Message::Inventory(Inventory::Block(BlockId::new(1.into(), 1)))
            );
            assert_eq!(o.deliver_at, 7);
        }
    }

    #[test]
    fn unknown_inventory_is_requested_once() {
        let mut n = connected(2, &[1]);
        let item = Inventory::Transaction(5.into());
        let inv = Envelope::new(1.into(), Message::Inventory(item));

        let out = n.step(0, vec![inv.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, NodeId::from(1));
        assert_eq!(out[0].envelope.message, Message::DataRequest(item));
        assert!(n.mempool().contains(5.into()));

        let out = n.step(1, vec![inv]);
        assert!(out.is_empty());
    }

    #[test]
    fn data_request_answered_with_body() {
        let mut n = connected(2, &[1]);
        let t = tx(5, 10);
        let msg = Message::Transaction(t.clone());
        n.step(0, vec![Envelope::new(2.into(), msg)]);

        let request = Message::DataRequest(Inventory::Transaction(5.into()));
        let out = n.step(1, vec![Envelope::new(1.into(), request)]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].envelope.message, Message::Transaction(t));
    }

    #[test]
    fn placeholder_request_goes_unanswered() {
        let log = Arc::new(EventLog::new());
        let mut n = connected(2, &[1]).with_observer(log.clone());
        let id = BlockId::new(1.into(), 1);

        let inv = Message::Inventory(Inventory::Block(id));
        n.step(0, vec![Envelope::new(1.into(), inv)]);
        assert!(n.ledger().is_pending(id));

        let request = Message::DataRequest(Inventory::Block(id));
        let out = n.step(1, vec![Envelope::new(1.into(), request)]);

        assert!(out.is_empty());
        let unanswered = log.filter(|r| {
            matches!(r.event, Event::UnanswerableRequest { .. })
        });
        assert_eq!(unanswered.len(), 1);
    }

    #[test]
    fn message_from_non_peer_is_dropped() {
        let log = Arc::new(EventLog::new());
        let mut n = connected(2, &[1]).with_observer(log.clone());
        let item = Inventory::Block(BlockId::new(9.into(), 1));

        let inv = Envelope::new(9.into(), Message::Inventory(item));
        let out = n.step(0, vec![inv]);

        assert!(out.is_empty());
        assert!(!n.ledger().contains(BlockId::new(9.into(), 1)));
        assert_eq!(
            log.records()[0].event,
            Event::UnknownPeer { from: 9.into() }
        );
    }

    #[test]
    fn mined_block_takes_best_transactions() {
        let mut n = connected(1, &[2]);
        n.step(
            0,
            vec![
                Envelope::new(1.into(), Message::Transaction(tx(1, 400))),
                Envelope::new(1.into(), Message::Transaction(tx(2, 4000))),
            ],
        );

        let block = n.mine_block(3);
        assert_eq!(block.id, BlockId::new(1.into(), 1));
        assert_eq!(block.height, 1);
        assert_eq!(block.txns[0].id, 2.into());
        assert_eq!(block.size, Block::HEADER_SIZE + 800);
        assert!(n.mempool().is_empty());
        assert_eq!(n.ledger().choose_best_head().id, block.id);

        let out = n.take_outbound();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].envelope.message,
            Message::Inventory(Inventory::Block(block.id))
        );
    }

    #[test]
    fn certain_mining_mines_every_step() {
        let mut n = node(1);
        n.set_difficulty(2.0);
        assert_eq!(n.mining_probability(), 1.0);

        n.step(0, vec![]);
        n.step(1, vec![]);
        assert_eq!(n.blocks_mined(), 2);
        assert_eq!(n.ledger().height(), 2);
    }

    #[test]
    fn duplicate_delivery_only_readvertises() {
        let mut n = connected(2, &[1]);
        let t = tx(1, 10);
        let msg = Envelope::new(1.into(), Message::Transaction(t));

        n.step(0, vec![msg.clone()]);
        let out = n.step(5, vec![msg]);

        assert_eq!(n.mempool().len(), 1);
        assert_eq!(n.stats().txs[&TxId(1)], 0);
        assert_eq!(out.len(), 1);
    }
}
