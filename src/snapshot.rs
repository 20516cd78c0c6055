//! Serializable snapshots of node and simulation state.
//!
//! Only state a node builds up during a run is captured. Mining power,
//! connections and difficulty come from configuration and are supplied again
//! on reload.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    block::{Block, BlockId},
    network::Region,
    node::NodeId,
    simulation::Tick,
    transaction::{Transaction, TxId},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Every known block, in ascending order of height.
    pub blocks: Vec<Arc<Block>>,
    /// IDs advertised to the node whose bodies never arrived.
    pub pending: Vec<BlockId>,
    /// Chain tips, in the order they became tips.
    pub heads: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolSnapshot {
    /// Transactions still waiting for a block, in the order they would be
    /// popped.
    pub queued: Vec<Arc<Transaction>>,
    /// Transactions this node already put in one of its blocks.
    pub included: Vec<Arc<Transaction>>,
    /// IDs advertised to the node whose bodies never arrived.
    pub pending: Vec<TxId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub region: Region,
    pub blocks_mined: u64,
    pub ledger: LedgerSnapshot,
    pub mempool: MempoolSnapshot,
    pub block_receipts: Vec<(BlockId, Tick)>,
    pub tx_receipts: Vec<(TxId, Tick)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    /// The tick the simulation would run next.
    pub tick: Tick,
    /// The ID the next submitted transaction would receive.
    #[serde(default)]
    pub next_tx: u64,
    pub nodes: Vec<NodeSnapshot>,
}

impl SimulationSnapshot {
    /// The first transaction ID which is safe to hand out after resuming:
    /// past both the saved counter and every ID any node has seen.
    pub fn next_tx_id(&self) -> u64 {
        let seen = self.nodes.iter().flat_map(|node| {
            let mempool = &node.mempool;
            let bodies = mempool.queued.iter().chain(&mempool.included);
            let in_blocks = node.ledger.blocks.iter().flat_map(|b| &b.txns);

            bodies
                .chain(in_blocks)
                .map(|tx| tx.id)
                .chain(mempool.pending.iter().copied())
                .chain(node.tx_receipts.iter().map(|&(id, _)| id))
        });

        seen.map(|id| id.0 + 1).fold(self.next_tx, u64::max)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
