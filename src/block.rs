use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{node::NodeId, simulation::Tick, transaction::Transaction};

/// Representation of a mined block of transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// The block this block was mined on top of. `None` only for genesis.
    pub parent: Option<BlockId>,
    /// Length of the path from this block to genesis, as known to the node
    /// which mined it.
    pub height: u64,
    /// The node which mined this block.
    pub miner: NodeId,
    /// The tick this block was mined in.
    pub created_at: Tick,
    /// The transactions contained within this block, in assembly order.
    pub txns: Vec<Arc<Transaction>>,
    /// Header size plus the size of every contained transaction.
    pub size: u64,
}

/// A unique identifier assigned to each [Block]. Every node numbers its own
/// blocks starting from 1, so ids never collide across nodes.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize,
    Deserialize,
)]
pub struct BlockId {
    pub miner: NodeId,
    pub seq: u64,
}

impl BlockId {
    pub const GENESIS: BlockId = BlockId { miner: NodeId::GENESIS, seq: 0 };

    pub fn new(miner: NodeId, seq: u64) -> Self {
        BlockId { miner, seq }
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.miner, self.seq)
    }
}

impl Block {
    /// Size of a block header in bytes.
    pub const HEADER_SIZE: u64 = 80;

    /// Creates the genesis block shared by every node of a simulation.
    pub fn genesis() -> Self {
        Block {
            id: BlockId::GENESIS,
            parent: None,
            height: 0,
            miner: NodeId::GENESIS,
            created_at: 0,
            txns: vec![],
            size: Self::HEADER_SIZE,
        }
    }

    /// Creates a block on top of `parent`, one higher than it.
    pub fn on_top_of(
        parent: &Block,
        id: BlockId,
        created_at: Tick,
        header_size: u64,
        txns: Vec<Arc<Transaction>>,
    ) -> Self {
        let size = header_size + txns.iter().map(|tx| tx.size).sum::<u64>();

        Block {
            id,
            parent: Some(parent.id),
            height: parent.height + 1,
            miner: id.miner,
            created_at,
            txns,
            size,
        }
    }

    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Block {}

impl Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parent {
            Some(parent) => write!(
                f,
                "BLOCK ({}, prev: {}, height: {})",
                self.id, parent, self.height
            ),
            None => write!(f, "BLOCK ({}, genesis)", self.id),
        }
    }
}
