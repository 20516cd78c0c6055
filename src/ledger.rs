use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    block::{Block, BlockId},
    snapshot::LedgerSnapshot,
};

/// A node's local view of the block tree. [Blocks](Block) are added via
/// [Ledger::add_block], and the tip to mine on is chosen via
/// [Ledger::choose_best_head].
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The genesis block of this ledger.
    pub genesis: BlockId,
    /// Map from the ID of a block to its body, or to a placeholder if the
    /// block has been advertised but not yet received.
    blocks: HashMap<BlockId, LedgerEntry>,
    /// Chain tips, in the order they became tips.
    heads: Vec<Arc<Block>>,
    /// IDs of all blocks referenced as a parent by a known block.
    parents: HashSet<BlockId>,
}

/// A block as held within a [Ledger].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    Known(Arc<Block>),
    /// The block's ID was advertised, but its body has not arrived yet.
    Pending,
}

impl Ledger {
    /// Creates a new ledger whose only block and only head is `genesis`.
    pub fn new(genesis: Arc<Block>) -> Self {
        let id = genesis.id;
        let blocks = HashMap::from([(id, LedgerEntry::Known(genesis.clone()))]);

        Ledger {
            genesis: id,
            blocks,
            heads: vec![genesis],
            parents: HashSet::new(),
        }
    }

    /// Returns true iff the given ID is present, either as a known block or
    /// as a placeholder.
    #[inline]
    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Returns the body of the block with the given ID, if it has been
    /// received.
    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&Arc<Block>> {
        match self.blocks.get(&id) {
            Some(LedgerEntry::Known(block)) => Some(block),
            _ => None,
        }
    }

    #[inline]
    pub fn is_pending(&self, id: BlockId) -> bool {
        matches!(self.blocks.get(&id), Some(LedgerEntry::Pending))
    }

    /// Number of blocks with a known body.
    pub fn num_blocks(&self) -> usize {
        self.known_blocks().count()
    }

    /// Iterates over every block with a known body, in no particular order.
    pub fn known_blocks(&self) -> impl Iterator<Item = &Arc<Block>> {
        self.blocks.values().filter_map(|entry| match entry {
            LedgerEntry::Known(block) => Some(block),
            LedgerEntry::Pending => None,
        })
    }

    /// Iterates over the IDs of every placeholder entry.
    pub fn pending(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().filter_map(|(&id, entry)| match entry {
            LedgerEntry::Pending => Some(id),
            LedgerEntry::Known(_) => None,
        })
    }

    /// Returns the current chain tips, in the order they became tips.
    #[inline]
    pub fn heads(&self) -> &[Arc<Block>] {
        &self.heads
    }

    /// Records that the block with the given ID exists without holding its
    /// body. Returns false if the ID was already present.
    pub fn register_pending(&mut self, id: BlockId) -> bool {
        if self.contains(id) {
            return false;
        }

        self.blocks.insert(id, LedgerEntry::Pending);
        true
    }

    /// Adds the given block to the ledger, replacing a placeholder for its
    /// ID if there is one. Returns false if the block's body was already
    /// known, in which case nothing changes.
    pub fn add_block(&mut self, block: Arc<Block>) -> bool {
        if self.get(block.id).is_some() {
            return false;
        }

        if let Some(parent) = block.parent {
            self.heads.retain(|head| head.id != parent);
            self.parents.insert(parent);
        }

        // A child of this block may have arrived first.
        if !self.parents.contains(&block.id) {
            self.heads.push(block.clone());
        }
        self.blocks.insert(block.id, LedgerEntry::Known(block));

        true
    }

    /// Returns the head with the greatest height. Ties go to the head which
    /// became a tip first.
    ///
    /// ## Panics
    /// Panics if there are no heads, which cannot happen for a ledger made by
    /// [Ledger::new].
    pub fn choose_best_head(&self) -> &Arc<Block> {
        let mut heads = self.heads.iter();
        let mut best = match heads.next() {
            Some(head) => head,
            None => unreachable!("ledger heads cannot be empty"),
        };

        for head in heads {
            if head.height > best.height {
                best = head;
            }
        }

        best
    }

    /// Height of the best head.
    #[inline]
    pub fn height(&self) -> u64 {
        self.choose_best_head().height
    }

    /// Returns the IDs of all blocks on the path from genesis to the best
    /// head, in ascending order of height. Stops early if an ancestor's body
    /// is missing.
    pub fn best_chain(&self) -> Vec<BlockId> {
        let mut chain = vec![];

        let mut curr = Some(self.choose_best_head());
        while let Some(block) = curr {
            chain.push(block.id);
            curr = block.parent.and_then(|parent| self.get(parent));
        }

        chain.reverse();
        chain
    }

    /// Mean number of ticks between consecutive blocks on the best chain, or
    /// `None` if the best chain is only genesis.
    pub fn average_block_interval(&self) -> Option<f64> {
        let chain = self.best_chain();
        if chain.len() < 2 {
            return None;
        }

        let total: u64 = chain
            .windows(2)
            .map(|pair| {
                let (prev, next) = (&self[pair[0]], &self[pair[1]]);
                next.created_at.saturating_sub(prev.created_at)
            })
            .sum();

        Some(total as f64 / (chain.len() - 1) as f64)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut blocks: Vec<_> = self.known_blocks().cloned().collect();
        blocks.sort_by_key(|block| (block.height, block.id));
        let mut pending: Vec<_> = self.pending().collect();
        pending.sort();

        LedgerSnapshot {
            blocks,
            pending,
            heads: self.heads.iter().map(|head| head.id).collect(),
        }
    }

    /// Rebuilds a ledger from a snapshot. Falls back to a fresh genesis block
    /// if the snapshot holds none.
    pub fn restore(snapshot: LedgerSnapshot) -> Self {
        let LedgerSnapshot { blocks, pending, heads } = snapshot;

        let genesis = blocks
            .iter()
            .find(|block| block.is_genesis())
            .cloned()
            .unwrap_or_else(|| Arc::new(Block::genesis()));

        let mut ledger = Ledger::new(genesis);
        for block in blocks {
            ledger.add_block(block);
        }
        for id in pending {
            ledger.register_pending(id);
        }

        ledger.heads.sort_by_key(|head| {
            heads.iter().position(|&id| id == head.id).unwrap_or(usize::MAX)
        });

        ledger
    }

    /// Known blocks which are not on the best chain.
    pub fn stale_blocks(&self) -> usize {
        let best: HashSet<_> = self.best_chain().into_iter().collect();

        self.known_blocks().filter(|block| !best.contains(&block.id)).count()
    }
}

impl std::ops::Index<BlockId> for Ledger {
    type Output = Block;

    /// ## Panics
    /// Panics if the block's body is not known.
    fn index(&self, index: BlockId) -> &Self::Output {
        match self.get(index) {
            Some(block) => block.as_ref(),
            None => panic!("ledger does not hold block {}", index),
        }
    }
}
