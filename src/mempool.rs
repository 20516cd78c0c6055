//! Fee-prioritized pool of transactions awaiting inclusion in a block.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    sync::Arc,
};

use crate::{
    snapshot::MempoolSnapshot,
    transaction::{Transaction, TxId},
};

/// A node's pool of unconfirmed transactions.
///
/// Holds a priority queue ordered by descending feerate (ties broken by
/// arrival order) and an index of every transaction ID the node has heard
/// of. Transactions popped by [Mempool::assemble] leave the queue but stay in
/// the index, so they are never requested or queued again.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    queue: BinaryHeap<Queued>,
    index: HashMap<TxId, TxEntry>,
    /// Arrival counter used to break feerate ties.
    next_seq: u64,
    /// Total size of all queued transactions.
    queued_bytes: u64,
}

/// A transaction ID as held within a [Mempool] index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEntry {
    Known(Arc<Transaction>),
    /// The ID was advertised, but the body has not arrived yet.
    Pending,
}

#[derive(Debug, Clone)]
struct Queued {
    seq: u64,
    tx: Arc<Transaction>,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher feerate first, then earlier arrival first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.tx
            .cmp_feerate(&other.tx)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true iff the ID is indexed, with or without a body.
    #[inline]
    pub fn contains(&self, id: TxId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the body of the transaction with the given ID, if received.
    #[inline]
    pub fn get(&self, id: TxId) -> Option<&Arc<Transaction>> {
        match self.index.get(&id) {
            Some(TxEntry::Known(tx)) => Some(tx),
            _ => None,
        }
    }

    /// Number of transactions waiting to be included in a block.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total size in bytes of the queued transactions.
    #[inline]
    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes
    }

    /// Iterates over the queued transactions in no particular order.
    pub fn queued(&self) -> impl Iterator<Item = &Arc<Transaction>> {
        self.queue.iter().map(|queued| &queued.tx)
    }

    /// Iterates over every index entry in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&TxId, &TxEntry)> {
        self.index.iter()
    }

    /// Queues `tx`, replacing an ID-only record for it. Returns false if the
    /// body was already known.
    pub fn add(&mut self, tx: Arc<Transaction>) -> bool {
        if self.get(tx.id).is_some() {
            return false;
        }

        self.index.insert(tx.id, TxEntry::Known(tx.clone()));
        self.push(tx);

        true
    }

    /// Records that a transaction exists without holding its body. Returns
    /// false if the ID was already indexed.
    pub fn register_pending(&mut self, id: TxId) -> bool {
        if self.contains(id) {
            return false;
        }

        self.index.insert(id, TxEntry::Pending);
        true
    }

    pub fn snapshot(&self) -> MempoolSnapshot {
        let mut queued: Vec<_> = self.queue.clone().into_sorted_vec();
        queued.reverse();
        let queued: Vec<_> = queued.into_iter().map(|q| q.tx).collect();
        let queued_ids: HashSet<_> = queued.iter().map(|tx| tx.id).collect();

        let mut included = vec![];
        let mut pending = vec![];
        for (&id, entry) in self.index.iter() {
            match entry {
                TxEntry::Pending => pending.push(id),
                TxEntry::Known(tx) => {
                    if !queued_ids.contains(&id) {
                        included.push(tx.clone());
                    }
                }
            }
        }
        included.sort_by_key(|tx| tx.id);
        pending.sort();

        MempoolSnapshot { queued, included, pending }
    }

    /// Rebuilds a mempool from a snapshot, keeping the pop order of the
    /// queued transactions.
    pub fn restore(snapshot: MempoolSnapshot) -> Self {
        let MempoolSnapshot { queued, included, pending } = snapshot;

        let mut pool = Mempool::new();
        for tx in queued {
            pool.add(tx);
        }
        for tx in included {
            pool.index.insert(tx.id, TxEntry::Known(tx));
        }
        for id in pending {
            pool.register_pending(id);
        }

        pool
    }

    /// Pops transactions in descending feerate order for as long as the next
    /// one fits in a block of `max_size` bytes with a `header_size` byte
    /// header. Selection is greedy: it stops at the first transaction that
    /// does not fit, even if a smaller one further down would.
    pub fn assemble(
        &mut self,
        max_size: u64,
        header_size: u64,
    ) -> Vec<Arc<Transaction>> {
        let mut size = header_size;
        let mut txns = vec![];

        while let Some(next) = self.queue.peek() {
            if size + next.tx.size > max_size {
                break;
            }

            size += next.tx.size;
            if let Some(Queued { tx, .. }) = self.queue.pop() {
                self.queued_bytes -= tx.size;
                txns.push(tx);
            }
        }

        txns
    }

    fn push(&mut self, tx: Arc<Transaction>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued_bytes += tx.size;
        self.queue.push(Queued { seq, tx });
    }
}
