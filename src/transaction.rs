//! Transactions gossiped between nodes and collected into blocks.

use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::simulation::Tick;

/// Unique identifier of a [`Transaction`].
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub struct TxId(pub u64);

impl From<u64> for TxId {
    fn from(value: u64) -> Self {
        TxId(value)
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// A transaction with a flat fee, size and value. Carries no inputs or
/// outputs: only what is needed to prioritize it in a mempool.
///
/// Deserialization goes through [`Transaction::new`], so a transaction read
/// from a snapshot is checked like one created during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TransactionFields")]
pub struct Transaction {
    pub id: TxId,
    /// Size in bytes. Always greater than zero.
    pub size: u64,
    pub fee: u64,
    pub value: u64,
    /// Tick at which the transaction entered the network.
    pub created_at: Tick,
}

#[derive(Deserialize)]
struct TransactionFields {
    id: TxId,
    size: u64,
    fee: u64,
    value: u64,
    created_at: Tick,
}

impl TryFrom<TransactionFields> for Transaction {
    type Error = TransactionError;

    fn try_from(fields: TransactionFields) -> Result<Self, Self::Error> {
        let TransactionFields { id, size, fee, value, created_at } = fields;

        Transaction::new(id, size, fee, value, created_at)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction {0} has a size of 0 bytes")]
    ZeroSize(TxId),
}

impl Transaction {
    /// Default size of a transaction in bytes.
    pub const DEFAULT_SIZE: u64 = 400;

    pub fn new(
        id: TxId,
        size: u64,
        fee: u64,
        value: u64,
        created_at: Tick,
    ) -> Result<Self, TransactionError> {
        if size == 0 {
            return Err(TransactionError::ZeroSize(id));
        }

        Ok(Transaction { id, size, fee, value, created_at })
    }

    /// Fee paid per byte.
    #[inline]
    pub fn feerate(&self) -> f64 {
        self.fee as f64 / self.size as f64
    }

    /// Compares the feerates of two transactions exactly, without going
    /// through floating point.
    pub fn cmp_feerate(&self, other: &Self) -> Ordering {
        let lhs = self.fee as u128 * other.size as u128;
        let rhs = other.fee as u128 * self.size as u128;

        lhs.cmp(&rhs)
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TX ({}, value: {}, feerate: {:.3})",
            self.id,
            self.value,
            self.feerate()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{Transaction, TransactionError};

    #[test]
    fn zero_size_rejected() {
        let err = Transaction::new(7.into(), 0, 10, 100, 0).unwrap_err();
        assert!(matches!(err, TransactionError::ZeroSize(id) if id.0 == 7));
    }

    #[test]
    fn feerate_comparison_is_exact() {
        let a = Transaction::new(1.into(), 3, 1, 0, 0).unwrap();
        let b = Transaction::new(2.into(), 6, 2, 0, 0).unwrap();
        let c = Transaction::new(3.into(), 400, 2000, 0, 0).unwrap();

        assert_eq!(a.cmp_feerate(&b), Ordering::Equal);
        assert_eq!(c.cmp_feerate(&a), Ordering::Greater);
        assert_eq!(c.feerate(), 5.0);
    }

    #[test]
    fn deserialized_zero_size_rejected() {
        let valid = r#"{"id":3,"size":400,"fee":8,"value":0,"created_at":2}"#;
        let tx: Transaction = serde_json::from_str(valid).unwrap();
        assert_eq!(tx.size, 400);

        let zero = r#"{"id":3,"size":0,"fee":8,"value":0,"created_at":2}"#;
        let err = serde_json::from_str::<Transaction>(zero).unwrap_err();
        assert!(err.to_string().contains("size of 0 bytes"));
    }
}
