//! Items which flow over links between nodes.

use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    block::{Block, BlockId},
    node::NodeId,
    transaction::{Transaction, TxId},
};

/// Size in bytes of an inventory advertisement or a data request.
pub const INVENTORY_MESSAGE_SIZE: u64 = 36;

/// Identifies an item that can be advertised or requested.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum Inventory {
    Block(BlockId),
    Transaction(TxId),
}

impl Display for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block(id) => write!(f, "block {}", id),
            Self::Transaction(id) => write!(f, "{}", id),
        }
    }
}

/// Every kind of item a node can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A full block body.
    Block(Arc<Block>),
    /// A full transaction body.
    Transaction(Arc<Transaction>),
    /// Announces that the sender holds the given item (`inv`).
    Inventory(Inventory),
    /// Asks the receiver for the body of the given item (`getdata`).
    DataRequest(Inventory),
}

impl Message {
    /// Number of bytes this message occupies on a link.
    pub fn size(&self) -> u64 {
        match self {
            Self::Block(block) => block.size,
            Self::Transaction(tx) => tx.size,
            Self::Inventory(_) | Self::DataRequest(_) => INVENTORY_MESSAGE_SIZE,
        }
    }
}

/// A [`Message`] together with the node that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: NodeId,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender: NodeId, message: Message) -> Self {
        Envelope { sender, message }
    }
}
