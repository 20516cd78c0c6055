/*!
Simulator for block and transaction propagation in a Bitcoin-like
proof-of-work network.

Nodes mine blocks with probability proportional to their mining power,
gossip blocks and transactions to their peers through inventory
announcements and data requests, and follow the longest chain they know.
Time advances in discrete ticks and messages take a delay that depends on
their size and the regions of the two nodes they travel between.
*/

pub mod block;
pub mod config;
pub mod ledger;
pub mod link;
pub mod logging;
pub mod mempool;
pub mod message;
pub mod network;
pub mod node;
pub mod observer;
pub mod power_dist;
pub mod prelude;
pub mod results;
pub mod simulation;
pub mod snapshot;
pub mod transaction;
