/*!
Re-export of common values and datatypes used for running and analyzing
simulations. Must be imported manually.

```
use propagation_sim::prelude::*;
```
*/

use crate::{
    block, config, ledger, mempool, message, network, node, observer,
    power_dist, results, simulation, snapshot, transaction,
};

pub use block::{Block, BlockId};

pub use config::{ConfigError, SimulationConfig};

pub use ledger::{Ledger, LedgerEntry};

pub use mempool::{Mempool, TxEntry};

pub use message::{Envelope, Inventory, Message};

pub use network::{ConstantDelay, DelayModel, Region, RegionLatency};

pub use node::{Node, NodeId, ProtocolParams};

pub use observer::{Event, EventLog, NullObserver, Observer, TracingObserver};

pub use power_dist::{PowerDistribution, PowerDistributionError, PowerValue};

pub use results::{Format, ResultsBuilder, ResultsTable};

pub use simulation::{
    Simulation, SimulationBuildError, SimulationBuilder, SimulationError,
    Tick, Workload,
};

pub use snapshot::SimulationSnapshot;

pub use transaction::{Transaction, TxId};
