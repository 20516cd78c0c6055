//! Random transaction arrivals for driving the mempools of a simulation.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{node::NodeId, transaction::Transaction};

use super::{Simulation, SimulationError};

/// Submits randomly sized transactions to random nodes.
///
/// In every tick, each of `max_per_tick` potential arrivals happens with
/// probability `arrival_probability`. Fees are drawn uniformly from
/// `min_fee..=max_fee`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workload {
    pub arrival_probability: f64,
    pub max_per_tick: u32,
    pub size: u64,
    pub min_fee: u64,
    pub max_fee: u64,
    pub value: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Workload {
            arrival_probability: 0.0,
            max_per_tick: 1,
            size: Transaction::DEFAULT_SIZE,
            min_fee: 0,
            max_fee: 0,
            value: 100,
        }
    }
}

impl Workload {
    /// Runs `ticks` ticks of `sim`, submitting transactions before each one.
    /// Transaction origins and fees are drawn from a generator seeded with
    /// `seed`, independent of the nodes' own generators.
    pub fn drive(
        &self,
        sim: &mut Simulation,
        ticks: u64,
        seed: u64,
    ) -> Result<(), SimulationError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = self.arrival_probability.clamp(0.0, 1.0);
        let num_nodes = sim.nodes().len();

        for _ in 0..ticks {
            for _ in 0..self.max_per_tick {
                if num_nodes == 0 || !rng.gen_bool(p) {
                    continue;
                }

                let origin = NodeId(rng.gen_range(1..=num_nodes));
                let max_fee = self.max_fee.max(self.min_fee);
                let fee = rng.gen_range(self.min_fee..=max_fee);
                sim.submit_transaction(origin, self.size, fee, self.value)?;
            }

            sim.step();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Workload;
    use crate::{network::Region, simulation::SimulationBuilder};

    #[test]
    fn transactions_reach_every_mempool() {
        let mut sim = SimulationBuilder::new()
            .add_node("a", Region::Europe, 0.5)
            .add_node("b", Region::Europe, 0.5)
            .fully_connected()
            .difficulty(0.0)
            .seed(3)
            .build()
            .unwrap();

        let workload = Workload {
            arrival_probability: 1.0,
            min_fee: 1,
            max_fee: 50,
            ..Default::default()
        };
        workload.drive(&mut sim, 5, 9).unwrap();
        sim.run(50);

        for node in sim.nodes() {
            assert_eq!(node.mempool().len(), 5);
        }
    }
}
