use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    network::{DelayModel, Region, RegionLatency},
    node::{Node, NodeId, ProtocolParams},
    observer::{Observer, TracingObserver},
    power_dist::{PowerDistribution, PowerDistributionError, PowerValue},
    snapshot::SimulationSnapshot,
};

use super::Simulation;

/// Builds a [Simulation].
#[derive(Debug, Default)]
pub struct SimulationBuilder {
    pub difficulty: Option<f64>,
    pub params: ProtocolParams,
    pub power_dist: Option<PowerDistribution>,
    pub seed: Option<u64>,
    nodes: Vec<NodeSpec>,
    links: Vec<(NodeId, NodeId)>,
    fully_connected: bool,
    delay: Option<Box<dyn DelayModel>>,
    observer: Option<Arc<dyn Observer>>,
    snapshot: Option<SimulationSnapshot>,
}

/// A node as described to a [SimulationBuilder].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub region: Region,
    pub power: PowerValue,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationBuildError {
    #[error("no nodes were added")]
    NoNodesGiven,
    #[error("power value {0} is not in the range 0.0..=1.0")]
    BadPowerValue(PowerValue),
    #[error("difficulty {0} gives a mining probability outside 0.0..=1.0")]
    BadDifficulty(f64),
    #[error("a tick must last a positive number of seconds, not {0}")]
    BadTickSeconds(f64),
    #[error("header size {header} exceeds the maximum block size {max}")]
    HeaderTooLarge { header: u64, max: u64 },
    #[error("link refers to unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} cannot be linked to itself")]
    SelfLink(NodeId),
    #[error("snapshot holds {0} nodes, but {1} were added")]
    SnapshotMismatch(usize, usize),
    #[error(transparent)]
    PowerDistributionError(#[from] PowerDistributionError),
}

impl SimulationBuilder {
    /// Difficulty used if none is given: one block every 600 ticks across
    /// the whole network.
    pub const DEFAULT_DIFFICULTY: f64 = 1.0 / 600.0;

    /// Creates a new [SimulationBuilder].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with the given mining power share. Nodes receive IDs
    /// starting from 1, in order of addition.
    pub fn add_node<N>(
        mut self,
        name: N,
        region: Region,
        power: PowerValue,
    ) -> Self
    where
        N: Into<String>,
    {
        self.nodes.push(NodeSpec { name: name.into(), region, power });

        self
    }

    /// IDs which the nodes added so far will receive.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (1..=self.nodes.len()).map(NodeId)
    }

    /// Connects `a` and `b` in both directions.
    pub fn connect(mut self, a: NodeId, b: NodeId) -> Self {
        self.links.push((a, b));
        self.links.push((b, a));

        self
    }

    /// Opens a connection from `from` to `to` only.
    pub fn connect_one_way(mut self, from: NodeId, to: NodeId) -> Self {
        self.links.push((from, to));

        self
    }

    /// Connects every pair of nodes in both directions.
    pub fn fully_connected(mut self) -> Self {
        self.fully_connected = true;

        self
    }

    /// Overrides the power of every node with the given distribution.
    pub fn power_dist(mut self, dist: PowerDistribution) -> Self {
        self.power_dist = Some(dist);

        self
    }

    /// Sets the probability of mining a block in one tick with a mining power
    /// of 1 (default [SimulationBuilder::DEFAULT_DIFFICULTY]).
    pub fn difficulty(mut self, difficulty: f64) -> Self {
        self.difficulty = Some(difficulty);

        self
    }

    pub fn max_block_size(mut self, bytes: u64) -> Self {
        self.params.max_block_size = bytes;

        self
    }

    pub fn header_size(mut self, bytes: u64) -> Self {
        self.params.header_size = bytes;

        self
    }

    /// Sets how many real-world seconds one tick represents (default 1).
    pub fn tick_seconds(mut self, seconds: f64) -> Self {
        self.params.tick_seconds = seconds;

        self
    }

    /// Sets the delay model of every link ([RegionLatency::default]
    /// otherwise).
    pub fn delay_model<D: DelayModel + 'static>(mut self, model: D) -> Self {
        self.delay = Some(Box::new(model));

        self
    }

    /// Reports node events to `observer` ([TracingObserver] otherwise).
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);

        self
    }

    /// Seeds every random choice made during the simulation. Runs with the
    /// same seed and configuration are identical.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    /// Resumes from `snapshot` instead of starting from genesis. The nodes it
    /// holds must match the nodes added to this builder one to one.
    pub fn from_snapshot(mut self, snapshot: SimulationSnapshot) -> Self {
        self.snapshot = Some(snapshot);

        self
    }

    /// Creates a [Simulation] from the specified parameters.
    pub fn build(self) -> Result<Simulation, SimulationBuildError> {
        use SimulationBuildError::*;

        let SimulationBuilder {
            difficulty,
            params,
            power_dist,
            seed,
            nodes,
            mut links,
            fully_connected,
            delay,
            observer,
            snapshot,
        } = self;

        let n = nodes.len();
        if n == 0 {
            return Err(NoNodesGiven);
        }

        if !(params.tick_seconds.is_finite() && params.tick_seconds > 0.0) {
            return Err(BadTickSeconds(params.tick_seconds));
        }
        if params.header_size > params.max_block_size {
            return Err(HeaderTooLarge {
                header: params.header_size,
                max: params.max_block_size,
            });
        }

        let powers = match power_dist {
            Some(dist) => dist.values(n)?,
            None => nodes.iter().map(|node| node.power).collect(),
        };
        if let Some(&power) =
            powers.iter().find(|p| p.is_nan() || !(0.0..=1.0).contains(*p))
        {
            return Err(BadPowerValue(power));
        }

        let difficulty = difficulty.unwrap_or(Self::DEFAULT_DIFFICULTY);
        let max_power = powers.iter().copied().fold(0.0, PowerValue::max);
        if !(difficulty.is_finite() && difficulty >= 0.0)
            || max_power * difficulty > 1.0
        {
            return Err(BadDifficulty(difficulty));
        }

        if fully_connected {
            for a in 1..=n {
                for b in (1..=n).filter(|&b| b != a) {
                    links.push((NodeId(a), NodeId(b)));
                }
            }
        }
        for &(from, to) in links.iter() {
            for id in [from, to] {
                if id.0 == 0 || id.0 > n {
                    return Err(UnknownNode(id));
                }
            }
            if from == to {
                return Err(SelfLink(from));
            }
        }

        let mut snapshots = match snapshot {
            Some(snapshot) if snapshot.nodes.len() != n => {
                return Err(SnapshotMismatch(snapshot.nodes.len(), n));
            }
            Some(snapshot) => {
                let resume = (snapshot.tick, snapshot.next_tx_id());
                Some((resume, snapshot.nodes.into_iter()))
            }
            None => None,
        };

        let delay = delay.unwrap_or_else(|| Box::new(RegionLatency::default()));
        let observer = observer.unwrap_or_else(|| Arc::new(TracingObserver));
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut built = Vec::with_capacity(n);
        for (i, (desc, power)) in nodes.into_iter().zip(powers).enumerate() {
            let id = NodeId(i + 1);
            let node_seed = rng.gen();
            let delay = dyn_clone::clone_box(&*delay);

            let restored = snapshots
                .as_mut()
                .and_then(|(_, snapshots)| snapshots.next());
            let mut node = match restored {
                Some(snapshot) => {
                    Node::restore(snapshot, power, params, delay, node_seed)
                }
                None => Node::new(
                    id,
                    desc.name,
                    desc.region,
                    power,
                    params,
                    delay,
                    node_seed,
                ),
            }
            .with_observer(observer.clone());

            node.set_difficulty(difficulty);
            built.push(node);
        }

        for (from, to) in links {
            let region = built[to.0 - 1].region();
            built[from.0 - 1].connect(to, region);
        }

        let (tick, next_tx) =
            snapshots.map(|(resume, _)| resume).unwrap_or((0, 0));

        Ok(Simulation::new(built, difficulty, tick, next_tx))
    }
}
