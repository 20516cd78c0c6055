//! Describing a simulated network in TOML
//!
//! ```toml
//! seed = 7
//! ticks = 3600
//! difficulty = 0.0016
//!
//! [delay]
//! kind = "constant"
//! seconds = 0.25
//!
//! [[nodes]]
//! name = "miner-eu"
//! region = "europe"
//! power = 0.6
//!
//! [[nodes]]
//! name = "miner-asia"
//! region = "asia"
//! power = 0.4
//!
//! [[links]]
//! from = "miner-eu"
//! to = "miner-asia"
//! ```
//!
//! When no links are given, every pair of nodes is connected. A top-level
//! `power_dist` such as `power_dist = "equal"` or
//! `power_dist = { set-node = [1, 0.4] }` replaces the per-node `power`
//! values, which may then be left out.

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    network::{ConstantDelay, Region, RegionLatency},
    node::{NodeId, ProtocolParams},
    power_dist::{PowerDistribution, PowerValue},
    simulation::{SimulationBuildError, SimulationBuilder, Workload},
};

/// A simulated network and how long to run it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for every random choice. Drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Number of ticks to run.
    #[serde(default = "default_ticks")]
    pub ticks: u64,

    #[serde(default = "default_difficulty")]
    pub difficulty: f64,

    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: f64,

    #[serde(default = "default_max_block_size")]
    pub max_block_size: u64,

    #[serde(default = "default_header_size")]
    pub header_size: u64,

    /// Overrides the `power` of every node.
    #[serde(default)]
    pub power_dist: Option<PowerDistribution>,

    #[serde(default)]
    pub delay: DelayConfig,

    pub nodes: Vec<NodeConfig>,

    /// Links by node name. Empty means fully connected.
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    #[serde(default)]
    pub workload: Workload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub region: Region,
    #[serde(default)]
    pub power: PowerValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: String,
    pub to: String,
    /// Open the link from `from` to `to` only.
    #[serde(default)]
    pub one_way: bool,
}

/// Delay model shared by every link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DelayConfig {
    /// A fixed number of seconds per message.
    Constant { seconds: f64 },
    /// [`RegionLatency::default`], optionally with jitter.
    Region {
        #[serde(default)]
        jitter: f64,
    },
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig::Region { jitter: 0.0 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("link refers to unknown node \"{0}\"")]
    UnknownNodeName(String),
    #[error("node name \"{0}\" is used more than once")]
    DuplicateNodeName(String),
    #[error("constant delay of {0} seconds is negative or not finite")]
    BadDelay(f64),
    #[error("delay jitter {0} is not in the range 0.0..1.0")]
    BadJitter(f64),
    #[error("invalid simulation")]
    Build(#[from] SimulationBuildError),
}

fn default_ticks() -> u64 {
    3_600
}

fn default_difficulty() -> f64 {
    SimulationBuilder::DEFAULT_DIFFICULTY
}

fn default_tick_seconds() -> f64 {
    ProtocolParams::default().tick_seconds
}

fn default_max_block_size() -> u64 {
    ProtocolParams::default().max_block_size
}

fn default_header_size() -> u64 {
    ProtocolParams::default().header_size
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Creates a [`SimulationBuilder`] for the configured network. Node IDs
    /// follow the order of `nodes`.
    pub fn builder(&self) -> Result<SimulationBuilder, ConfigError> {
        let mut ids = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if ids.insert(node.name.as_str(), NodeId(i + 1)).is_some() {
                return Err(ConfigError::DuplicateNodeName(node.name.clone()));
            }
        }
        let id_of = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownNodeName(name.to_string()))
        };

        let mut builder = SimulationBuilder::new()
            .difficulty(self.difficulty)
            .tick_seconds(self.tick_seconds)
            .max_block_size(self.max_block_size)
            .header_size(self.header_size);

        builder = match self.delay {
            DelayConfig::Constant { seconds } => {
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(ConfigError::BadDelay(seconds));
                }
                builder.delay_model(ConstantDelay(seconds))
            }
            DelayConfig::Region { jitter } => {
                if !(0.0..1.0).contains(&jitter) {
                    return Err(ConfigError::BadJitter(jitter));
                }
                let model = RegionLatency::default().with_jitter(jitter);
                builder.delay_model(model)
            }
        };

        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(dist) = &self.power_dist {
            builder = builder.power_dist(dist.clone());
        }

        for node in self.nodes.iter() {
            builder =
                builder.add_node(node.name.as_str(), node.region, node.power);
        }

        if self.links.is_empty() {
            builder = builder.fully_connected();
        }
        for link in self.links.iter() {
            let (from, to) = (id_of(&link.from)?, id_of(&link.to)?);
            builder = if link.one_way {
                builder.connect_one_way(from, to)
            } else {
                builder.connect(from, to)
            };
        }

        Ok(builder)
    }
}

impl Default for SimulationConfig {
    /// Four equally powerful miners on different continents.
    fn default() -> Self {
        let nodes = [
            ("na", Region::NorthAmerica),
            ("eu", Region::Europe),
            ("asia", Region::Asia),
            ("oceania", Region::Oceania),
        ]
        .into_iter()
        .map(|(name, region)| NodeConfig {
            name: name.to_string(),
            region,
            power: 0.25,
        })
        .collect();

        Self {
            seed: None,
            ticks: default_ticks(),
            difficulty: default_difficulty(),
            tick_seconds: default_tick_seconds(),
            max_block_size: default_max_block_size(),
            header_size: default_header_size(),
            power_dist: None,
            delay: DelayConfig::default(),
            nodes,
            links: Vec::new(),
            workload: Workload {
                arrival_probability: 0.1,
                min_fee: 1,
                max_fee: 100,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_NODES: &str = r#"
        seed = 7
        difficulty = 0.01

        [[nodes]]
        name = "a"
        region = "europe"
        power = 0.6

        [[nodes]]
        name = "b"
        region = "north-america"
        power = 0.4
    "#;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = SimulationConfig::from_toml_str(TWO_NODES).unwrap();

        assert_eq!(config.seed, Some(7));
        assert_eq!(config.ticks, 3_600);
        assert_eq!(config.header_size, 80);
        assert_eq!(config.delay, DelayConfig::Region { jitter: 0.0 });
        assert_eq!(config.nodes[1].region, Region::NorthAmerica);
        assert_eq!(config.workload, Workload::default());
    }

    #[test]
    fn no_links_means_full_mesh() {
        let config = SimulationConfig::from_toml_str(TWO_NODES).unwrap();
        let sim = config.builder().unwrap().build().unwrap();

        assert_eq!(sim.nodes()[0].peers().collect::<Vec<_>>(), vec![2.into()]);
        assert_eq!(sim.nodes()[1].peers().collect::<Vec<_>>(), vec![1.into()]);
        assert_eq!(sim.difficulty(), 0.01);
    }

    #[test]
    fn links_by_name() {
        let toml = format!(
            r#"{TWO_NODES}
            [[nodes]]
            name = "c"
            region = "asia"
            power = 0.0

            [[links]]
            from = "a"
            to = "c"
            one_way = true

            [delay]
            kind = "constant"
            seconds = 1.5
            "#
        );
        let config = SimulationConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.delay, DelayConfig::Constant { seconds: 1.5 });

        let sim = config.builder().unwrap().build().unwrap();
        assert_eq!(sim.nodes()[0].peers().collect::<Vec<_>>(), vec![3.into()]);
        assert_eq!(sim.nodes()[1].peers().count(), 0);
        assert_eq!(sim.nodes()[2].peers().count(), 0);
    }

    #[test]
    fn bad_configs_rejected() {
        let unknown = format!(
            "{TWO_NODES}\n[[links]]\nfrom = \"a\"\nto = \"z\"\n"
        );
        assert!(matches!(
            SimulationConfig::from_toml_str(&unknown).unwrap().builder(),
            Err(ConfigError::UnknownNodeName(name)) if name == "z"
        ));

        assert!(matches!(
            SimulationConfig::from_toml_str("nodes = 3"),
            Err(ConfigError::Parse(_))
        ));

        let mut config = SimulationConfig::default();
        config.nodes[1].name = "na".to_string();
        assert!(matches!(
            config.builder(),
            Err(ConfigError::DuplicateNodeName(_))
        ));

        let config = SimulationConfig {
            delay: DelayConfig::Region { jitter: 1.5 },
            ..Default::default()
        };
        assert!(matches!(config.builder(), Err(ConfigError::BadJitter(_))));

        for seconds in [-0.5, f64::NAN, f64::INFINITY] {
            let config = SimulationConfig {
                delay: DelayConfig::Constant { seconds },
                ..Default::default()
            };
            assert!(matches!(config.builder(), Err(ConfigError::BadDelay(_))));
        }
    }

    #[test]
    fn power_dist_replaces_node_power() {
        let toml = r#"
            power_dist = { set-node = [2, 0.7] }

            [[nodes]]
            name = "a"
            region = "europe"

            [[nodes]]
            name = "b"
            region = "asia"

            [[nodes]]
            name = "c"
            region = "asia"
        "#;
        let config = SimulationConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.power_dist,
            Some(PowerDistribution::SetNode(2.into(), 0.7))
        );

        let sim = config.builder().unwrap().build().unwrap();
        let powers: Vec<_> = sim.nodes().iter().map(|n| n.power()).collect();
        assert_eq!(powers[1], 0.7);
        assert!((powers[0] - 0.15).abs() < 1e-9);
        assert!((powers[2] - 0.15).abs() < 1e-9);

        let equal = toml.replace("{ set-node = [2, 0.7] }", "\"equal\"");
        let sim = SimulationConfig::from_toml_str(&equal)
            .unwrap()
            .builder()
            .unwrap()
            .build()
            .unwrap();
        for node in sim.nodes() {
            assert!((node.power() - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = SimulationConfig::default();
        let text = toml::to_string(&config).unwrap();

        assert_eq!(SimulationConfig::from_toml_str(&text).unwrap(), config);
    }
}
