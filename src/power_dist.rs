//! Describing distributions of mining power

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Numeric type used to represent mining power.
pub type PowerValue = f64;

/// Determines how mining power is distributed between the nodes of a
/// simulation. Each node's share multiplied by the difficulty gives its
/// probability of mining a block in one tick.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerDistribution {
    /// Weight each node equally.
    #[default]
    Equal,
    /// Set the specified node's power to some value between `0.0` and `1.0`
    /// inclusive, with mining power distributed equally between all other
    /// nodes.
    SetNode(NodeId, PowerValue),
    /// Set all mining power values to those in the given vector, in order of
    /// node ID.
    SetValues(Vec<PowerValue>),
}

#[derive(Debug, thiserror::Error)]
pub enum PowerDistributionError {
    #[error("distribution values sum to {0}, not 1.0")]
    BadDistributionSum(PowerValue),
    #[error("power value {0} is not in the range 0.0..=1.0")]
    BadPowerValue(PowerValue),
    #[error("cannot set power for the genesis node (NodeId 0)")]
    SetNodeGenesisNode,
    #[error("cannot set power for invalid NodeId {0}")]
    SetNodeBadNodeId(NodeId),
    #[error("cannot set power for a single node")]
    SetNodeSingleNode,
    #[error("power distribution size {0} does not match node count {1}")]
    WrongNumNodes(usize, usize),
    #[error("cannot create a distribution for zero nodes")]
    ZeroNodesGiven,
}

impl PowerDistribution {
    /// Allowable difference between a distribution sum and 1.0.
    const EPSILON_POWER: PowerValue = 1e-6;

    /// Returns true if the discrete distribution described by this
    /// [`PowerDistribution`] is valid over `num_nodes`.
    #[inline]
    pub fn is_valid(&self, num_nodes: usize) -> bool {
        self.validate(num_nodes).is_ok()
    }

    /// Checks if the discrete distribution described by this
    /// [`PowerDistribution`] is valid over `num_nodes`.
    pub fn validate(
        &self,
        num_nodes: usize,
    ) -> Result<(), PowerDistributionError> {
        use PowerDistributionError::*;

        if num_nodes == 0 {
            return Err(ZeroNodesGiven);
        }

        match &self {
            Self::Equal => Ok(()),
            Self::SetValues(dist) => {
                if dist.len() != num_nodes {
                    return Err(WrongNumNodes(dist.len(), num_nodes));
                }

                if let Some(&val) = dist
                    .iter()
                    .find(|&x| x.is_nan() || !(0.0..=1.0).contains(x))
                {
                    return Err(BadPowerValue(val));
                }

                let sum = dist.iter().sum();
                if PowerValue::abs(sum - 1.0) > Self::EPSILON_POWER {
                    return Err(BadDistributionSum(sum));
                }

                Ok(())
            }
            Self::SetNode(node_id, power) => {
                if num_nodes == 1 {
                    return Err(SetNodeSingleNode);
                }

                let node_id = *node_id;

                if node_id.0 == 0 {
                    return Err(SetNodeGenesisNode);
                }

                if node_id.0 > num_nodes {
                    return Err(SetNodeBadNodeId(node_id));
                }

                let power = *power;
                if power.is_nan() || !(0.0..=1.0).contains(&power) {
                    return Err(BadPowerValue(power));
                }

                Ok(())
            }
        }
    }

    /// Returns the power values described by this power distribution as a
    /// vector indexed by node ID minus one. Returns a
    /// [`PowerDistributionError`] if the underlying distribution is invalid
    /// over `num_nodes`.
    pub fn values(
        &self,
        num_nodes: usize,
    ) -> Result<Vec<PowerValue>, PowerDistributionError> {
        self.validate(num_nodes)?;

        let values = match &self {
            Self::Equal => vec![1.0 / num_nodes as PowerValue; num_nodes],
            Self::SetValues(dist) => dist.clone(),
            Self::SetNode(node_id, power) => {
                let other = (1.0 - power) / (num_nodes - 1) as PowerValue;

                let mut dist = vec![other; num_nodes];
                dist[node_id.0 - 1] = *power;

                dist
            }
        };

        Ok(values)
    }
}
