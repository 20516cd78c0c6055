//! Regions and the delay models used to turn a message into transit time.

use std::{collections::HashMap, fmt::Debug};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Geographic region a node is located in.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    #[default]
    NorthAmerica,
    SouthAmerica,
    Europe,
    Asia,
    Africa,
    Oceania,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::NorthAmerica,
        Region::SouthAmerica,
        Region::Europe,
        Region::Asia,
        Region::Africa,
        Region::Oceania,
    ];
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NorthAmerica => "north-america",
            Self::SouthAmerica => "south-america",
            Self::Europe => "europe",
            Self::Asia => "asia",
            Self::Africa => "africa",
            Self::Oceania => "oceania",
        };

        write!(f, "{}", name)
    }
}

/// Maps a message of `size` bytes travelling from `origin` to `destination`
/// to its transit time in seconds.
///
/// Called once per outbound message, with the sending node's random number
/// generator so that randomized models stay reproducible under a fixed seed.
pub trait DelayModel: Debug + dyn_clone::DynClone + Send + Sync {
    fn delay(
        &self,
        origin: Region,
        destination: Region,
        size: u64,
        rng: &mut dyn RngCore,
    ) -> f64;
}

dyn_clone::clone_trait_object!(DelayModel);

/// Every message takes the same time to arrive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantDelay(pub f64);

impl DelayModel for ConstantDelay {
    fn delay(&self, _: Region, _: Region, _: u64, _: &mut dyn RngCore) -> f64 {
        self.0
    }
}

/// Delay made of a per-region-pair latency plus transmission time over a
/// link of fixed bandwidth, optionally scaled by uniform jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionLatency {
    /// One-way latency in seconds, keyed by unordered region pair.
    latency: HashMap<(Region, Region), f64>,
    /// Latency used for pairs missing from `latency`.
    default_latency: f64,
    /// Link bandwidth in bytes per second.
    bandwidth: f64,
    /// Delays are multiplied by a factor drawn from `1.0 ± jitter`.
    jitter: f64,
}

impl RegionLatency {
    /// Bandwidth assumed by [RegionLatency::default], 5 MB/s.
    pub const DEFAULT_BANDWIDTH: f64 = 5_000_000.0;

    pub fn new(default_latency: f64, bandwidth: f64) -> Self {
        RegionLatency {
            latency: HashMap::new(),
            default_latency,
            bandwidth,
            jitter: 0.0,
        }
    }

    /// Sets the latency between two regions, in either direction.
    pub fn with_latency(mut self, a: Region, b: Region, seconds: f64) -> Self {
        self.latency.insert(Self::key(a, b), seconds);

        self
    }

    /// Sets the relative jitter applied to every delay.
    ///
    /// ## Panics
    /// Panics if `jitter` is not in `0.0..1.0`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&jitter),
            "jitter {} is not in the range 0.0..1.0",
            jitter
        );
        self.jitter = jitter;

        self
    }

    fn key(a: Region, b: Region) -> (Region, Region) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn latency(&self, a: Region, b: Region) -> f64 {
        self.latency
            .get(&Self::key(a, b))
            .copied()
            .unwrap_or(self.default_latency)
    }
}

impl Default for RegionLatency {
    /// Rough one-way latencies between continents.
    fn default() -> Self {
        use Region::*;

        let mut model = Self::new(0.15, Self::DEFAULT_BANDWIDTH);
        for region in Region::ALL {
            model = model.with_latency(region, region, 0.02);
        }

        model
            .with_latency(NorthAmerica, Europe, 0.045)
            .with_latency(NorthAmerica, SouthAmerica, 0.07)
            .with_latency(NorthAmerica, Asia, 0.09)
            .with_latency(NorthAmerica, Oceania, 0.08)
            .with_latency(Europe, Asia, 0.1)
            .with_latency(Europe, Africa, 0.07)
    }
}

impl DelayModel for RegionLatency {
    fn delay(
        &self,
        origin: Region,
        destination: Region,
        size: u64,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let base =
            self.latency(origin, destination) + size as f64 / self.bandwidth;

        if self.jitter > 0.0 {
            base * rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::{DelayModel, Region, RegionLatency};

    #[test]
    fn region_latency_is_symmetric() {
        let model = RegionLatency::new(1.0, 1_000.0)
            .with_latency(Region::Asia, Region::Europe, 0.5);
        let mut rng = StdRng::seed_from_u64(0);

        let there = model.delay(Region::Europe, Region::Asia, 500, &mut rng);
        let back = model.delay(Region::Asia, Region::Europe, 500, &mut rng);
        assert_eq!(there, 1.0);
        assert_eq!(there, back);

        let other = model.delay(Region::Africa, Region::Asia, 0, &mut rng);
        assert_eq!(other, 1.0);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let model = RegionLatency::new(1.0, f64::INFINITY).with_jitter(0.2);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let d = model.delay(Region::Europe, Region::Asia, 10, &mut rng);
            assert!((0.8..=1.2).contains(&d));
        }
    }
}
