use crate::measure::Throughput;
use std::{fmt, str::FromStr};

/// Statistical distribution applied to a flow's latency by the
/// enforcement layer.
///
/// The control plane only carries the tag; shaping the actual delay
/// samples is the data plane's business.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// Normal distribution around the configured latency (default).
    #[default]
    Normal,
    Pareto,
    Paretonormal,
    Uniform,
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Normal => write!(f, "normal"),
            Distribution::Pareto => write!(f, "pareto"),
            Distribution::Paretonormal => write!(f, "paretonormal"),
            Distribution::Uniform => write!(f, "uniform"),
        }
    }
}

impl FromStr for Distribution {
    type Err = DistributionParseError;

    /// Parses a distribution name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Distribution::Normal),
            "pareto" => Ok(Distribution::Pareto),
            "paretonormal" => Ok(Distribution::Paretonormal),
            "uniform" => Ok(Distribution::Uniform),
            _ => Err(DistributionParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing a [`Distribution`] from a string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown latency distribution: {0}")]
pub struct DistributionParseError(String);

/// The characteristics applied to a single traffic flow.
///
/// This is what the control plane hands to the enforcement layer:
/// end-to-end values, already composed over every segment the flow
/// crosses.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NetChar {
    /// One-way latency, in milliseconds.
    pub latency: f64,
    /// Latency variation, in milliseconds.
    pub jitter: f64,
    /// Packet loss, as a percentage in `[0, 100]`.
    pub packet_loss: f64,
    /// Allocated throughput, in Mbps.
    pub throughput: f64,
    /// Distribution applied to the latency.
    pub distribution: Distribution,
}

/// The characteristics configured on a single topology node.
///
/// Latency, jitter and packet loss apply to both directions; the
/// throughput ceiling is split per direction.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NodeNetChar {
    /// One-way latency contributed by this node, in milliseconds.
    pub latency: f64,
    /// Latency variation contributed by this node, in milliseconds.
    pub jitter: f64,
    /// Packet loss contributed by this node, as a percentage.
    pub packet_loss: f64,
    /// Uplink capacity; zero means unset.
    pub throughput_ul: Throughput,
    /// Downlink capacity; zero means unset.
    pub throughput_dl: Throughput,
    /// Distribution applied to the latency.
    pub distribution: Distribution,
}

impl NodeNetChar {
    /// create node characteristics with the given latency and jitter,
    /// everything else left unset
    pub fn new(latency: f64, jitter: f64) -> Self {
        Self {
            latency,
            jitter,
            ..Self::default()
        }
    }

    pub fn with_throughput(mut self, ul: Throughput, dl: Throughput) -> Self {
        self.throughput_ul = ul;
        self.throughput_dl = dl;
        self
    }

    pub fn with_packet_loss(mut self, percent: f64) -> Self {
        self.packet_loss = percent;
        self
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }
}

/// Composes the packet loss of two links crossed in sequence, both
/// expressed as percentages.
///
/// Drops are treated as independent events: a packet survives the
/// combination only if it survives both links.
///
/// ```
/// # use netchar_core::measure::compose_packet_loss;
/// assert_eq!(compose_packet_loss(0.0, 5.0), 5.0);
/// assert_eq!(compose_packet_loss(50.0, 50.0), 75.0);
/// assert_eq!(compose_packet_loss(100.0, 5.0), 100.0);
/// ```
pub fn compose_packet_loss(acc: f64, next: f64) -> f64 {
    if acc == 0.0 {
        next
    } else {
        acc + next * (100.0 - acc) / 100.0
    }
}
