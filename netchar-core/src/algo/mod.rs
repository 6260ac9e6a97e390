mod builder;
mod config;
mod elem;
mod fair_share;

pub use self::{
    config::AlgoConfig,
    elem::{Flow, FlowNetChar, Path, Segment, flow_name},
};

use crate::{
    metrics::MetricsStore,
    topology::{NodeKind, Sessions, TopologyModel},
};
use std::collections::HashMap;

/// Errors raised while deriving flows and segments from a topology.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScenarioError {
    /// A name referenced by the scenario does not resolve to any node.
    #[error("unknown topology node: {0}")]
    UnknownNode(String),
    /// A node resolved to the wrong kind for the place it is used in.
    #[error("node {name} is a {found}, expected a {expected}")]
    UnexpectedKind {
        name: String,
        expected: NodeKind,
        found: NodeKind,
    },
    /// A process has no resolvable ancestry.
    #[error("missing ancestry for process: {0}")]
    MissingContext(String),
}

/// The fair-share bandwidth allocation engine.
///
/// Owns two derived maps: one [`Flow`] per ordered pair of processes
/// and one [`Segment`] per crossed element and direction.
/// [`SegmentAlgorithm::process_scenario`] rebuilds both from a
/// [`TopologyModel`]; [`SegmentAlgorithm::calculate_net_char`] then
/// redistributes each segment's capacity over its flows based on the
/// latest measurements and returns the flows whose characteristics
/// changed.
///
/// All state is owned by the instance: independent engines can coexist
/// in one process.
///
/// # Example
///
/// ```
/// use netchar_core::{
///     HostConfig, InMemoryMetrics, NodeNetChar, SegmentAlgorithm, Sessions, StaticTopology,
/// };
///
/// let mut topo = StaticTopology::new("demo", NodeNetChar::default());
/// topo.add_host(HostConfig::new("server", NodeNetChar::default()));
/// topo.add_host(HostConfig::new("client", NodeNetChar::default()));
/// topo.add_process("server-app", "server", NodeNetChar::default());
/// topo.add_process("client-app", "client", NodeNetChar::default());
///
/// let mut algo = SegmentAlgorithm::new(InMemoryMetrics::new());
/// algo.process_scenario(&topo, &Sessions::default()).unwrap();
/// assert_eq!(algo.flows().len(), 2);
///
/// let updated = algo.calculate_net_char();
/// assert_eq!(updated.len(), 2);
/// ```
pub struct SegmentAlgorithm<S> {
    flows: HashMap<String, Flow>,
    segments: HashMap<String, Segment>,
    config: AlgoConfig,
    metrics: S,
}

impl<S: MetricsStore> SegmentAlgorithm<S> {
    /// create an engine with the default configuration
    pub fn new(metrics: S) -> Self {
        Self::with_config(AlgoConfig::default(), metrics)
    }

    pub fn with_config(config: AlgoConfig, metrics: S) -> Self {
        Self {
            flows: HashMap::new(),
            segments: HashMap::new(),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &AlgoConfig {
        &self.config
    }

    /// Update a single configuration attribute by name.
    ///
    /// Takes effect on the next [`SegmentAlgorithm::process_scenario`]
    /// for the per-segment derived parameters.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.config.set_attribute(name, value);
    }

    /// The current flow map, keyed by `"<src>:<dst>"`.
    pub fn flows(&self) -> &HashMap<String, Flow> {
        &self.flows
    }

    /// The current segment map, keyed by segment name.
    pub fn segments(&self) -> &HashMap<String, Segment> {
        &self.segments
    }

    /// Rebuild flows and segments from the active topology.
    ///
    /// Surviving flows keep their allocation; flows whose path changed,
    /// or which cross a segment whose configuration changed, are
    /// flagged for reevaluation. Destinations appearing or disappearing
    /// are registered with, or removed from, the metrics store. An
    /// empty scenario name tears all derived state down.
    ///
    /// # Errors
    ///
    /// Fails without touching the previous state only when the topology
    /// is inconsistent (unresolvable names, wrong node kinds).
    pub fn process_scenario(
        &mut self,
        model: &impl TopologyModel,
        sessions: &Sessions,
    ) -> Result<(), ScenarioError> {
        builder::rebuild(self, model, sessions)
    }

    /// Run one allocation pass against the latest measurements.
    ///
    /// Returns one entry per flow whose applied characteristics
    /// changed; an empty list means the network is in its steady state.
    pub fn calculate_net_char(&mut self) -> Vec<FlowNetChar> {
        fair_share::calculate(self)
    }
}
