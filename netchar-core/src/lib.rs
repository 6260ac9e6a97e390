pub mod algo;
pub mod defaults;
pub mod measure;
pub mod metrics;
pub mod topology;

pub use self::{
    algo::{AlgoConfig, Flow, FlowNetChar, Path, ScenarioError, Segment, SegmentAlgorithm},
    measure::{Distribution, NetChar, NodeNetChar, Throughput, compose_packet_loss},
    metrics::{InMemoryMetrics, MetricsStore, ThroughputSample},
    topology::{
        Attachment, ConnectivityMode, DataNetwork, HostConfig, HostInfo, NodeContext, NodeKind,
        Sessions, StaticTopology, TopologyModel, TopologyNode,
    },
};
