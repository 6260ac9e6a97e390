use crate::measure::{Distribution, NetChar};

/// A per-flow characteristics update, ready to hand to an enforcement
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNetChar {
    pub src: String,
    pub dst: String,
    pub net_char: NetChar,
}

/// The ordered segments a flow's traffic crosses, by segment name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub segments: Vec<String>,
    /// The endpoints cannot reach each other; forces 100% packet loss.
    pub disconnected: bool,
}

/// A unidirectional traffic relationship between two processes.
///
/// Keyed by `"<src>:<dst>"` in the flow map. The allocation fields fall
/// in three groups: the committed allocation and its hysteresis band
/// (`allocated_*`), the candidate values a recalculation folds over the
/// path (`planned_*` per segment, `max_planned_*` as the running
/// bottleneck minimum), and the additively composed path
/// characteristics (`computed_*`).
#[derive(Debug, Clone)]
pub struct Flow {
    pub name: String,
    pub src: String,
    pub dst: String,
    /// End-to-end throughput ceiling from the endpoint configuration,
    /// in Mbps.
    pub configured_throughput: f64,
    /// Latency distribution configured on the source endpoint.
    pub distribution: Distribution,
    pub path: Path,

    /// Last measured throughput, in Mbps.
    pub current_throughput: f64,

    pub allocated_throughput: f64,
    pub allocated_lower: f64,
    pub allocated_upper: f64,

    pub(crate) planned_throughput: f64,
    pub(crate) planned_lower: f64,
    pub(crate) planned_upper: f64,
    pub(crate) max_planned_throughput: f64,
    pub(crate) max_planned_lower: f64,
    pub(crate) max_planned_upper: f64,

    pub computed_latency: f64,
    pub computed_jitter: f64,
    pub computed_packet_loss: f64,

    /// Last characteristics handed out for this flow.
    pub applied: NetChar,
    /// Forces the next recalculation to reevaluate this flow.
    pub update_required: bool,
}

impl Flow {
    pub(crate) fn new(
        src: &str,
        dst: &str,
        configured_throughput: f64,
        distribution: Distribution,
    ) -> Self {
        Self {
            name: flow_name(src, dst),
            src: src.to_string(),
            dst: dst.to_string(),
            configured_throughput,
            distribution,
            path: Path::default(),
            current_throughput: 0.0,
            allocated_throughput: 0.0,
            allocated_lower: 0.0,
            allocated_upper: 0.0,
            planned_throughput: 0.0,
            planned_lower: 0.0,
            planned_upper: 0.0,
            max_planned_throughput: f64::INFINITY,
            max_planned_lower: f64::INFINITY,
            max_planned_upper: f64::INFINITY,
            computed_latency: 0.0,
            computed_jitter: 0.0,
            computed_packet_loss: 0.0,
            applied: NetChar::default(),
            update_required: true,
        }
    }
}

/// Canonical flow key: `"<src>:<dst>"`.
pub fn flow_name(src: &str, dst: &str) -> String {
    format!("{src}:{dst}")
}

/// One direction of one network element, shared by every flow whose
/// path crosses it.
///
/// The allocation parameters are resolved against the segment capacity
/// at creation time (see [`AlgoConfig`]), so the allocator never has to
/// look at the configuration again while recalculating.
///
/// [`AlgoConfig`]: super::AlgoConfig
#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    /// Configured capacity, in Mbps.
    pub throughput: f64,
    pub latency: f64,
    pub jitter: f64,
    pub packet_loss: f64,
    /// Names of the flows crossing this segment, in creation order.
    pub flows: Vec<String>,

    /// Capacity divided by the number of active flows; infinite while
    /// no flow is active.
    pub(crate) max_fair_share_per_flow: f64,
    pub(crate) max_bw_per_inactive_flow: f64,
    pub(crate) min_activity_threshold: f64,
    pub(crate) incremental_step: f64,
    pub(crate) inactivity_incremental_step: f64,
    pub(crate) toleration_threshold: f64,
    pub(crate) action_upper_threshold: f64,
}
