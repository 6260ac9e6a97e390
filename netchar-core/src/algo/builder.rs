use super::{
    ScenarioError, SegmentAlgorithm,
    config::AlgoConfig,
    elem::{Flow, Path, Segment, flow_name},
};
use crate::{
    defaults::DEFAULT_LINK_THROUGHPUT,
    measure::NodeNetChar,
    metrics::MetricsStore,
    topology::{ConnectivityMode, DataNetwork, NodeKind, Sessions, TopologyModel},
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// One endpoint of a flow, with its ancestry resolved once per rebuild.
struct NetElem {
    name: String,
    net_char: NodeNetChar,
    host: String,
    poa: Option<String>,
    zone: Option<String>,
    domain: Option<String>,
    wireless: bool,
    connected: bool,
    data_network: Option<DataNetwork>,
}

#[derive(Clone, Copy)]
enum Direction {
    Uplink,
    Downlink,
}

impl Direction {
    fn suffix(self) -> &'static str {
        match self {
            Direction::Uplink => "uplink",
            Direction::Downlink => "downlink",
        }
    }

    fn capacity(self, net_char: &NodeNetChar) -> f64 {
        let configured = match self {
            Direction::Uplink => net_char.throughput_ul,
            Direction::Downlink => net_char.throughput_dl,
        };
        configured.or(DEFAULT_LINK_THROUGHPUT).mbps()
    }
}

/// Rebuilds the flow and segment maps from the active topology.
///
/// Keeps the allocation state of surviving flows and flags the ones
/// whose path or crossed capacities changed so the next recalculation
/// reevaluates them.
pub(super) fn rebuild<S: MetricsStore>(
    algo: &mut SegmentAlgorithm<S>,
    model: &impl TopologyModel,
    sessions: &Sessions,
) -> Result<(), ScenarioError> {
    let scenario = model.scenario_name();
    let previous_dests = collect_dests(&algo.flows);

    if scenario.is_empty() {
        for dest in &previous_dests {
            if let Err(error) = algo.metrics.deregister(dest) {
                warn!(%error, dest, "failed to stop throughput collection");
            }
        }
        algo.flows.clear();
        algo.segments.clear();
        debug!("no active scenario, dropped all flows and segments");
        return Ok(());
    }

    let elems = resolve_elements(model)?;
    let mode = model.connectivity_mode();

    // stage the rebuild into fresh maps: a resolution failure below
    // must leave the previous flows and segments in place, so the next
    // trigger can retry against a consistent graph
    let mut flows = HashMap::with_capacity(elems.len() * elems.len());
    let mut segments = HashMap::new();

    for src in &elems {
        for dst in &elems {
            if src.name == dst.name {
                continue;
            }

            let path = trace_path(
                &mut segments,
                &algo.config,
                model,
                &scenario,
                mode,
                sessions,
                src,
                dst,
            )?;

            let name = flow_name(&src.name, &dst.name);
            let ceiling = src
                .net_char
                .throughput_ul
                .or(DEFAULT_LINK_THROUGHPUT)
                .mbps()
                .min(dst.net_char.throughput_dl.or(DEFAULT_LINK_THROUGHPUT).mbps());

            // surviving flows keep their allocation state
            let mut flow = algo.flows.get(&name).cloned().unwrap_or_else(|| {
                Flow::new(&src.name, &dst.name, ceiling, src.net_char.distribution)
            });
            flow.configured_throughput = ceiling;
            flow.distribution = src.net_char.distribution;
            flow.path = path;
            flows.insert(name, flow);
        }
    }

    // a capacity or characteristics change on a segment forces a
    // reevaluation of every flow crossing it
    let changed: HashSet<&str> = segments
        .iter()
        .filter(|(name, segment)| {
            algo.segments.get(*name).is_some_and(|old| {
                (old.throughput, old.latency, old.jitter, old.packet_loss)
                    != (
                        segment.throughput,
                        segment.latency,
                        segment.jitter,
                        segment.packet_loss,
                    )
            })
        })
        .map(|(name, _)| name.as_str())
        .collect();

    for (name, flow) in flows.iter_mut() {
        let rerouted = algo
            .flows
            .get(name)
            .map_or(true, |old| old.path.segments != flow.path.segments);
        flow.update_required = flow.update_required
            || rerouted
            || flow
                .path
                .segments
                .iter()
                .any(|segment| changed.contains(segment.as_str()));
    }

    algo.flows = flows;
    algo.segments = segments;

    // keep the collection backend in sync with the destinations in use
    let dests = collect_dests(&algo.flows);
    for dest in dests.difference(&previous_dests) {
        if let Err(error) = algo.metrics.register(dest) {
            warn!(%error, dest, "failed to start throughput collection");
        }
    }
    for dest in previous_dests.difference(&dests) {
        if let Err(error) = algo.metrics.deregister(dest) {
            warn!(%error, dest, "failed to stop throughput collection");
        }
    }

    debug!(
        flows = algo.flows.len(),
        segments = algo.segments.len(),
        "scenario processed"
    );
    Ok(())
}

fn collect_dests(flows: &HashMap<String, Flow>) -> HashSet<String> {
    flows.values().map(|flow| flow.dst.clone()).collect()
}

fn resolve_elements(model: &impl TopologyModel) -> Result<Vec<NetElem>, ScenarioError> {
    let mut elems = Vec::new();
    for name in model.process_names() {
        let node = model
            .node(&name)
            .ok_or_else(|| ScenarioError::UnknownNode(name.clone()))?;
        if node.kind != NodeKind::Process {
            return Err(ScenarioError::UnexpectedKind {
                name,
                expected: NodeKind::Process,
                found: node.kind,
            });
        }
        let context = model
            .context(&name)
            .ok_or_else(|| ScenarioError::MissingContext(name.clone()))?;
        let host_node = model
            .node(&context.host)
            .ok_or_else(|| ScenarioError::UnknownNode(context.host.clone()))?;
        if host_node.kind != NodeKind::Host {
            return Err(ScenarioError::UnexpectedKind {
                name: context.host,
                expected: NodeKind::Host,
                found: host_node.kind,
            });
        }
        let info = host_node
            .host
            .ok_or_else(|| ScenarioError::MissingContext(name.clone()))?;

        elems.push(NetElem {
            name,
            net_char: node.net_char,
            host: context.host,
            poa: context.poa,
            zone: context.zone,
            domain: context.domain,
            wireless: info.wireless,
            connected: info.connected,
            data_network: info.data_network,
        });
    }
    Ok(elems)
}

/// Walks the hierarchy from both endpoints towards the scenario root,
/// materialising one segment per crossed element and direction, and
/// stopping at the first level the endpoints share.
#[allow(clippy::too_many_arguments)]
fn trace_path(
    segments: &mut HashMap<String, Segment>,
    config: &AlgoConfig,
    model: &impl TopologyModel,
    scenario: &str,
    mode: ConnectivityMode,
    sessions: &Sessions,
    src: &NetElem,
    dst: &NetElem,
) -> Result<Path, ScenarioError> {
    let flow = flow_name(&src.name, &dst.name);
    let mut path = Path::default();

    let cross = |segments: &mut HashMap<String, Segment>,
                     path: &mut Path,
                     node: &str,
                     direction: Direction|
     -> Result<(), ScenarioError> {
        let segment_name = format!("{node}-{}", direction.suffix());
        add_segment(segments, config, model, path, node, segment_name, direction, &flow)
    };

    // application and host levels are always crossed
    cross(segments, &mut path, &src.name, Direction::Uplink)?;
    cross(segments, &mut path, &dst.name, Direction::Downlink)?;
    cross(segments, &mut path, &src.host, Direction::Uplink)?;
    cross(segments, &mut path, &dst.host, Direction::Downlink)?;
    if src.host == dst.host {
        return Ok(path);
    }

    path.disconnected = is_disconnected(src, dst, mode, sessions);

    // only wireless hosts cross their poa's radio link
    if src.wireless {
        if let Some(poa) = &src.poa {
            cross(segments, &mut path, poa, Direction::Uplink)?;
        }
    }
    if dst.wireless {
        if let Some(poa) = &dst.poa {
            cross(segments, &mut path, poa, Direction::Downlink)?;
        }
    }
    if let (Some(a), Some(b)) = (&src.poa, &dst.poa) {
        if a == b && !a.is_empty() {
            return Ok(path);
        }
    }

    if let Some(zone) = &src.zone {
        cross(segments, &mut path, zone, Direction::Uplink)?;
    }
    if let Some(zone) = &dst.zone {
        cross(segments, &mut path, zone, Direction::Downlink)?;
    }
    if let (Some(a), Some(b)) = (&src.zone, &dst.zone) {
        if a == b {
            return Ok(path);
        }
    }

    if let Some(domain) = &src.domain {
        cross(segments, &mut path, domain, Direction::Uplink)?;
    }
    if let Some(domain) = &dst.domain {
        cross(segments, &mut path, domain, Direction::Downlink)?;
    }
    if let (Some(a), Some(b)) = (&src.domain, &dst.domain) {
        if a == b {
            return Ok(path);
        }
    }

    // traffic between domains crosses the scenario interconnect
    for direction in [Direction::Uplink, Direction::Downlink] {
        let segment_name = format!("{scenario}-interdomain-{}", direction.suffix());
        add_segment(
            segments,
            config,
            model,
            &mut path,
            scenario,
            segment_name,
            direction,
            &flow,
        )?;
    }

    Ok(path)
}

#[allow(clippy::too_many_arguments)]
fn add_segment(
    segments: &mut HashMap<String, Segment>,
    config: &AlgoConfig,
    model: &impl TopologyModel,
    path: &mut Path,
    node: &str,
    segment_name: String,
    direction: Direction,
    flow: &str,
) -> Result<(), ScenarioError> {
    if let Some(segment) = segments.get_mut(&segment_name) {
        segment.flows.push(flow.to_string());
        path.segments.push(segment_name);
        return Ok(());
    }

    let found = model
        .node(node)
        .ok_or_else(|| ScenarioError::UnknownNode(node.to_string()))?;
    let mut segment = new_segment(segment_name.clone(), &found.net_char, direction, config);
    segment.flows.push(flow.to_string());
    segments.insert(segment_name.clone(), segment);
    path.segments.push(segment_name);
    Ok(())
}

fn new_segment(
    name: String,
    net_char: &NodeNetChar,
    direction: Direction,
    config: &AlgoConfig,
) -> Segment {
    let throughput = direction.capacity(net_char);
    let derive = |value: f64| {
        if config.is_percentage {
            value * throughput / 100.0
        } else {
            value
        }
    };
    // the inactive allocation never goes below the absolute floor
    let max_bw_per_inactive_flow = if config.is_percentage {
        derive(config.max_bw_per_inactive_flow).max(config.max_bw_per_inactive_flow_floor)
    } else {
        config.max_bw_per_inactive_flow
    };

    Segment {
        name,
        throughput,
        latency: net_char.latency,
        jitter: net_char.jitter,
        packet_loss: net_char.packet_loss,
        flows: Vec::new(),
        max_fair_share_per_flow: f64::INFINITY,
        max_bw_per_inactive_flow,
        min_activity_threshold: derive(config.min_activity_threshold),
        incremental_step: derive(config.incremental_step),
        inactivity_incremental_step: derive(config.inactivity_incremental_step),
        toleration_threshold: derive(config.toleration_threshold),
        action_upper_threshold: derive(config.action_upper_threshold),
    }
}

/// Whether traffic between the two endpoints is possible at all.
fn is_disconnected(
    src: &NetElem,
    dst: &NetElem,
    mode: ConnectivityMode,
    sessions: &Sessions,
) -> bool {
    if !src.connected || !dst.connected {
        return true;
    }
    if mode == ConnectivityMode::SessionBased {
        for (terminal, peer) in [(src, dst), (dst, src)] {
            if !terminal.wireless {
                continue;
            }
            // a wireless terminal needs an active session on the data
            // network serving its peer
            let Some(data_network) = &peer.data_network else {
                return true;
            };
            let has_session = sessions
                .get(&terminal.host)
                .is_some_and(|names| names.contains(&data_network.name));
            if !has_session {
                return true;
            }
            // local-only data networks never leave their zone
            if data_network.local_only && terminal.zone != peer.zone {
                return true;
            }
        }
    }
    false
}
