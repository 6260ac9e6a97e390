use super::{
    SegmentAlgorithm,
    elem::{Flow, FlowNetChar, Segment, flow_name},
};
use crate::{measure::compose_packet_loss, metrics::MetricsStore};
use std::collections::HashMap;
use tracing::{error, info, trace};

/// Runs one full recalculation pass and returns the flows whose
/// characteristics changed.
pub(super) fn calculate<S: MetricsStore>(algo: &mut SegmentAlgorithm<S>) -> Vec<FlowNetChar> {
    match algo.metrics.scan() {
        Ok(samples) => {
            for sample in samples {
                if let Some(flow) = algo
                    .flows
                    .get_mut(&flow_name(&sample.source, &sample.dest))
                {
                    flow.current_throughput = sample.mbps;
                }
            }
        }
        Err(error) => {
            error!(%error, "throughput scan failed, skipping recalculation");
            return Vec::new();
        }
    }

    reset_computed(&mut algo.flows);

    for segment in algo.segments.values_mut() {
        update_fair_share(segment, &algo.flows);

        let (unused_bw, stale) = flows_to_reevaluate(segment, &algo.flows);
        if !stale.is_empty() {
            if algo.config.log_verbose {
                info!(
                    segment = %segment.name,
                    unused_bw,
                    flows = ?stale,
                    "segment reevaluation"
                );
            }
            reallocate(segment, &mut algo.flows, &stale, unused_bw);
        }

        accumulate_path_characteristics(segment, &mut algo.flows);
    }

    commit(algo)
}

fn reset_computed(flows: &mut HashMap<String, Flow>) {
    for flow in flows.values_mut() {
        flow.max_planned_throughput = f64::INFINITY;
        flow.max_planned_lower = f64::INFINITY;
        flow.max_planned_upper = f64::INFINITY;
        flow.computed_latency = 0.0;
        flow.computed_jitter = 0.0;
        // an unreachable endpoint drowns everything the path would add
        flow.computed_packet_loss = if flow.path.disconnected { 100.0 } else { 0.0 };
    }
}

fn update_fair_share(segment: &mut Segment, flows: &HashMap<String, Flow>) {
    let active = segment
        .flows
        .iter()
        .filter_map(|name| flows.get(name))
        .filter(|flow| flow.current_throughput >= segment.min_activity_threshold)
        .count();
    segment.max_fair_share_per_flow = if active >= 1 {
        segment.throughput / active as f64
    } else {
        f64::INFINITY
    };
}

/// Splits the segment's flows into the ones that keep their allocation
/// and the ones that must be reallocated, returning the bandwidth not
/// claimed by the former.
fn flows_to_reevaluate(segment: &Segment, flows: &HashMap<String, Flow>) -> (f64, Vec<String>) {
    let mut unused_bw = segment.throughput;
    let mut stale = Vec::new();
    for name in &segment.flows {
        let Some(flow) = flows.get(name) else {
            continue;
        };
        let out_of_band = flow.current_throughput < flow.allocated_lower
            || flow.current_throughput > flow.allocated_upper;
        if out_of_band
            || flow.current_throughput >= segment.max_fair_share_per_flow
            || flow.update_required
        {
            stale.push(name.clone());
        } else if flow.current_throughput >= segment.min_activity_threshold {
            // settled and active: its share stays claimed
            unused_bw -= flow.allocated_throughput;
        }
    }
    (unused_bw, stale)
}

/// Redistributes the segment capacity over the stale flows.
///
/// Three passes: flows comfortably under the fair share first, then
/// flows pegged at the fair share but measured below it, then flows
/// running at or above it which split the leftover evenly. If a
/// meaningful residual remains after that, every active flow is leveled
/// up to the fair share with a collapsed hysteresis band, so the next
/// pass reevaluates them again.
fn reallocate(segment: &Segment, flows: &mut HashMap<String, Flow>, stale: &[String], mut unused_bw: f64) {
    let fair_share = segment.max_fair_share_per_flow;
    let mut pegged = stale.len();

    for name in stale {
        let Some(flow) = flows.get_mut(name) else {
            continue;
        };
        if flow.current_throughput + segment.incremental_step > fair_share {
            // pegged: leveled out by the passes below
            flow.planned_throughput = fair_share;
            continue;
        }
        if flow.current_throughput <= segment.min_activity_threshold {
            flow.planned_throughput = segment.max_bw_per_inactive_flow;
            flow.planned_upper = segment.inactivity_incremental_step;
            flow.planned_lower = 0.0;
        } else {
            flow.planned_throughput = (flow.current_throughput + segment.incremental_step)
                .min(flow.configured_throughput);
            flow.planned_upper = flow.planned_throughput - segment.action_upper_threshold;
            flow.planned_lower = (flow.planned_upper - segment.toleration_threshold)
                .max(segment.min_activity_threshold);
        }
        pegged -= 1;
        if flow.planned_throughput != segment.max_bw_per_inactive_flow {
            unused_bw -= flow.planned_throughput;
        }
    }

    if pegged > 0 {
        for name in stale {
            let Some(flow) = flows.get_mut(name) else {
                continue;
            };
            if flow.planned_throughput != fair_share || flow.current_throughput >= fair_share {
                continue;
            }
            pegged -= 1;
            if pegged == 0 {
                // the last one absorbs whatever is left on the segment
                flow.planned_throughput = unused_bw.min(flow.configured_throughput);
                flow.planned_upper = flow.planned_throughput;
            } else {
                flow.planned_throughput = (flow.current_throughput + segment.incremental_step)
                    .min(flow.configured_throughput);
                flow.planned_upper = flow.planned_throughput - segment.action_upper_threshold;
            }
            flow.planned_lower = (flow.planned_upper - segment.toleration_threshold)
                .max(segment.min_activity_threshold);
            unused_bw -= flow.planned_throughput;
        }

        if pegged > 0 {
            let extra = (unused_bw - pegged as f64 * fair_share) / pegged as f64;
            for name in stale {
                let Some(flow) = flows.get_mut(name) else {
                    continue;
                };
                if flow.planned_throughput != fair_share
                    || flow.current_throughput < fair_share
                {
                    continue;
                }
                flow.planned_throughput = (fair_share + extra).min(flow.configured_throughput);
                flow.planned_upper = flow.planned_throughput - segment.action_upper_threshold;
                flow.planned_lower = flow.planned_upper - segment.toleration_threshold;
                unused_bw -= flow.planned_throughput;
            }
        }
    }

    // saturate any meaningful residual: grant every active flow the
    // full fair share and collapse its band so it is looked at again
    if unused_bw >= 1.0 {
        for name in stale {
            let Some(flow) = flows.get_mut(name) else {
                continue;
            };
            if flow.current_throughput > segment.min_activity_threshold {
                flow.planned_throughput = fair_share.min(flow.configured_throughput);
                flow.planned_lower = 0.0;
                flow.planned_upper = 0.0;
            }
        }
    }

    // fold into the bottleneck: a flow is granted the smallest plan any
    // of its segments came up with
    for name in stale {
        let Some(flow) = flows.get_mut(name) else {
            continue;
        };
        if flow.planned_throughput < flow.max_planned_throughput {
            flow.max_planned_throughput = flow.planned_throughput;
            flow.max_planned_lower = flow.planned_lower;
            flow.max_planned_upper = flow.planned_upper;
        }
    }
}

/// Latency, jitter and packet loss add up over every crossed segment.
fn accumulate_path_characteristics(segment: &Segment, flows: &mut HashMap<String, Flow>) {
    for name in &segment.flows {
        let Some(flow) = flows.get_mut(name) else {
            continue;
        };
        flow.computed_latency += segment.latency;
        flow.computed_jitter += segment.jitter;
        flow.computed_packet_loss =
            compose_packet_loss(flow.computed_packet_loss, segment.packet_loss);
    }
}

/// Commits the recalculated values and collects the deltas.
fn commit<S: MetricsStore>(algo: &mut SegmentAlgorithm<S>) -> Vec<FlowNetChar> {
    let verbose = algo.config.log_verbose;
    let mut updated = Vec::new();

    for flow in algo.flows.values_mut() {
        let mut update_needed = false;

        if flow.max_planned_throughput != flow.allocated_throughput
            && flow.max_planned_throughput.is_finite()
        {
            if flow.max_planned_throughput <= 0.0 {
                error!(
                    flow = %flow.name,
                    planned = flow.max_planned_throughput,
                    "planned throughput must be positive, keeping previous allocation"
                );
            } else {
                if verbose {
                    info!(
                        flow = %flow.name,
                        from = flow.allocated_throughput,
                        to = flow.max_planned_throughput,
                        "updating allocated bandwidth"
                    );
                }
                flow.allocated_throughput = flow.max_planned_throughput;
                flow.allocated_lower = flow.max_planned_lower;
                flow.allocated_upper = flow.max_planned_upper;
                flow.applied.throughput = flow.allocated_throughput;
                update_needed = true;
            }
        }

        if flow.computed_latency != flow.applied.latency
            || flow.computed_jitter != flow.applied.jitter
            || flow.computed_packet_loss != flow.applied.packet_loss
            || flow.distribution != flow.applied.distribution
        {
            flow.applied.latency = flow.computed_latency;
            flow.applied.jitter = flow.computed_jitter;
            flow.applied.packet_loss = flow.computed_packet_loss;
            flow.applied.distribution = flow.distribution;
            update_needed = true;
        }

        // the reroute flag is consumed by the pass that just ran
        flow.update_required = false;

        if update_needed {
            trace!(flow = %flow.name, net_char = ?flow.applied, "flow characteristics changed");
            updated.push(FlowNetChar {
                src: flow.src.clone(),
                dst: flow.dst.clone(),
                net_char: flow.applied,
            });
        }
    }

    updated
}
