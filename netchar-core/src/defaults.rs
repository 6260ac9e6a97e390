use crate::measure::Throughput;
use std::time::Duration;

/// Default link [`Throughput`]
///
/// Applied wherever a node's configured ceiling is left unset (zero):
/// both when resolving a segment's capacity and when computing a flow's
/// end-to-end ceiling.
///
/// ```
/// # use netchar_core::defaults::*;
/// assert_eq!(
///     DEFAULT_LINK_THROUGHPUT.to_string(),
///     "1gbps"
/// );
/// ```
///
pub const DEFAULT_LINK_THROUGHPUT: Throughput = Throughput::from_mbps(1000.0);

/// Default bandwidth granted to a flow with no measurable activity.
///
/// A percentage of the segment capacity when the allocator runs in
/// percentage mode, otherwise a value in Mbps.
pub const DEFAULT_MAX_BW_PER_INACTIVE_FLOW: f64 = 20.0;

/// Lowest bandwidth an inactive flow can be granted, in Mbps.
///
/// Keeps the inactive allocation usable on very small segments, where
/// the percentage of the capacity would round down to almost nothing.
pub const DEFAULT_MAX_BW_PER_INACTIVE_FLOW_FLOOR: f64 = 6.0;

/// Measured throughput below this value counts as inactive.
pub const DEFAULT_MIN_ACTIVITY_THRESHOLD: f64 = 0.3;

/// Allocation growth granted to an active flow per recalculation.
pub const DEFAULT_INCREMENTAL_STEP: f64 = 3.0;

/// Upper hysteresis bound granted to an inactive flow.
pub const DEFAULT_INACTIVITY_INCREMENTAL_STEP: f64 = 1.0;

/// Width of the hysteresis band below the upper bound.
pub const DEFAULT_TOLERATION_THRESHOLD: f64 = 4.0;

/// Margin between a planned allocation and its upper hysteresis bound.
pub const DEFAULT_ACTION_UPPER_THRESHOLD: f64 = 1.0;

/// Default period between two recalculations of the control loop.
pub const DEFAULT_RECALCULATION_PERIOD: Duration = Duration::from_millis(500);
