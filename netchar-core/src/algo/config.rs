use crate::{defaults, measure::Throughput};
use tracing::{debug, warn};

/// Tuning knobs for the fair-share allocator.
///
/// In percentage mode (the default) every value except
/// `max_bw_per_inactive_flow_floor` is a percentage of the capacity of
/// the segment it is applied to; otherwise the values are absolute
/// Mbps. The floor is always absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgoConfig {
    /// Bandwidth granted to a flow with no measurable activity.
    pub max_bw_per_inactive_flow: f64,
    /// Lowest bandwidth an inactive flow can be granted, in Mbps.
    pub max_bw_per_inactive_flow_floor: f64,
    /// Measured throughput below this value counts as inactive.
    pub min_activity_threshold: f64,
    /// Allocation growth granted to an active flow per recalculation.
    pub incremental_step: f64,
    /// Upper hysteresis bound granted to an inactive flow.
    pub inactivity_incremental_step: f64,
    /// Width of the hysteresis band below the upper bound.
    pub toleration_threshold: f64,
    /// Margin between a planned allocation and its upper bound.
    pub action_upper_threshold: f64,
    /// Interpret the values above as percentages of segment capacity.
    pub is_percentage: bool,
    /// Dump per-flow allocation state on every recalculation.
    pub log_verbose: bool,
}

impl Default for AlgoConfig {
    fn default() -> Self {
        Self {
            max_bw_per_inactive_flow: defaults::DEFAULT_MAX_BW_PER_INACTIVE_FLOW,
            max_bw_per_inactive_flow_floor: defaults::DEFAULT_MAX_BW_PER_INACTIVE_FLOW_FLOOR,
            min_activity_threshold: defaults::DEFAULT_MIN_ACTIVITY_THRESHOLD,
            incremental_step: defaults::DEFAULT_INCREMENTAL_STEP,
            inactivity_incremental_step: defaults::DEFAULT_INACTIVITY_INCREMENTAL_STEP,
            toleration_threshold: defaults::DEFAULT_TOLERATION_THRESHOLD,
            action_upper_threshold: defaults::DEFAULT_ACTION_UPPER_THRESHOLD,
            is_percentage: true,
            log_verbose: false,
        }
    }
}

impl AlgoConfig {
    /// Apply one named attribute.
    ///
    /// Numeric attributes accept anything [`Throughput`] parses
    /// (`"3"`, `"500kbps"`, ...); boolean attributes use `"yes"`/`"no"`.
    /// Unknown names and unparsable values are logged and ignored, so a
    /// bad control update can never wedge the allocator.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match name {
            "maxBwPerInactiveFlow" => set_value(&mut self.max_bw_per_inactive_flow, name, value),
            "maxBwPerInactiveFlowFloor" => {
                set_value(&mut self.max_bw_per_inactive_flow_floor, name, value)
            }
            "minActivityThreshold" => set_value(&mut self.min_activity_threshold, name, value),
            "incrementalStep" => set_value(&mut self.incremental_step, name, value),
            "inactivityIncrementalStep" => {
                set_value(&mut self.inactivity_incremental_step, name, value)
            }
            "tolerationThreshold" => set_value(&mut self.toleration_threshold, name, value),
            "actionUpperThreshold" => set_value(&mut self.action_upper_threshold, name, value),
            "isPercentage" => self.is_percentage = value == "yes",
            "logVerbose" => self.log_verbose = value == "yes",
            _ => debug!(name, value, "ignoring unknown allocator attribute"),
        }
    }
}

fn set_value(field: &mut f64, name: &str, value: &str) {
    match value.parse::<Throughput>() {
        Ok(parsed) => *field = parsed.mbps(),
        Err(error) => warn!(%error, name, value, "ignoring unparsable allocator attribute"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AlgoConfig::default();
        assert_eq!(config.max_bw_per_inactive_flow, 20.0);
        assert_eq!(config.max_bw_per_inactive_flow_floor, 6.0);
        assert_eq!(config.min_activity_threshold, 0.3);
        assert_eq!(config.incremental_step, 3.0);
        assert_eq!(config.inactivity_incremental_step, 1.0);
        assert_eq!(config.toleration_threshold, 4.0);
        assert_eq!(config.action_upper_threshold, 1.0);
        assert!(config.is_percentage);
        assert!(!config.log_verbose);
    }

    #[test]
    fn set_numeric_attribute() {
        let mut config = AlgoConfig::default();
        config.set_attribute("incrementalStep", "5");
        assert_eq!(config.incremental_step, 5.0);
        config.set_attribute("maxBwPerInactiveFlow", "12.5");
        assert_eq!(config.max_bw_per_inactive_flow, 12.5);
    }

    #[test]
    fn set_boolean_attribute() {
        let mut config = AlgoConfig::default();
        config.set_attribute("isPercentage", "no");
        assert!(!config.is_percentage);
        config.set_attribute("isPercentage", "yes");
        assert!(config.is_percentage);
        config.set_attribute("logVerbose", "yes");
        assert!(config.log_verbose);
    }

    #[test]
    fn bad_attributes_are_ignored() {
        let mut config = AlgoConfig::default();
        config.set_attribute("incrementalStep", "not-a-number");
        assert_eq!(config.incremental_step, 3.0);
        config.set_attribute("noSuchAttribute", "42");
        assert_eq!(config, AlgoConfig::default());
    }
}
