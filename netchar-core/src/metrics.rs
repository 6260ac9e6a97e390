use anyhow::{Result, anyhow};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

/// One measured data point: the throughput recently observed from
/// `source` to `dest`, in Mbps.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    pub source: String,
    pub dest: String,
    pub mbps: f64,
}

/// Access to measured per-flow throughput.
///
/// The engine registers a destination when a flow towards it first
/// appears and deregisters it when the last such flow goes away;
/// between the two, [`MetricsStore::scan`] returns whatever samples the
/// collection backend holds. A scan is a best-effort snapshot: missing
/// samples simply leave the previous measurement in place.
pub trait MetricsStore {
    /// Start collecting throughput for traffic terminating at `dest`.
    fn register(&self, dest: &str) -> Result<()>;

    /// Stop collecting throughput for traffic terminating at `dest`.
    fn deregister(&self, dest: &str) -> Result<()>;

    /// Snapshot every sample currently held.
    fn scan(&self) -> Result<Vec<ThroughputSample>>;
}

impl<S: MetricsStore> MetricsStore for Arc<S> {
    fn register(&self, dest: &str) -> Result<()> {
        (**self).register(dest)
    }

    fn deregister(&self, dest: &str) -> Result<()> {
        (**self).deregister(dest)
    }

    fn scan(&self) -> Result<Vec<ThroughputSample>> {
        (**self).scan()
    }
}

/// A `Mutex`-backed [`MetricsStore`] for tests and embedded probes.
///
/// Measurements are fed in with [`InMemoryMetrics::set_throughput`];
/// values for unregistered destinations are dropped, mirroring a
/// backend that only collects what it was asked to collect.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    // dest -> source -> Mbps
    samples: Mutex<HashMap<String, HashMap<String, f64>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Ignored unless `dest` is registered.
    pub fn set_throughput(&self, source: &str, dest: &str, mbps: f64) -> Result<()> {
        let mut samples = self.lock()?;
        if let Some(sources) = samples.get_mut(dest) {
            sources.insert(source.to_string(), mbps);
        }
        Ok(())
    }

    /// Whether `dest` is currently being collected for.
    pub fn is_registered(&self, dest: &str) -> bool {
        self.lock().map(|s| s.contains_key(dest)).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, HashMap<String, f64>>>> {
        self.samples
            .lock()
            .map_err(|error| anyhow!("metrics store poisoned: {error}"))
    }
}

impl MetricsStore for InMemoryMetrics {
    fn register(&self, dest: &str) -> Result<()> {
        self.lock()?.entry(dest.to_string()).or_default();
        Ok(())
    }

    fn deregister(&self, dest: &str) -> Result<()> {
        self.lock()?.remove(dest);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ThroughputSample>> {
        let samples = self.lock()?;
        let mut out = Vec::new();
        for (dest, sources) in samples.iter() {
            for (source, mbps) in sources.iter() {
                out.push(ThroughputSample {
                    source: source.clone(),
                    dest: dest.clone(),
                    mbps: *mbps,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_measurements_are_dropped() {
        let metrics = InMemoryMetrics::new();
        metrics.set_throughput("a", "b", 100.0).unwrap();
        assert!(metrics.scan().unwrap().is_empty());
    }

    #[test]
    fn registered_measurements_are_returned() {
        let metrics = InMemoryMetrics::new();
        metrics.register("b").unwrap();
        metrics.set_throughput("a", "b", 100.0).unwrap();
        assert_eq!(
            metrics.scan().unwrap(),
            vec![ThroughputSample {
                source: "a".to_string(),
                dest: "b".to_string(),
                mbps: 100.0,
            }]
        );
    }

    #[test]
    fn deregister_drops_samples() {
        let metrics = InMemoryMetrics::new();
        metrics.register("b").unwrap();
        metrics.set_throughput("a", "b", 100.0).unwrap();
        metrics.deregister("b").unwrap();
        assert!(!metrics.is_registered("b"));
        assert!(metrics.scan().unwrap().is_empty());
    }

    #[test]
    fn latest_measurement_wins() {
        let metrics = InMemoryMetrics::new();
        metrics.register("b").unwrap();
        metrics.set_throughput("a", "b", 100.0).unwrap();
        metrics.set_throughput("a", "b", 250.0).unwrap();
        let samples = metrics.scan().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].mbps, 250.0);
    }
}
