use crate::bus::{ControlEvent, ControlReceiver, ControlSender, open_bus};
use anyhow::{Context as _, Result, anyhow, bail};
use netchar_core::{
    MetricsStore, SegmentAlgorithm, Sessions, TopologyModel, defaults::DEFAULT_RECALCULATION_PERIOD,
};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};
use tracing::{debug, error, info, warn};

/// Receives one committed characteristics update per changed flow:
/// destination, source, throughput (Mbps), latency (ms), jitter (ms)
/// and packet loss (%).
pub type UpdateCallback = Box<dyn Fn(&str, &str, f64, f64, f64, f64) + Send>;

/// Invoked once after a batch of updates, so the enforcement layer can
/// apply them atomically.
pub type ApplyCallback = Box<dyn Fn() + Send>;

/// Drives a [`SegmentAlgorithm`] from a background worker thread.
///
/// The worker recalculates on a fixed period and reacts to control
/// events ([`NetCharManager::controls`]); embedders that already sit on
/// the thread observing the topology can instead call
/// [`NetCharManager::process_active_topology_update`] and get the
/// resulting updates delivered before it returns.
///
/// Creating a manager spawns the worker. Make sure to call
/// [`NetCharManager::shutdown`] for a clean shutdown of the background
/// thread.
pub struct NetCharManager<M, S> {
    inner: Arc<Mutex<Inner<M, S>>>,
    controls: ControlSender,
    worker: Option<thread::JoinHandle<Result<()>>>,
}

struct Inner<M, S> {
    model: Arc<M>,
    algo: SegmentAlgorithm<S>,
    on_update: Option<UpdateCallback>,
    on_apply: Option<ApplyCallback>,
    sessions: Sessions,
    started: bool,
    period: Duration,
    /// Algorithm controls received while stopped, replayed on start.
    pending_controls: Vec<(String, String)>,
}

impl<M, S> NetCharManager<M, S>
where
    M: TopologyModel + Send + Sync + 'static,
    S: MetricsStore + Send + 'static,
{
    pub fn new(model: Arc<M>, metrics: S) -> Self {
        let (controls, receiver) = open_bus();
        let inner = Arc::new(Mutex::new(Inner {
            model,
            algo: SegmentAlgorithm::new(metrics),
            on_update: None,
            on_apply: None,
            sessions: Sessions::default(),
            started: false,
            period: DEFAULT_RECALCULATION_PERIOD,
            pending_controls: Vec::new(),
        }));
        let worker = thread::spawn({
            let inner = Arc::clone(&inner);
            move || run_worker(inner, receiver)
        });
        Self {
            inner,
            controls,
            worker: Some(worker),
        }
    }

    /// Install the enforcement callbacks. Replaces any previous pair.
    pub fn register(
        &self,
        on_update: impl Fn(&str, &str, f64, f64, f64, f64) + Send + 'static,
        on_apply: impl Fn() + Send + 'static,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        inner.on_update = Some(Box::new(on_update));
        inner.on_apply = Some(Box::new(on_apply));
        Ok(())
    }

    /// Begin processing: replay buffered controls, process the topology
    /// and emit the initial characteristics. A no-op while running.
    pub fn start(&self) -> Result<()> {
        self.lock()?.start()
    }

    /// Suspend processing, keeping the derived state. A no-op while
    /// stopped.
    pub fn stop(&self) -> Result<()> {
        self.lock()?.stop();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock().map(|inner| inner.started).unwrap_or(false)
    }

    /// Replace the terminal session table. Takes effect immediately
    /// when running.
    pub fn set_sessions(&self, sessions: Sessions) -> Result<()> {
        let mut inner = self.lock()?;
        inner.sessions = sessions;
        if inner.started {
            inner.refresh_topology()?;
        }
        Ok(())
    }

    /// Apply one named control attribute.
    ///
    /// `"action"` (`"start"`/`"stop"`) and `"recalculationPeriod"`
    /// (milliseconds) address the manager itself; anything else is an
    /// allocator attribute, buffered until start when received while
    /// stopped.
    pub fn set_control_attribute(&self, name: &str, value: &str) -> Result<()> {
        self.lock()?.handle_control(name, value);
        Ok(())
    }

    /// Synchronously reprocess the topology and recalculate.
    ///
    /// The callbacks for any resulting updates run before this returns.
    /// Does nothing while stopped.
    pub fn process_active_topology_update(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.started {
            debug!("ignoring topology update, manager is stopped");
            return Ok(());
        }
        inner.refresh_topology()
    }

    /// A handle for feeding events to the worker from other threads.
    pub fn controls(&self) -> ControlSender {
        self.controls.clone()
    }

    /// Stop the worker thread and wait for it to finish.
    pub fn shutdown(mut self) -> Result<()> {
        // the worker may already be gone if its bus disconnected
        let _ = self.controls.send_shutdown();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error).context("network characteristics worker error"),
            Err(error) => bail!("network characteristics worker panic: {error:?}"),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<M, S>>> {
        self.inner
            .lock()
            .map_err(|error| anyhow!("network characteristics manager poisoned: {error}"))
    }
}

impl<M, S> Inner<M, S>
where
    M: TopologyModel,
    S: MetricsStore,
{
    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        for (name, value) in std::mem::take(&mut self.pending_controls) {
            self.algo.set_attribute(&name, &value);
        }
        self.started = true;
        info!("starting network characteristics updates");
        self.refresh_topology()
    }

    fn stop(&mut self) {
        if self.started {
            self.started = false;
            info!("stopped network characteristics updates");
        }
    }

    fn handle_control(&mut self, name: &str, value: &str) {
        match name {
            "action" => match value {
                "start" => {
                    if let Err(error) = self.start() {
                        error!(%error, "failed to start on control request");
                    }
                }
                "stop" => self.stop(),
                _ => warn!(value, "ignoring unknown action"),
            },
            "recalculationPeriod" => match value.parse::<u64>() {
                Ok(millis) => self.period = Duration::from_millis(millis),
                Err(error) => warn!(%error, value, "ignoring unparsable recalculation period"),
            },
            _ if self.started => self.algo.set_attribute(name, value),
            _ => self
                .pending_controls
                .push((name.to_string(), value.to_string())),
        }
    }

    fn refresh_topology(&mut self) -> Result<()> {
        self.algo.process_scenario(&*self.model, &self.sessions)?;
        self.recalculate();
        Ok(())
    }

    fn recalculate(&mut self) {
        let updates = self.algo.calculate_net_char();
        if updates.is_empty() {
            return;
        }
        debug!(updates = updates.len(), "flow characteristics changed");
        if let Some(on_update) = &self.on_update {
            for update in &updates {
                on_update(
                    &update.dst,
                    &update.src,
                    update.net_char.throughput,
                    update.net_char.latency,
                    update.net_char.jitter,
                    update.net_char.packet_loss,
                );
            }
        }
        if let Some(on_apply) = &self.on_apply {
            on_apply();
        }
    }
}

fn run_worker<M, S>(inner: Arc<Mutex<Inner<M, S>>>, mut receiver: ControlReceiver) -> Result<()>
where
    M: TopologyModel,
    S: MetricsStore,
{
    loop {
        let period = lock(&inner)?.period;
        match receiver.receive_timeout(period) {
            None => {
                let mut inner = lock(&inner)?;
                if inner.started {
                    inner.recalculate();
                }
            }
            Some(ControlEvent::TopologyUpdated) => {
                let mut inner = lock(&inner)?;
                if inner.started {
                    if let Err(error) = inner.refresh_topology() {
                        error!(%error, "failed to process topology update");
                    }
                }
            }
            Some(ControlEvent::ControlsUpdated(attributes)) => {
                let mut inner = lock(&inner)?;
                for (name, value) in attributes {
                    inner.handle_control(&name, &value);
                }
            }
            Some(ControlEvent::Shutdown) | Some(ControlEvent::Disconnected) => return Ok(()),
        }
    }
}

fn lock<'a, M, S>(inner: &'a Arc<Mutex<Inner<M, S>>>) -> Result<MutexGuard<'a, Inner<M, S>>> {
    inner
        .lock()
        .map_err(|error| anyhow!("network characteristics manager poisoned: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netchar_core::{
        ConnectivityMode, HostConfig, InMemoryMetrics, NodeContext, NodeNetChar, StaticTopology,
        Throughput, TopologyNode,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// [`StaticTopology`] behind a lock, so tests can mutate the
    /// scenario a running manager observes.
    struct SharedTopology(Mutex<StaticTopology>);

    impl SharedTopology {
        fn new(topo: StaticTopology) -> Arc<Self> {
            Arc::new(Self(Mutex::new(topo)))
        }

        fn update(&self, change: impl FnOnce(&mut StaticTopology)) {
            change(&mut self.0.lock().unwrap());
        }
    }

    impl TopologyModel for SharedTopology {
        fn scenario_name(&self) -> String {
            self.0.lock().unwrap().scenario_name()
        }

        fn connectivity_mode(&self) -> ConnectivityMode {
            self.0.lock().unwrap().connectivity_mode()
        }

        fn process_names(&self) -> Vec<String> {
            self.0.lock().unwrap().process_names()
        }

        fn node(&self, name: &str) -> Option<TopologyNode> {
            self.0.lock().unwrap().node(name)
        }

        fn context(&self, process: &str) -> Option<NodeContext> {
            self.0.lock().unwrap().context(process)
        }
    }

    #[derive(Default)]
    struct Recorder {
        // (dst, src, throughput)
        updates: Mutex<Vec<(String, String, f64)>>,
        applies: AtomicUsize,
    }

    impl Recorder {
        fn take_updates(&self) -> Vec<(String, String, f64)> {
            std::mem::take(&mut *self.updates.lock().unwrap())
        }

        fn applies(&self) -> usize {
            self.applies.load(Ordering::SeqCst)
        }
    }

    fn mbps(value: f64) -> Throughput {
        Throughput::from_mbps(value)
    }

    /// One zone with an edge server and a terminal behind a 100 Mbps
    /// poa, plus a cloud host. Three processes, six flows.
    fn scenario() -> StaticTopology {
        let mut topo = StaticTopology::new(
            "mgr-ut",
            NodeNetChar::new(10.0, 2.0).with_throughput(mbps(1000.0), mbps(1000.0)),
        );
        topo.add_domain(
            "op",
            NodeNetChar::new(5.0, 1.0).with_throughput(mbps(1000.0), mbps(1000.0)),
        );
        topo.add_zone("z1", "op", NodeNetChar::new(2.0, 1.0));
        topo.add_poa(
            "p1",
            "z1",
            NodeNetChar::new(1.0, 1.0).with_throughput(mbps(100.0), mbps(100.0)),
        );
        topo.add_host(HostConfig::new("edge", NodeNetChar::default()).attached_to_zone("z1"));
        topo.add_host(
            HostConfig::new("ue", NodeNetChar::default())
                .attached_to_poa("p1")
                .wireless(),
        );
        topo.add_host(HostConfig::new("cloud", NodeNetChar::default()));
        topo.add_process("edge-app", "edge", NodeNetChar::default());
        topo.add_process("ue-app", "ue", NodeNetChar::default());
        topo.add_process("cloud-app", "cloud", NodeNetChar::default());
        topo
    }

    type Manager = NetCharManager<SharedTopology, Arc<InMemoryMetrics>>;

    fn manager() -> (Manager, Arc<SharedTopology>, Arc<InMemoryMetrics>, Arc<Recorder>) {
        let topo = SharedTopology::new(scenario());
        let metrics = Arc::new(InMemoryMetrics::new());
        let manager = NetCharManager::new(Arc::clone(&topo), Arc::clone(&metrics));

        let recorder = Arc::new(Recorder::default());
        let updates = Arc::clone(&recorder);
        let applies = Arc::clone(&recorder);
        manager
            .register(
                move |dst, src, throughput, _latency, _jitter, _packet_loss| {
                    updates
                        .updates
                        .lock()
                        .unwrap()
                        .push((dst.to_string(), src.to_string(), throughput));
                },
                move || {
                    applies.applies.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        (manager, topo, metrics, recorder)
    }

    #[test]
    fn start_emits_the_initial_characteristics() {
        let (manager, _topo, _metrics, recorder) = manager();
        assert!(!manager.is_running());

        manager.start().unwrap();
        assert!(manager.is_running());

        let updates = recorder.take_updates();
        assert_eq!(updates.len(), 6);
        assert_eq!(recorder.applies(), 1);
        for (dst, src, throughput) in &updates {
            // flows through the 100 Mbps poa settle lower
            let expected = if dst == "ue-app" || src == "ue-app" { 20.0 } else { 200.0 };
            assert_eq!(*throughput, expected, "{src}:{dst}");
        }

        manager.shutdown().unwrap();
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (manager, _topo, _metrics, recorder) = manager();
        manager.start().unwrap();
        manager.start().unwrap();
        assert_eq!(recorder.applies(), 1);

        manager.stop().unwrap();
        manager.stop().unwrap();
        assert!(!manager.is_running());

        manager.shutdown().unwrap();
    }

    #[test]
    fn unchanged_topology_produces_no_updates() {
        let (manager, _topo, _metrics, recorder) = manager();
        manager.start().unwrap();
        recorder.take_updates();

        manager.process_active_topology_update().unwrap();
        assert!(recorder.take_updates().is_empty());
        assert_eq!(recorder.applies(), 1);

        manager.shutdown().unwrap();
    }

    #[test]
    fn capacity_change_updates_only_the_crossing_flows() {
        let (manager, topo, _metrics, recorder) = manager();
        manager.start().unwrap();
        recorder.take_updates();

        // halve the poa capacity: only the terminal's flows cross it
        topo.update(|t| {
            t.set_node_net_char(
                "p1",
                NodeNetChar::new(1.0, 1.0).with_throughput(mbps(50.0), mbps(50.0)),
            )
        });
        manager.process_active_topology_update().unwrap();

        let updates = recorder.take_updates();
        assert_eq!(updates.len(), 4);
        assert_eq!(recorder.applies(), 2);
        for (dst, src, throughput) in &updates {
            assert!(dst == "ue-app" || src == "ue-app", "{src}:{dst}");
            assert_eq!(*throughput, 10.0);
        }

        manager.shutdown().unwrap();
    }

    #[test]
    fn topology_updates_are_ignored_while_stopped() {
        let (manager, topo, _metrics, recorder) = manager();
        manager.start().unwrap();
        manager.stop().unwrap();
        recorder.take_updates();

        topo.update(|t| {
            t.set_node_net_char(
                "p1",
                NodeNetChar::new(1.0, 1.0).with_throughput(mbps(50.0), mbps(50.0)),
            )
        });
        manager.process_active_topology_update().unwrap();
        assert!(recorder.take_updates().is_empty());

        // restarting picks the change up
        manager.start().unwrap();
        let updates = recorder.take_updates();
        assert_eq!(updates.len(), 4);

        manager.shutdown().unwrap();
    }

    #[test]
    fn controls_are_buffered_until_start() {
        let (manager, _topo, _metrics, recorder) = manager();
        manager.set_control_attribute("isPercentage", "no").unwrap();
        manager.set_control_attribute("maxBwPerInactiveFlow", "2").unwrap();

        manager.start().unwrap();
        let updates = recorder.take_updates();
        assert_eq!(updates.len(), 6);
        for (_, _, throughput) in &updates {
            assert_eq!(*throughput, 2.0);
        }

        manager.shutdown().unwrap();
    }

    #[test]
    fn action_control_starts_and_stops() {
        let (manager, _topo, _metrics, recorder) = manager();
        manager.set_control_attribute("action", "start").unwrap();
        assert!(manager.is_running());
        assert_eq!(recorder.take_updates().len(), 6);

        manager.set_control_attribute("action", "stop").unwrap();
        assert!(!manager.is_running());

        manager.shutdown().unwrap();
    }

    #[test]
    fn periodic_recalculation_follows_the_measurements() {
        let (manager, _topo, metrics, recorder) = manager();
        manager
            .set_control_attribute("recalculationPeriod", "20")
            .unwrap();
        manager.start().unwrap();
        recorder.take_updates();

        // a single active flow gets leveled up to the poa fair share
        metrics.set_throughput("edge-app", "ue-app", 50.0).unwrap();
        thread::sleep(Duration::from_millis(300));

        let updates = recorder.take_updates();
        assert!(
            updates.contains(&("ue-app".to_string(), "edge-app".to_string(), 100.0)),
            "{updates:?}"
        );

        manager.shutdown().unwrap();
    }

    #[test]
    fn bus_events_reach_the_worker() {
        let (manager, topo, _metrics, recorder) = manager();
        manager
            .set_control_attribute("recalculationPeriod", "20")
            .unwrap();
        manager.start().unwrap();
        recorder.take_updates();

        topo.update(|t| {
            t.set_node_net_char(
                "p1",
                NodeNetChar::new(1.0, 1.0).with_throughput(mbps(50.0), mbps(50.0)),
            )
        });
        manager.controls().notify_topology_update().unwrap();
        thread::sleep(Duration::from_millis(300));

        assert_eq!(recorder.take_updates().len(), 4);

        manager.shutdown().unwrap();
    }

    #[test]
    fn shutdown_joins_the_worker() {
        let (manager, _topo, _metrics, _recorder) = manager();
        manager.start().unwrap();
        manager.shutdown().unwrap();
    }
}
