use super::{
    ConnectivityMode, DataNetwork, HostInfo, NodeContext, NodeKind, TopologyModel, TopologyNode,
};
use crate::measure::NodeNetChar;
use std::collections::HashMap;

/// An in-memory [`TopologyModel`] assembled programmatically.
///
/// Used by tests, benches and embedders that build scenarios in code
/// rather than reading them from an external store.
///
/// # Example
///
/// ```
/// use netchar_core::{HostConfig, NodeNetChar, StaticTopology, Throughput};
///
/// let mbps = Throughput::from_mbps;
/// let mut topo = StaticTopology::new("demo", NodeNetChar::new(50.0, 5.0));
/// topo.add_domain("operator1", NodeNetChar::new(15.0, 3.0));
/// topo.add_zone("zone1", "operator1", NodeNetChar::new(5.0, 1.0));
/// topo.add_poa(
///     "zone1-poa1",
///     "zone1",
///     NodeNetChar::new(1.0, 1.0).with_throughput(mbps(100.0), mbps(100.0)),
/// );
/// topo.add_host(
///     HostConfig::new("ue1", NodeNetChar::default())
///         .attached_to_poa("zone1-poa1")
///         .wireless(),
/// );
/// topo.add_process("ue1-app", "ue1", NodeNetChar::default());
/// ```
#[derive(Debug, Default)]
pub struct StaticTopology {
    scenario: String,
    mode: ConnectivityMode,
    nodes: HashMap<String, Entry>,
    processes: Vec<String>,
}

#[derive(Debug)]
struct Entry {
    kind: NodeKind,
    net_char: NodeNetChar,
    host: Option<HostInfo>,
    parent: Option<String>,
}

/// What a host hangs off of.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// Radio or terminal access through a poa.
    Poa(String),
    /// Wired access within a zone (edge servers).
    Zone(String),
    /// Cloud or data-center host, outside every domain.
    Cloud,
}

/// Describes a host added to a [`StaticTopology`].
///
/// Hosts default to wired, connected, cloud-attached and without a
/// data network.
#[derive(Debug)]
pub struct HostConfig {
    name: String,
    net_char: NodeNetChar,
    attachment: Attachment,
    wireless: bool,
    connected: bool,
    data_network: Option<DataNetwork>,
}

impl HostConfig {
    pub fn new(name: &str, net_char: NodeNetChar) -> Self {
        Self {
            name: name.to_string(),
            net_char,
            attachment: Attachment::Cloud,
            wireless: false,
            connected: true,
            data_network: None,
        }
    }

    pub fn attached_to_poa(mut self, poa: &str) -> Self {
        self.attachment = Attachment::Poa(poa.to_string());
        self
    }

    pub fn attached_to_zone(mut self, zone: &str) -> Self {
        self.attachment = Attachment::Zone(zone.to_string());
        self
    }

    pub fn wireless(mut self) -> Self {
        self.wireless = true;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn data_network(mut self, name: &str, local_only: bool) -> Self {
        self.data_network = Some(DataNetwork {
            name: name.to_string(),
            local_only,
        });
        self
    }
}

impl StaticTopology {
    /// create a topology for the named scenario
    ///
    /// `net_char` configures the scenario's inter-domain interconnect.
    pub fn new(scenario: &str, net_char: NodeNetChar) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            scenario.to_string(),
            Entry {
                kind: NodeKind::Scenario,
                net_char,
                host: None,
                parent: None,
            },
        );
        Self {
            scenario: scenario.to_string(),
            mode: ConnectivityMode::default(),
            nodes,
            processes: Vec::new(),
        }
    }

    pub fn set_connectivity_mode(&mut self, mode: ConnectivityMode) {
        self.mode = mode;
    }

    pub fn add_domain(&mut self, name: &str, net_char: NodeNetChar) {
        self.insert(name, NodeKind::Domain, net_char, None, None);
    }

    pub fn add_zone(&mut self, name: &str, domain: &str, net_char: NodeNetChar) {
        self.insert(name, NodeKind::Zone, net_char, None, Some(domain.to_string()));
    }

    pub fn add_poa(&mut self, name: &str, zone: &str, net_char: NodeNetChar) {
        self.insert(name, NodeKind::Poa, net_char, None, Some(zone.to_string()));
    }

    pub fn add_host(&mut self, host: HostConfig) {
        let parent = match &host.attachment {
            Attachment::Poa(poa) => Some(poa.clone()),
            Attachment::Zone(zone) => Some(zone.clone()),
            Attachment::Cloud => None,
        };
        let info = HostInfo {
            wireless: host.wireless,
            connected: host.connected,
            data_network: host.data_network,
        };
        self.insert(&host.name, NodeKind::Host, host.net_char, Some(info), parent);
    }

    pub fn add_process(&mut self, name: &str, host: &str, net_char: NodeNetChar) {
        self.insert(name, NodeKind::Process, net_char, None, Some(host.to_string()));
        self.processes.push(name.to_string());
    }

    /// Re-attach a host to another poa (terminal mobility).
    pub fn move_host(&mut self, host: &str, poa: &str) {
        if let Some(entry) = self.nodes.get_mut(host) {
            entry.parent = Some(poa.to_string());
        }
    }

    /// Connect or disconnect a host from the network.
    pub fn set_connected(&mut self, host: &str, connected: bool) {
        if let Some(info) = self.nodes.get_mut(host).and_then(|e| e.host.as_mut()) {
            info.connected = connected;
        }
    }

    /// Replace the characteristics configured on a node.
    pub fn set_node_net_char(&mut self, name: &str, net_char: NodeNetChar) {
        if let Some(entry) = self.nodes.get_mut(name) {
            entry.net_char = net_char;
        }
    }

    /// Tear the scenario down, leaving no active topology.
    pub fn clear(&mut self) {
        self.scenario.clear();
        self.nodes.clear();
        self.processes.clear();
    }

    fn insert(
        &mut self,
        name: &str,
        kind: NodeKind,
        net_char: NodeNetChar,
        host: Option<HostInfo>,
        parent: Option<String>,
    ) {
        self.nodes.insert(
            name.to_string(),
            Entry {
                kind,
                net_char,
                host,
                parent,
            },
        );
    }
}

impl TopologyModel for StaticTopology {
    fn scenario_name(&self) -> String {
        self.scenario.clone()
    }

    fn connectivity_mode(&self) -> ConnectivityMode {
        self.mode
    }

    fn process_names(&self) -> Vec<String> {
        self.processes.clone()
    }

    fn node(&self, name: &str) -> Option<TopologyNode> {
        self.nodes.get(name).map(|entry| TopologyNode {
            kind: entry.kind,
            net_char: entry.net_char,
            host: entry.host.clone(),
        })
    }

    fn context(&self, process: &str) -> Option<NodeContext> {
        let entry = self.nodes.get(process)?;
        if entry.kind != NodeKind::Process {
            return None;
        }
        let host = entry.parent.clone()?;

        let mut poa = None;
        let mut zone = None;
        let mut domain = None;
        let mut parent = self.nodes.get(&host).and_then(|e| e.parent.clone());
        while let Some(name) = parent {
            let Some(node) = self.nodes.get(&name) else {
                break;
            };
            parent = node.parent.clone();
            match node.kind {
                NodeKind::Poa => poa = Some(name),
                NodeKind::Zone => zone = Some(name),
                NodeKind::Domain => domain = Some(name),
                _ => break,
            }
        }

        Some(NodeContext {
            host,
            poa,
            zone,
            domain,
        })
    }
}
