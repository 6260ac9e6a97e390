mod static_model;

pub use self::static_model::{Attachment, HostConfig, StaticTopology};

use crate::measure::NodeNetChar;
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

/// How endpoint reachability is decided when deriving paths.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    /// Every pair of connected hosts can exchange traffic (default).
    #[default]
    Open,
    /// Wireless hosts additionally need an active session on the
    /// data network their peer is served by. See [`Sessions`].
    SessionBased,
}

/// The role of a node in the scenario hierarchy.
///
/// The hierarchy runs scenario → domain → zone → poa → host → process;
/// hosts may also hang directly off a zone (wired edge servers) or sit
/// outside every domain (cloud).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scenario,
    Domain,
    Zone,
    Poa,
    Host,
    Process,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Scenario => write!(f, "scenario"),
            NodeKind::Domain => write!(f, "domain"),
            NodeKind::Zone => write!(f, "zone"),
            NodeKind::Poa => write!(f, "poa"),
            NodeKind::Host => write!(f, "host"),
            NodeKind::Process => write!(f, "process"),
        }
    }
}

/// A data network a host is served by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNetwork {
    pub name: String,
    /// Local-only data networks are reachable exclusively from within
    /// the zone they are deployed in.
    pub local_only: bool,
}

/// Host-specific attributes, present on [`NodeKind::Host`] nodes only.
#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    /// Reaches the network over a radio poa.
    pub wireless: bool,
    /// A disconnected host loses all traffic to and from it.
    pub connected: bool,
    /// The data network this host is served by, if any.
    pub data_network: Option<DataNetwork>,
}

/// A node resolved from the active topology.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyNode {
    pub kind: NodeKind,
    pub net_char: NodeNetChar,
    /// Present only on [`NodeKind::Host`] nodes.
    pub host: Option<HostInfo>,
}

/// Where a process sits in the hierarchy.
///
/// Cloud hosts have no zone and no domain; only poa-attached hosts
/// carry a poa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    pub host: String,
    pub poa: Option<String>,
    pub zone: Option<String>,
    pub domain: Option<String>,
}

/// Active sessions, per host: the set of data-network names the host
/// currently holds a session on.
///
/// Only consulted in [`ConnectivityMode::SessionBased`].
pub type Sessions = HashMap<String, HashSet<String>>;

/// Read access to the active scenario topology.
///
/// The engine never mutates the topology; it resolves names and
/// ancestry on every rebuild so that the model stays the single source
/// of truth.
pub trait TopologyModel {
    /// Name of the active scenario. Empty when no scenario is deployed,
    /// in which case the engine drops all derived state.
    fn scenario_name(&self) -> String;

    fn connectivity_mode(&self) -> ConnectivityMode;

    /// Names of every process in the scenario, in a stable order.
    fn process_names(&self) -> Vec<String>;

    /// Look up a node by name.
    fn node(&self, name: &str) -> Option<TopologyNode>;

    /// Resolve the ancestry of a process.
    fn context(&self, process: &str) -> Option<NodeContext>;
}
