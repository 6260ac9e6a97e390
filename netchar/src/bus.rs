use anyhow::{Result, anyhow};
use std::{sync::mpsc, time::Duration};

/// Events accepted by the manager's worker thread.
pub enum ControlEvent {
    /// The active topology changed; rebuild flows and segments.
    TopologyUpdated,
    /// Named control attributes changed.
    ControlsUpdated(Vec<(String, String)>),
    Shutdown,
    Disconnected,
}

/// Cloneable handle feeding events to a running manager.
pub struct ControlSender {
    sender: mpsc::Sender<ControlEvent>,
}

pub(crate) struct ControlReceiver {
    receiver: mpsc::Receiver<ControlEvent>,
}

pub(crate) fn open_bus() -> (ControlSender, ControlReceiver) {
    let (sender, receiver) = mpsc::channel();
    (
        ControlSender { sender },
        ControlReceiver { receiver },
    )
}

impl ControlSender {
    /// Ask the manager to reprocess the topology and recalculate.
    pub fn notify_topology_update(&self) -> Result<()> {
        self.send(ControlEvent::TopologyUpdated)
    }

    /// Hand a batch of control attribute updates to the manager.
    pub fn update_controls(&self, attributes: Vec<(String, String)>) -> Result<()> {
        self.send(ControlEvent::ControlsUpdated(attributes))
    }

    pub(crate) fn send_shutdown(&self) -> Result<()> {
        self.send(ControlEvent::Shutdown)
    }

    fn send(&self, event: ControlEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|error| anyhow!("failed to send control event: {error}"))
    }
}

impl Clone for ControlSender {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl ControlReceiver {
    /// Blocks for at most `timeout`; `None` means the tick elapsed with
    /// no event.
    pub(crate) fn receive_timeout(&mut self, timeout: Duration) -> Option<ControlEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(ControlEvent::Disconnected),
        }
    }
}
