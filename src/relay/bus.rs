use tokio::sync::broadcast;
use tracing::debug;

use super::types::RelayMessage;

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast bus shared by the orchestrator and the extraction worker.
///
/// Every subscriber sees every message published after it subscribed, so
/// listeners filter on the message type and correlation id themselves.
#[derive(Debug, Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<RelayMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.sender.subscribe()
    }

    /// Publishes a message and returns how many listeners received it.
    pub fn publish(&self, message: RelayMessage) -> usize {
        let kind = message.kind();
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(kind, "Message published with no listeners");
                0
            }
        }
    }
}
