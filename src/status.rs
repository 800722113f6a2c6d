use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

/// How long a success or error indicator stays up before it clears itself.
pub const CLEAR_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Busy,
    Success,
    Error,
    Cleared,
}

impl Status {
    /// Short badge text for the status.
    pub fn badge(&self) -> &'static str {
        match self {
            Status::Busy => "...",
            Status::Success => "done",
            Status::Error => "error",
            Status::Cleared => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub run_id: Uuid,
    pub status: Status,
}

/// Per-run status events. Renderers subscribe and show the latest event.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(32);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn busy(&self, run_id: Uuid) {
        self.emit(run_id, Status::Busy);
    }

    pub fn success(&self, run_id: Uuid) {
        self.emit(run_id, Status::Success);
        self.schedule_clear(run_id);
    }

    pub fn error(&self, run_id: Uuid) {
        self.emit(run_id, Status::Error);
        self.schedule_clear(run_id);
    }

    pub fn clear(&self, run_id: Uuid) {
        self.emit(run_id, Status::Cleared);
    }

    fn emit(&self, run_id: Uuid, status: Status) {
        // Nobody rendering is fine.
        let _ = self.sender.send(StatusEvent { run_id, status });
    }

    fn schedule_clear(&self, run_id: Uuid) {
        let reporter = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CLEAR_DELAY).await;
            reporter.clear(run_id);
        });
    }
}
