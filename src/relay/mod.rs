//! Message relay between the orchestrator and the extraction worker.

pub mod bus;
pub mod host;
pub mod request;
pub mod transport;
pub mod types;

pub use bus::MessageBus;
pub use host::WorkerHost;
pub use request::{request_extraction, EXTRACTION_TIMEOUT};
pub use types::RelayMessage;
