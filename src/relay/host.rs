use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::bus::MessageBus;
use crate::extract::{ExtractionError, ExtractionWorker};

type SetupFuture = Shared<BoxFuture<'static, Result<(), String>>>;
type SetupFn = dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync;

enum HostState {
    Uninitialized,
    Initializing(SetupFuture),
    Ready,
}

/// Lazily brings up the extraction worker's hosting context.
///
/// `ensure` is idempotent: while a setup is in flight every caller awaits the
/// same shared future, and once it has succeeded later calls return
/// immediately. A failed setup resets the host so the next call retries.
pub struct WorkerHost {
    state: Mutex<HostState>,
    setup: Arc<SetupFn>,
}

impl WorkerHost {
    pub fn new<F>(setup: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(HostState::Uninitialized),
            setup: Arc::new(setup),
        }
    }

    /// Host whose setup spawns `worker` as a task listening on `bus`.
    pub fn for_worker(bus: MessageBus, worker: Arc<ExtractionWorker>) -> Self {
        Self::new(move || {
            // Subscribe before the setup reports ready so no request published
            // afterwards can slip past the worker.
            let inbox = bus.subscribe();
            let bus = bus.clone();
            let worker = Arc::clone(&worker);
            async move {
                tokio::spawn(async move { worker.run(inbox, bus).await });
                info!("Extraction worker started");
                Ok(())
            }
            .boxed()
        })
    }

    pub async fn ensure(&self) -> Result<(), ExtractionError> {
        let pending = {
            let mut state = self.state.lock().await;
            match &*state {
                HostState::Ready => return Ok(()),
                HostState::Initializing(setup) => {
                    debug!("Worker setup already in progress; waiting on it");
                    setup.clone()
                }
                HostState::Uninitialized => {
                    let setup = (self.setup)().shared();
                    *state = HostState::Initializing(setup.clone());
                    setup
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.state.lock().await;
        if let HostState::Initializing(current) = &*state {
            if current.ptr_eq(&pending) {
                *state = match &result {
                    Ok(()) => HostState::Ready,
                    Err(_) => HostState::Uninitialized,
                };
            }
        }

        result.map_err(|e| {
            warn!(error = %e, "Extraction worker setup failed");
            ExtractionError::WorkerUnavailable(e)
        })
    }

    #[cfg(test)]
    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, HostState::Ready)
    }
}
