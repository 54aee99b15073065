//! services/api/src/roast_worker.rs
//!
//! The background worker that opens roast threads for folds. Check-ins only
//! enqueue a request; the worker creates the thread on its own schedule and
//! retries independently of the check-in that caused it.

use pact_engine_core::domain::RoastRequest;
use pact_engine_core::ports::{PortError, PortResult, RoastQueue, RoastThreadService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RoastWorkerSettings {
    pub max_attempts: u32,
    /// Multiplied by the attempt number between retries.
    pub backoff: Duration,
    pub capacity: usize,
}

/// The sending half of the roast queue. Cheap to share between handlers.
#[derive(Clone)]
pub struct RoastWorker {
    sender: mpsc::Sender<RoastRequest>,
}

impl RoastWorker {
    /// Starts the worker task. It runs until `shutdown` is cancelled, then
    /// drains what is already queued.
    pub fn spawn(
        service: Arc<dyn RoastThreadService>,
        settings: RoastWorkerSettings,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.capacity);
        let handle = tokio::spawn(run(receiver, service, settings, shutdown));
        (Self { sender }, handle)
    }
}

impl RoastQueue for RoastWorker {
    fn enqueue(&self, request: RoastRequest) -> PortResult<()> {
        self.sender.try_send(request).map_err(|e| match e {
            TrySendError::Full(r) => PortError::Unexpected(format!(
                "roast queue is full; dropped request for check-in {}",
                r.check_in_id
            )),
            TrySendError::Closed(r) => PortError::Unexpected(format!(
                "roast worker has stopped; dropped request for check-in {}",
                r.check_in_id
            )),
        })
    }
}

async fn run(
    mut receiver: mpsc::Receiver<RoastRequest>,
    service: Arc<dyn RoastThreadService>,
    settings: RoastWorkerSettings,
    shutdown: CancellationToken,
) {
    info!("Roast worker started.");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(request) => {
                    open_thread(service.as_ref(), &request, &settings).await;
                }
                None => {
                    info!("Roast queue closed; worker exiting.");
                    return;
                }
            },
        }
    }

    receiver.close();
    while let Some(request) = receiver.recv().await {
        open_thread(service.as_ref(), &request, &settings).await;
    }
    info!("Roast worker drained and stopped.");
}

/// Returns whether the thread exists after this call.
async fn open_thread(
    service: &dyn RoastThreadService,
    request: &RoastRequest,
    settings: &RoastWorkerSettings,
) -> bool {
    for attempt in 1..=settings.max_attempts {
        match service.create_thread(request.check_in_id).await {
            Ok(thread) => {
                info!(
                    "Roast thread {} open for check-in {} (pact {})",
                    thread.id, request.check_in_id, request.pact_id
                );
                return true;
            }
            Err(e) => {
                warn!(
                    "Attempt {}/{} to open roast thread for check-in {} failed: {}",
                    attempt, settings.max_attempts, request.check_in_id, e
                );
                if attempt < settings.max_attempts {
                    tokio::time::sleep(settings.backoff * attempt).await;
                }
            }
        }
    }
    error!(
        "Giving up on roast thread for check-in {} after {} attempts",
        request.check_in_id, settings.max_attempts
    );
    false
}
