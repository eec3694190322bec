//! Admission gate: a counting bound on in-flight request handling.
//!
//! The accept loop acquires one permit per incoming connection before the
//! connection is accepted, so once all permits are consumed the loop stalls
//! and backpressure moves into the OS accept backlog. There is no reject or
//! overflow policy.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of concurrently handled connections.
#[derive(Debug, Clone)]
pub(crate) struct AdmissionGate {
    permits: Arc<Semaphore>,
}

impl AdmissionGate {
    /// Creates a gate with `max_in_flight` permits; the starting count and
    /// the maximum are the same value.
    pub(crate) fn new(max_in_flight: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(max_in_flight)) }
    }

    /// Waits until a permit is available, then consumes one.
    ///
    /// The permit travels with the connection task; dropping it is the
    /// release, so release happens exactly once per acquire no matter how
    /// the connection ends.
    pub(crate) async fn acquire(&self) -> GatePermit {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("admission semaphore is never closed");
        GatePermit { _permit: permit }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// One admission slot, released on drop.
#[derive(Debug)]
pub(crate) struct GatePermit {
    _permit: OwnedSemaphorePermit,
}
