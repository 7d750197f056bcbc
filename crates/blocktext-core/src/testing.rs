//! Test doubles shared by the propagator and session tests.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use tokio::time::Instant;

use crate::bridge::{BlockUpdate, PersistenceBridge};
use crate::delta::Delta;
use crate::error::PersistenceError;

#[derive(Clone, Debug)]
pub(crate) struct Call {
    /// Milliseconds since the bridge was created.
    pub at_ms: u64,
    pub update: BlockUpdate,
}

/// Records every update it receives, optionally slow or failing.
pub(crate) struct RecordingBridge {
    start: Instant,
    latency: Duration,
    fail: Cell<bool>,
    calls: RefCell<Vec<Call>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            latency: Duration::ZERO,
            fail: Cell::new(false),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn deltas(&self) -> Vec<Delta> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.update.delta.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl PersistenceBridge for RecordingBridge {
    async fn update_block(&self, update: BlockUpdate) -> Result<(), PersistenceError> {
        let at_ms = self.start.elapsed().as_millis() as u64;
        self.calls.borrow_mut().push(Call { at_ms, update });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail.get() {
            Err(PersistenceError::new("store offline"))
        } else {
            Ok(())
        }
    }
}

/// Advance paused time by `ms`, letting spawned tasks run.
pub(crate) async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
