//! # Test Fixtures
//!
//! Shared doubles for the integration flows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus_core::{
    handler_fn, BusHost, ConsumeContext, HandlerError, HostError, HostStatus, MessageHandler,
};
use parking_lot::Mutex;

/// Shared, ordered record of lifecycle calls.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Host that records `start <address>` / `stop <address>` into a journal.
pub struct JournalHost {
    address: String,
    journal: Journal,
    fail_start: bool,
    fail_stop: bool,
    status: Mutex<HostStatus>,
}

impl JournalHost {
    pub fn new(address: &str, journal: &Journal) -> Self {
        Self {
            address: address.to_string(),
            journal: Arc::clone(journal),
            fail_start: false,
            fail_stop: false,
            status: Mutex::new(HostStatus::Created),
        }
    }

    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn shared(self) -> Arc<dyn BusHost> {
        Arc::new(self)
    }
}

#[async_trait]
impl BusHost for JournalHost {
    fn address(&self) -> &str {
        &self.address
    }

    fn status(&self) -> HostStatus {
        *self.status.lock()
    }

    async fn start(&self) -> Result<(), HostError> {
        self.journal.lock().push(format!("start {}", self.address));
        if self.fail_start {
            *self.status.lock() = HostStatus::Faulted;
            return Err(HostError::StartFailed {
                address: self.address.clone(),
                reason: "refused".into(),
            });
        }
        *self.status.lock() = HostStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), HostError> {
        self.journal.lock().push(format!("stop {}", self.address));
        if self.fail_stop {
            return Err(HostError::StopFailed {
                address: self.address.clone(),
                reason: "stuck".into(),
            });
        }
        *self.status.lock() = HostStatus::Stopped;
        Ok(())
    }
}

/// Handler that succeeds without doing anything.
pub fn noop_handler() -> Arc<dyn MessageHandler> {
    handler_fn(|_context: ConsumeContext| async move { Ok::<(), HandlerError>(()) })
}

/// Handler counting its invocations.
pub fn counting_handler(count: &Arc<AtomicUsize>) -> Arc<dyn MessageHandler> {
    let count = Arc::clone(count);
    handler_fn(move |_context: ConsumeContext| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        }
    })
}

/// Handler that never completes.
pub fn hung_handler() -> Arc<dyn MessageHandler> {
    handler_fn(|_context: ConsumeContext| async move {
        std::future::pending::<()>().await;
        Ok::<(), HandlerError>(())
    })
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}
