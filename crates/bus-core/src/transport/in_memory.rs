//! # In-Memory Transport Host
//!
//! Each receive endpoint owns an unbounded queue. While the host runs, one
//! dispatcher task per endpoint pulls envelopes off its queue and spawns a
//! delivery for each, bounded by a host-wide semaphore:
//!
//! ```text
//!  deliver(queue) ──▶ mpsc ──▶ dispatcher ──▶ permit ──▶ JoinSet ──▶ ConsumePipe
//!                           (one per endpoint)          (in-flight deliveries)
//! ```
//!
//! A dispatcher only waits for a permit once it holds an envelope, so idle
//! endpoints never tie up capacity.
//!
//! Stopping is two-phase: dispatchers stop pulling new envelopes, then
//! in-flight deliveries get `drain_timeout` to finish. Deliveries still
//! running after that are aborted, which drops (and so releases) their
//! message scopes. Envelopes still queued, or pulled but not yet
//! dispatched, are kept for the next start.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::InMemoryTransportConfig;
use crate::envelope::Envelope;
use crate::errors::{ConfigurationError, HostError, TransportError};
use crate::handler::MessageHandler;
use crate::host::{BusHost, HostStatus};
use crate::pipe::ConsumePipe;
use crate::transport::SendTransportProvider;

/// A named queue plus the handlers and consume pipe serving it.
pub struct ReceiveEndpoint {
    name: String,
    handlers: HashMap<String, Vec<Arc<dyn MessageHandler>>>,
    pipe: Arc<ConsumePipe>,
}

impl ReceiveEndpoint {
    pub fn new(name: impl Into<String>, pipe: Arc<ConsumePipe>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            pipe,
        }
    }

    /// Add a handler for `message_type`. Handlers for the same type run in
    /// the order they were added.
    #[must_use]
    pub fn with_handler(
        mut self,
        message_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.handlers
            .entry(message_type.into())
            .or_default()
            .push(handler);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn handles(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    #[must_use]
    pub fn pipe(&self) -> &Arc<ConsumePipe> {
        &self.pipe
    }

    pub(crate) fn handlers_for(&self, message_type: &str) -> Option<&[Arc<dyn MessageHandler>]> {
        self.handlers.get(message_type).map(Vec::as_slice)
    }
}

impl fmt::Debug for ReceiveEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("ReceiveEndpoint")
            .field("name", &self.name)
            .field("message_types", &types)
            .finish_non_exhaustive()
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
struct DeliveryStats {
    delivered: AtomicU64,
    consumed: AtomicU64,
    faulted: AtomicU64,
    skipped: AtomicU64,
}

/// Queue state owned by whoever drives the queue.
struct Parked {
    receiver: mpsc::UnboundedReceiver<Envelope>,
    /// Pulled off the queue but never dispatched; goes first on the next start.
    held: Option<Envelope>,
}

struct Queue {
    endpoint: ReceiveEndpoint,
    sender: mpsc::UnboundedSender<Envelope>,
    /// Held here while stopped; owned by the dispatcher while running.
    parked: Mutex<Option<Parked>>,
}

impl Queue {
    fn new(endpoint: ReceiveEndpoint) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            endpoint,
            sender,
            parked: Mutex::new(Some(Parked {
                receiver,
                held: None,
            })),
        }
    }
}

struct DispatcherExit {
    parked: Parked,
    abandoned: usize,
}

struct Running {
    shutdown: watch::Sender<bool>,
    dispatchers: Vec<(Arc<Queue>, JoinHandle<DispatcherExit>)>,
}

enum Lifecycle {
    Idle,
    Running(Running),
    /// Dispatchers are draining; the queues are not parked yet.
    Stopping,
}

/// Host for the in-memory transport.
///
/// Must be started from within a Tokio runtime.
pub struct InMemoryHost {
    config: InMemoryTransportConfig,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    permits: Arc<Semaphore>,
    status: Mutex<HostStatus>,
    lifecycle: Mutex<Lifecycle>,
    stats: Arc<DeliveryStats>,
}

impl InMemoryHost {
    #[must_use]
    pub fn new(config: InMemoryTransportConfig) -> Self {
        let mut config = config;
        if config.concurrency_limit == 0 {
            warn!(address = %config.address, "[InMemory] Concurrency limit of zero raised to one");
            config.concurrency_limit = 1;
        }
        Self {
            permits: Arc::new(Semaphore::new(config.concurrency_limit)),
            config,
            queues: RwLock::new(HashMap::new()),
            status: Mutex::new(HostStatus::Created),
            lifecycle: Mutex::new(Lifecycle::Idle),
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    #[must_use]
    pub fn with_concurrency_limit(limit: usize) -> Self {
        Self::new(InMemoryTransportConfig::default().with_concurrency_limit(limit))
    }

    #[must_use]
    pub fn config(&self) -> &InMemoryTransportConfig {
        &self.config
    }

    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        self.config.concurrency_limit
    }

    /// Connect a receive endpoint. Only allowed while the host is neither
    /// running nor stopping.
    pub fn connect_endpoint(&self, endpoint: ReceiveEndpoint) -> Result<(), ConfigurationError> {
        let lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(ConfigurationError::HostRunning(self.config.address.clone()));
        }
        let mut queues = self.queues.write();
        if queues.contains_key(endpoint.name()) {
            return Err(ConfigurationError::DuplicateEndpoint(endpoint.name().to_string()));
        }
        debug!(queue = %endpoint.name(), "[InMemory] Endpoint connected");
        queues.insert(endpoint.name().to_string(), Arc::new(Queue::new(endpoint)));
        Ok(())
    }

    #[must_use]
    pub fn has_endpoint(&self, name: &str) -> bool {
        self.queues.read().contains_key(name)
    }

    /// Connected queue names, sorted.
    #[must_use]
    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Envelopes accepted by `deliver`/`publish`.
    #[must_use]
    pub fn messages_delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    /// Deliveries whose handler chain completed.
    #[must_use]
    pub fn messages_consumed(&self) -> u64 {
        self.stats.consumed.load(Ordering::Relaxed)
    }

    /// Deliveries that failed in the consume pipe.
    #[must_use]
    pub fn messages_faulted(&self) -> u64 {
        self.stats.faulted.load(Ordering::Relaxed)
    }

    /// Envelopes dropped because their endpoint has no handler for the type.
    #[must_use]
    pub fn messages_skipped(&self) -> u64 {
        self.stats.skipped.load(Ordering::Relaxed)
    }

    fn set_status(&self, status: HostStatus) {
        *self.status.lock() = status;
    }

    fn enqueue(&self, queue: &Queue, envelope: Envelope) -> Result<(), TransportError> {
        queue
            .sender
            .send(envelope)
            .map_err(|_| TransportError::TransportClosed)?;
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn start_failed(&self, reason: impl Into<String>) -> HostError {
        HostError::StartFailed {
            address: self.config.address.clone(),
            reason: reason.into(),
        }
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new(InMemoryTransportConfig::default())
    }
}

impl fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHost")
            .field("address", &self.config.address)
            .field("status", &self.status())
            .field("endpoints", &self.endpoint_names())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BusHost for InMemoryHost {
    fn address(&self) -> &str {
        &self.config.address
    }

    fn status(&self) -> HostStatus {
        *self.status.lock()
    }

    /// Start one dispatcher per endpoint.
    ///
    /// Fails without side effects while a stop is still draining.
    async fn start(&self) -> Result<(), HostError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running(_) => {
                debug!(address = %self.config.address, "[InMemory] Already running");
                return Ok(());
            }
            Lifecycle::Stopping => return Err(self.start_failed("stop still in progress")),
            Lifecycle::Idle => {}
        }
        self.set_status(HostStatus::Starting);

        // Claim every queue before spawning anything so a failure leaves
        // all of them parked.
        let queues: Vec<Arc<Queue>> = self.queues.read().values().cloned().collect();
        let mut claimed = Vec::with_capacity(queues.len());
        for queue in queues {
            let taken = queue.parked.lock().take();
            match taken {
                Some(parked) => claimed.push((queue, parked)),
                None => {
                    for (queue, parked) in claimed {
                        *queue.parked.lock() = Some(parked);
                    }
                    self.set_status(HostStatus::Faulted);
                    return Err(self.start_failed(format!(
                        "queue `{}` has no receiver",
                        queue.endpoint.name()
                    )));
                }
            }
        }

        let (shutdown, _) = watch::channel(false);
        let dispatchers: Vec<(Arc<Queue>, JoinHandle<DispatcherExit>)> = claimed
            .into_iter()
            .map(|(queue, parked)| {
                let handle = tokio::spawn(dispatch_loop(
                    Arc::clone(&queue),
                    parked,
                    Arc::clone(&self.permits),
                    Arc::clone(&self.stats),
                    shutdown.subscribe(),
                    self.config.drain_timeout,
                ));
                (queue, handle)
            })
            .collect();

        info!(
            address = %self.config.address,
            endpoints = dispatchers.len(),
            concurrency_limit = self.config.concurrency_limit,
            "[InMemory] Host started"
        );
        *lifecycle = Lifecycle::Running(Running {
            shutdown,
            dispatchers,
        });
        self.set_status(HostStatus::Running);
        Ok(())
    }

    /// Stop and drain. A stop issued while another is draining returns
    /// immediately.
    async fn stop(&self) -> Result<(), HostError> {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(running) => running,
                other => {
                    *lifecycle = other;
                    return Ok(());
                }
            }
        };
        self.set_status(HostStatus::Stopping);
        info!(address = %self.config.address, "[InMemory] Host stopping");

        if running.shutdown.send(true).is_err() {
            debug!("[InMemory] All dispatchers already exited");
        }

        let mut abandoned = 0;
        let mut lost = Vec::new();
        for (queue, handle) in running.dispatchers {
            match handle.await {
                Ok(exit) => {
                    abandoned += exit.abandoned;
                    *queue.parked.lock() = Some(exit.parked);
                }
                Err(e) => {
                    error!(
                        queue = %queue.endpoint.name(),
                        error = %e,
                        "[InMemory] Dispatcher failed"
                    );
                    lost.push(queue.endpoint.name().to_string());
                }
            }
        }
        *self.lifecycle.lock() = Lifecycle::Idle;

        if !lost.is_empty() {
            self.set_status(HostStatus::Faulted);
            return Err(HostError::StopFailed {
                address: self.config.address.clone(),
                reason: format!("dispatchers lost for {}", lost.join(", ")),
            });
        }

        self.set_status(HostStatus::Stopped);
        if abandoned > 0 {
            warn!(
                address = %self.config.address,
                abandoned,
                "[InMemory] Deliveries abandoned after drain timeout"
            );
            return Err(HostError::DrainTimeout {
                address: self.config.address.clone(),
                abandoned,
            });
        }

        info!(address = %self.config.address, "[InMemory] Host stopped");
        Ok(())
    }
}

impl SendTransportProvider for InMemoryHost {
    fn deliver(&self, destination: &str, envelope: Envelope) -> Result<(), TransportError> {
        let queue = self
            .queues
            .read()
            .get(destination)
            .cloned()
            .ok_or_else(|| TransportError::UnknownQueue(destination.to_string()))?;
        self.enqueue(&queue, envelope)
    }

    fn publish(&self, envelope: Envelope) -> Result<usize, TransportError> {
        let targets: Vec<Arc<Queue>> = self
            .queues
            .read()
            .values()
            .filter(|q| q.endpoint.handles(&envelope.message_type))
            .cloned()
            .collect();

        for queue in &targets {
            let mut copy = envelope.clone();
            copy.destination = queue.endpoint.name().to_string();
            self.enqueue(queue, copy)?;
        }
        Ok(targets.len())
    }
}

async fn dispatch_loop(
    queue: Arc<Queue>,
    parked: Parked,
    permits: Arc<Semaphore>,
    stats: Arc<DeliveryStats>,
    mut shutdown: watch::Receiver<bool>,
    drain_timeout: Duration,
) -> DispatcherExit {
    let Parked {
        mut receiver,
        mut held,
    } = parked;
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        while let Some(finished) = in_flight.try_join_next() {
            log_join(&queue, finished);
        }

        let envelope = match held.take() {
            Some(envelope) => envelope,
            None => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = receiver.recv() => match received {
                    Some(envelope) => envelope,
                    None => break,
                },
            },
        };

        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                held = Some(envelope);
                break;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    held = Some(envelope);
                    break;
                }
            },
        };

        let queue = Arc::clone(&queue);
        let stats = Arc::clone(&stats);
        in_flight.spawn(async move {
            let _permit = permit;
            consume(&queue, &stats, envelope).await;
        });
    }

    let abandoned = drain(&queue, &mut in_flight, drain_timeout).await;
    DispatcherExit {
        parked: Parked { receiver, held },
        abandoned,
    }
}

async fn consume(queue: &Queue, stats: &DeliveryStats, envelope: Envelope) {
    let name = queue.endpoint.name();
    let Some(handlers) = queue.endpoint.handlers_for(&envelope.message_type) else {
        stats.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(
            queue = %name,
            message_type = %envelope.message_type,
            "[InMemory] No handler for message type, skipped"
        );
        return;
    };

    let message_id = envelope.message_id;
    match queue.endpoint.pipe.dispatch(envelope, handlers).await {
        Ok(()) => {
            stats.consumed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.faulted.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %name, %message_id, error = %e, "[InMemory] Delivery faulted");
        }
    }
}

/// Wait for in-flight deliveries, aborting whatever outlives `timeout`.
///
/// Returns how many deliveries were aborted.
async fn drain(queue: &Queue, in_flight: &mut JoinSet<()>, timeout: Duration) -> usize {
    let finished = tokio::time::timeout(timeout, async {
        while let Some(result) = in_flight.join_next().await {
            log_join(queue, result);
        }
    })
    .await;

    if finished.is_ok() {
        return 0;
    }

    let abandoned = in_flight.len();
    in_flight.abort_all();
    while in_flight.join_next().await.is_some() {}
    abandoned
}

fn log_join(queue: &Queue, result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(queue = %queue.endpoint.name(), "[InMemory] Handler panicked");
        }
    }
}
