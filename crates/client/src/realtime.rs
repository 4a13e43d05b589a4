//! Realtime client: owns the subscription manager and drives one connection
//! task with a bounded reconnect policy.
//!
//! After the policy's attempts are used up the client stays disconnected
//! until [`RealtimeClient::connect`] is called again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::models::geo::{GeoPoint, RoomKey};
use domain::models::incident::NewIncidentPayload;
use domain::models::realtime::{HeatmapUpdate, RiskAlert};
use domain::ValidationError;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::subscription::{ConnectionState, SubscriptionManager};
use crate::transport::{Connection, Connector, ReconnectPolicy};

struct Inner {
    manager: Mutex<SubscriptionManager>,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    outbound: Notify,
}

impl Inner {
    fn manager(&self) -> MutexGuard<'_, SubscriptionManager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Realtime client with explicit `connect`/`dispose` lifecycle.
///
/// Callbacks run on the connection task after the manager lock is released,
/// so they may subscribe or unsubscribe through the client.
pub struct RealtimeClient {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Dropped,
    Shutdown,
}

impl RealtimeClient {
    pub fn new(connector: Arc<dyn Connector>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                manager: Mutex::new(SubscriptionManager::new(&config.dedup)),
                connector,
                policy: ReconnectPolicy::from_settings(&config.realtime),
                outbound: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Starts the connection task unless one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&self.inner), shutdown_rx));
        *worker = Some(Worker {
            handle,
            shutdown_tx,
        });
    }

    /// Stops the connection task and forgets all subscriptions.
    pub fn dispose(&self) {
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = worker.shutdown_tx.send(true);
        }
        self.inner.manager().reset();
        info!("Realtime client disposed");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.manager().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.manager().state()
    }

    pub fn active_room(&self) -> Option<RoomKey> {
        self.inner.manager().active_room()
    }

    pub fn subscribe_to_viewport<F>(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        on_update: F,
    ) -> Result<RoomKey, ValidationError>
    where
        F: FnMut(HeatmapUpdate) + Send + 'static,
    {
        let key = self
            .inner
            .manager()
            .subscribe_to_viewport(center, radius_meters, Box::new(on_update))?;
        self.inner.outbound.notify_one();
        Ok(key)
    }

    pub fn unsubscribe_from_viewport(&self) {
        self.inner.manager().unsubscribe_from_viewport();
        self.inner.outbound.notify_one();
    }

    pub fn subscribe_to_incidents<F>(&self, on_incident: F)
    where
        F: FnMut(NewIncidentPayload) + Send + 'static,
    {
        self.inner
            .manager()
            .subscribe_to_incidents(Box::new(on_incident));
        self.inner.outbound.notify_one();
    }

    pub fn subscribe_to_risk_alerts<F>(&self, on_alert: F)
    where
        F: FnMut(RiskAlert) + Send + 'static,
    {
        self.inner
            .manager()
            .subscribe_to_risk_alerts(Box::new(on_alert));
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = worker.shutdown_tx.send(true);
        }
    }
}

async fn run(inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    let policy = inner.policy;
    let mut attempt: u32 = 0;

    loop {
        inner.manager().on_connecting();

        let outcome = tokio::select! {
            result = tokio::time::timeout(policy.connect_timeout, inner.connector.connect()) => {
                result.unwrap_or(Err(TransportError::Timeout))
            }
            _ = shutdown_rx.changed() => break,
        };

        match outcome {
            Ok(connection) => {
                attempt = 0;
                inner.manager().on_connected();
                let end = drive(&inner, connection, &mut shutdown_rx).await;
                inner.manager().on_disconnected();
                if end == SessionEnd::Shutdown {
                    return;
                }
            }
            Err(e) => {
                inner.manager().on_disconnected();
                warn!(error = %e, attempt = attempt, "Realtime connection failed");
            }
        }

        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            info!(
                attempts = policy.max_attempts,
                "Reconnect attempts exhausted; waiting for explicit connect"
            );
            break;
        };

        debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    inner.manager().on_disconnected();
}

async fn drive(
    inner: &Inner,
    mut connection: Box<dyn Connection>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        let frames = inner.manager().drain_outbox();
        for frame in &frames {
            if let Err(e) = connection.send(frame).await {
                warn!(error = %e, "Failed to send realtime frame");
                return SessionEnd::Dropped;
            }
        }

        tokio::select! {
            received = connection.recv() => match received {
                Some(Ok(event)) => {
                    let delivery = inner.manager().handle_event(event);
                    if let Some(delivery) = delivery {
                        delivery.run();
                    }
                }
                Some(Err(TransportError::Frame(e))) => {
                    warn!(error = %e, "Discarding malformed realtime frame");
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime connection error");
                    return SessionEnd::Dropped;
                }
                None => return SessionEnd::Dropped,
            },
            _ = inner.outbound.notified() => {}
            _ = shutdown_rx.changed() => return SessionEnd::Shutdown,
        }
    }
}
