use crate::error::Error;
use crate::message::{ChangeEvent, RegistryStats, SessionId};
use crate::registry::{Delivery, Registry};
use crate::session::Session;
use log::*;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Outbound queue slots per session before it is considered a slow consumer.
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 256;

/// Pending requests the hub queue holds before senders wait.
pub const DEFAULT_REQUEST_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub session_queue_capacity: usize,
    pub request_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            session_queue_capacity: DEFAULT_SESSION_QUEUE_CAPACITY,
            request_queue_capacity: DEFAULT_REQUEST_QUEUE_CAPACITY,
        }
    }
}

/// A registry operation waiting for the control loop.
#[derive(Debug)]
enum Request {
    Register(Session),
    Unregister(SessionId),
    Publish(ChangeEvent),
}

/// Cloneable entry point to the hub, handed to the change listener and to every
/// connection-accept path.
#[derive(Clone)]
pub struct HubHandle {
    request_tx: mpsc::Sender<Request>,
    stats_rx: watch::Receiver<RegistryStats>,
    session_queue_capacity: usize,
}

impl HubHandle {
    /// Queue `session` for registration. It becomes a broadcast target once the
    /// control loop processes the request; events queued before it are not
    /// delivered to it.
    pub async fn register(&self, session: Session) -> Result<(), Error> {
        self.send(Request::Register(session)).await
    }

    /// Queue removal of a session. Unregistering a session that is not (or no
    /// longer) registered is a no-op.
    pub async fn unregister(&self, id: SessionId) -> Result<(), Error> {
        self.send(Request::Unregister(id)).await
    }

    /// Queue an event for delivery to every session of its project.
    pub async fn publish(&self, event: ChangeEvent) -> Result<(), Error> {
        self.send(Request::Publish(event)).await
    }

    /// Latest registry snapshot published by the control loop.
    pub fn stats(&self) -> RegistryStats {
        self.stats_rx.borrow().clone()
    }

    /// Receiver that observes every registry snapshot change.
    pub fn subscribe_stats(&self) -> watch::Receiver<RegistryStats> {
        self.stats_rx.clone()
    }

    /// Capacity to use for the outbound queue of new sessions.
    pub fn session_queue_capacity(&self) -> usize {
        self.session_queue_capacity
    }

    /// Whether the control loop has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.request_tx.is_closed()
    }

    async fn send(&self, request: Request) -> Result<(), Error> {
        self.request_tx
            .send(request)
            .await
            .map_err(|_| Error::hub_closed())
    }
}

/// The realtime fan-out router.
///
/// Owns the session registry and is its only writer: register, unregister and
/// publish requests share one bounded queue and are applied one at a time, in
/// arrival order, by [`Hub::run`].
pub struct Hub {
    registry: Registry,
    request_rx: mpsc::Receiver<Request>,
    stats_tx: watch::Sender<RegistryStats>,
}

impl Hub {
    pub fn new(config: HubConfig) -> (HubHandle, Hub) {
        let (request_tx, request_rx) = mpsc::channel(config.request_queue_capacity.max(1));
        let (stats_tx, stats_rx) = watch::channel(RegistryStats::default());

        let handle = HubHandle {
            request_tx,
            stats_rx,
            session_queue_capacity: config.session_queue_capacity.max(1),
        };
        let hub = Hub {
            registry: Registry::new(),
            request_rx,
            stats_tx,
        };

        (handle, hub)
    }

    /// Run the control loop until `shutdown` is cancelled.
    ///
    /// Requests of every kind are handled strictly in the order they were
    /// queued. Dropping the registry on exit closes every session's outbound
    /// queue.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Realtime hub started");

        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.request_rx.recv() => request,
            };

            match request {
                Some(Request::Register(session)) => self.handle_register(session),
                Some(Request::Unregister(id)) => self.handle_unregister(&id),
                Some(Request::Publish(event)) => self.handle_publish(event),
                // Every handle is gone; nothing can reach the registry again.
                None => break,
            }
        }

        info!(
            "Realtime hub stopping, closing {} session(s)",
            self.registry.len()
        );
    }

    fn handle_register(&mut self, session: Session) {
        let id = session.id().clone();
        let project = session.project().clone();

        if self.registry.register(session) {
            info!("Registered realtime session {id} for project {project}");
            self.refresh_stats();
        } else {
            warn!("Realtime session {id} is already registered, ignoring");
        }
    }

    fn handle_unregister(&mut self, id: &SessionId) {
        let project = self.registry.project_of(id).cloned();

        if self.registry.unregister(id) {
            if let Some(project) = project {
                info!("Unregistered realtime session {id} from project {project}");
            }
            self.refresh_stats();
        } else {
            trace!("Realtime session {id} already unregistered");
        }
    }

    fn handle_publish(&mut self, event: ChangeEvent) {
        match self.registry.publish(&event) {
            Delivery::NoSubscribers => {
                debug!(
                    "No realtime sessions for project {}, dropping event",
                    event.project
                );
            }
            Delivery::Delivered { delivered, evicted } => {
                debug!(
                    "Delivered event for project {} to {} session(s)",
                    event.project, delivered
                );
                if !evicted.is_empty() {
                    self.refresh_stats();
                }
            }
        }
    }

    fn refresh_stats(&self) {
        self.stats_tx.send_replace(self.registry.stats());
    }
}
