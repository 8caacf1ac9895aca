//! One live realtime connection bound to exactly one project.
//!
//! A session is served by two tasks: a writer that drains the outbound queue
//! into the transport, and a reader that only watches the transport for
//! closure. Either task may detect a failure and ask the hub to unregister the
//! session; the hub treats repeated requests as no-ops. Only the writer ever
//! closes the transport.

use crate::hub::HubHandle;
use crate::message::{Payload, ProjectId, SessionId};
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::*;
use std::fmt::Display;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

/// Receiving half of a session's outbound queue, drained by the writer task.
pub type SessionQueue = Receiver<Payload>;

/// Registry membership for one connection: identity, scope and the sending
/// half of its bounded outbound queue.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) project: ProjectId,
    pub(crate) sender: Sender<Payload>,
}

impl Session {
    /// Create a session with an empty outbound queue of `capacity` payloads.
    pub fn new(project: ProjectId, capacity: usize) -> (Self, SessionQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let session = Self {
            id: SessionId::new(),
            project,
            sender,
        };
        (session, receiver)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }
}

/// Register `session` with the hub, then run its writer and reader tasks until
/// both have stopped.
///
/// Registration happens before any traffic flows, so the session receives every
/// event the hub publishes after that point and none from before it.
pub async fn serve<S, R, E>(
    hub: HubHandle,
    session: Session,
    queue: SessionQueue,
    sink: S,
    stream: R,
    shutdown: CancellationToken,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let id = session.id.clone();
    let project = session.project.clone();

    if let Err(e) = hub.register(session).await {
        warn!("Could not register realtime session {id} for project {project}: {e}");
        return;
    }
    debug!("Realtime session {id} connected to project {project}");

    // Cancelled when the writer stops (or on process shutdown) so the reader
    // never outlives the transport's sending half.
    let writer_done = shutdown.child_token();

    let writer = tokio::spawn(write_pump(
        hub.clone(),
        id.clone(),
        queue,
        sink,
        writer_done.clone(),
    ));
    let reader = tokio::spawn(read_pump(hub, id.clone(), stream, writer_done));

    if let Err(e) = writer.await {
        error!("Writer task for realtime session {id} failed: {e}");
    }
    if let Err(e) = reader.await {
        error!("Reader task for realtime session {id} failed: {e}");
    }

    debug!("Realtime session {id} for project {project} closed");
}

async fn write_pump<S>(
    hub: HubHandle,
    id: SessionId,
    mut queue: SessionQueue,
    mut sink: S,
    done: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display + Send,
{
    loop {
        let next = tokio::select! {
            _ = done.cancelled() => None,
            next = queue.recv() => next,
        };

        match next {
            Some(payload) => {
                if let Err(e) = sink.send(Message::Text(payload)).await {
                    // The hub cannot see transport failures; tell it ourselves.
                    warn!("Failed to write to realtime session {id}: {e}");
                    request_unregister(&hub, &id).await;
                    break;
                }
            }
            None => {
                // Unregistered, evicted or shutting down.
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Could not send close frame to realtime session {id}: {e}");
                }
                break;
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Error closing transport for realtime session {id}: {e}");
    }
    done.cancel();
}

async fn read_pump<R, E>(hub: HubHandle, id: SessionId, mut stream: R, done: CancellationToken)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display + Send,
{
    loop {
        let frame = tokio::select! {
            _ = done.cancelled() => return,
            frame = stream.next() => frame,
        };

        match frame {
            // No inbound protocol: client frames only prove liveness.
            Some(Ok(Message::Close(_))) => {
                debug!("Realtime session {id} sent a close frame");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("Read error on realtime session {id}: {e}");
                break;
            }
            None => {
                debug!("Transport for realtime session {id} ended");
                break;
            }
        }
    }

    request_unregister(&hub, &id).await;
}

async fn request_unregister(hub: &HubHandle, id: &SessionId) {
    if let Err(e) = hub.unregister(id.clone()).await {
        // Only happens during shutdown, when the registry is being dropped anyway.
        debug!("Could not unregister realtime session {id}: {e}");
    }
}
