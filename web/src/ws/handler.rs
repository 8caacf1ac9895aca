use crate::{AppState, Error};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use futures::StreamExt;
use log::*;
use realtime::session::{self, Session};
use realtime::ProjectId;

/// Upgrades `/ws/{project}` into a realtime session scoped to `project`.
///
/// The path segment is the only place a session's project is decided; the hub
/// trusts it as given. Inbound frames are only used to detect closure.
pub(crate) async fn ws_handler(
    Path(project): Path<String>,
    State(app_state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, Error> {
    let hub = app_state.hub.clone();
    if hub.is_closed() {
        return Err(realtime::Error::hub_closed().into());
    }

    let project = ProjectId::from(project);
    let shutdown = app_state.shutdown.clone();
    debug!("Upgrading realtime connection for project {project}");

    Ok(ws
        .on_failed_upgrade(|e| warn!("Realtime WebSocket upgrade failed: {e}"))
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            let (session, queue) = Session::new(project, hub.session_queue_capacity());
            session::serve(hub, session, queue, sink, stream, shutdown).await;
        }))
}
