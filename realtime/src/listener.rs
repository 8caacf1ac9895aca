use crate::error::{Error, ErrorKind};
use crate::hub::HubHandle;
use crate::message::ChangeEvent;
use async_trait::async_trait;
use log::*;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

/// Database-wide channel that change triggers `NOTIFY` on.
pub const DEFAULT_NOTIFY_CHANNEL: &str = "db_events";

/// A blocking source of database change notifications.
///
/// `wait_for_next` errors of kind [`ErrorKind::ConnectionLost`] mean the source
/// is unusable; any other error is transient and the wait may be retried.
#[async_trait]
pub trait NotificationSource: Send {
    async fn subscribe(&mut self, channel: &str) -> Result<(), Error>;

    async fn wait_for_next(&mut self) -> Result<String, Error>;
}

/// Notification source backed by a dedicated Postgres connection, separate from
/// the query pool because it blocks indefinitely.
pub struct PgNotificationSource {
    listener: PgListener,
}

impl PgNotificationSource {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let mut listener = PgListener::connect(database_url)
            .await
            .map_err(|e| Error::with_source(ErrorKind::Subscribe, e))?;

        // A lost connection must surface to the change listener instead of being
        // silently replaced; notifications sent while disconnected are gone.
        listener.eager_reconnect(false);

        Ok(Self { listener })
    }
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn subscribe(&mut self, channel: &str) -> Result<(), Error> {
        self.listener
            .listen(channel)
            .await
            .map_err(|e| Error::with_source(ErrorKind::Subscribe, e))
    }

    async fn wait_for_next(&mut self) -> Result<String, Error> {
        match self.listener.try_recv().await? {
            Some(notification) => Ok(notification.payload().to_owned()),
            None => Err(Error::new(ErrorKind::ConnectionLost)),
        }
    }
}

/// Turns database notifications into change events published on the hub.
pub struct ChangeListener<S> {
    source: S,
    hub: HubHandle,
    channel: String,
}

impl<S: NotificationSource> ChangeListener<S> {
    pub fn new(source: S, hub: HubHandle, channel: impl Into<String>) -> Self {
        Self {
            source,
            hub,
            channel: channel.into(),
        }
    }

    /// Subscribe once, then publish every decodable notification until the
    /// source is lost or `shutdown` is cancelled.
    ///
    /// Malformed payloads and transient wait errors are logged and skipped.
    /// Returns an error only when subscribing fails, the source connection is
    /// lost, or the hub stops outside of shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), Error> {
        self.source.subscribe(&self.channel).await?;
        info!(
            "Listening for change notifications on channel '{}'",
            self.channel
        );

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.source.wait_for_next() => next,
            };

            let raw = match next {
                Ok(raw) => raw,
                Err(e) if e.error_kind == ErrorKind::ConnectionLost => {
                    error!(
                        "Lost the notification connection for channel '{}'",
                        self.channel
                    );
                    return Err(e);
                }
                Err(e) => {
                    error!("Error waiting for change notification: {e}");
                    continue;
                }
            };

            let event = match ChangeEvent::from_notification(&raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Dropping malformed change notification: {e}");
                    continue;
                }
            };

            trace!("Change notification for project {}", event.project);
            if let Err(e) = self.hub.publish(event).await {
                if shutdown.is_cancelled() {
                    break;
                }
                return Err(e);
            }
        }

        info!("Change listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;
    use crate::hub::{Hub, HubConfig};
    use crate::message::ProjectId;
    use crate::session::Session;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// Replays a fixed script of wait results, then blocks forever.
    #[derive(Default)]
    struct ScriptedSource {
        script: VecDeque<Result<String, Error>>,
        subscribed: Arc<Mutex<Vec<String>>>,
        fail_subscribe: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<String, Error>>) -> Self {
            Self {
                script: script.into(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl NotificationSource for ScriptedSource {
        async fn subscribe(&mut self, channel: &str) -> Result<(), Error> {
            if self.fail_subscribe {
                return Err(Error::new(ErrorKind::Subscribe));
            }
            self.subscribed.lock().unwrap().push(channel.to_owned());
            Ok(())
        }

        async fn wait_for_next(&mut self) -> Result<String, Error> {
            match self.script.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    fn ok(raw: &str) -> Result<String, Error> {
        Ok(raw.to_owned())
    }

    fn start_hub() -> (HubHandle, CancellationToken) {
        let shutdown = CancellationToken::new();
        let (handle, hub) = Hub::new(HubConfig::default());
        tokio::spawn(hub.run(shutdown.clone()));
        (handle, shutdown)
    }

    async fn subscribe_session(hub: &HubHandle, project: &str) -> crate::session::SessionQueue {
        let (session, queue) = Session::new(ProjectId::from(project), 16);
        hub.register(session).await.unwrap();
        queue
    }

    #[tokio::test]
    async fn test_malformed_and_failed_waits_do_not_stop_delivery() {
        let (hub, shutdown) = start_hub();
        let mut shop = subscribe_session(&hub, "shop").await;
        let mut blog = subscribe_session(&hub, "blog").await;

        let first = r#"{"schema":"shop","table":"orders","data":{"id":1}}"#;
        let second = r#"{"schema":"shop","table":"orders","data":{"id":2}}"#;
        let source = ScriptedSource::new(vec![
            ok(first),
            ok("not json"),
            ok(r#"{"table":"orders"}"#),
            ok(r#"{"schema":7}"#),
            Err(Error::new(ErrorKind::Wait)),
            ok(r#"["shop"]"#),
            ok(second),
        ]);
        let listener = ChangeListener::new(source, hub.clone(), DEFAULT_NOTIFY_CHANNEL);
        let task = tokio::spawn(listener.run(shutdown.clone()));

        for expected in [first, second] {
            let payload = timeout(WAIT, shop.recv()).await.unwrap().unwrap();
            assert_eq!(payload.as_str(), expected);
        }

        shutdown.cancel();
        assert!(timeout(WAIT, task).await.unwrap().unwrap().is_ok());
        assert!(blog.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribes_to_configured_channel() {
        let (hub, shutdown) = start_hub();
        let source = ScriptedSource::default();
        let subscribed = Arc::clone(&source.subscribed);
        let listener = ChangeListener::new(source, hub, "tenant_changes");
        let task = tokio::spawn(listener.run(shutdown.clone()));

        timeout(WAIT, async {
            while subscribed.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*subscribed.lock().unwrap(), vec!["tenant_changes".to_owned()]);
        shutdown.cancel();
        assert!(timeout(WAIT, task).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_returned() {
        let (hub, shutdown) = start_hub();
        let source = ScriptedSource {
            fail_subscribe: true,
            ..ScriptedSource::default()
        };

        let err = ChangeListener::new(source, hub, DEFAULT_NOTIFY_CHANNEL)
            .run(shutdown)
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Subscribe);
    }

    #[tokio::test]
    async fn test_connection_loss_is_fatal() {
        let (hub, shutdown) = start_hub();
        let mut shop = subscribe_session(&hub, "shop").await;
        let raw = r#"{"schema":"shop"}"#;
        let source = ScriptedSource::new(vec![
            ok(raw),
            Err(Error::new(ErrorKind::ConnectionLost)),
            ok(raw),
        ]);

        let err = timeout(
            WAIT,
            ChangeListener::new(source, hub, DEFAULT_NOTIFY_CHANNEL).run(shutdown),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::ConnectionLost);
        let payload = timeout(WAIT, shop.recv()).await.unwrap().unwrap();
        assert_eq!(payload.as_str(), raw);
    }

    #[tokio::test]
    async fn test_closed_hub_outside_shutdown_is_an_error() {
        let (hub, hub_loop) = Hub::new(HubConfig::default());
        drop(hub_loop);
        let source = ScriptedSource::new(vec![ok(r#"{"schema":"shop"}"#)]);

        let err = ChangeListener::new(source, hub, DEFAULT_NOTIFY_CHANNEL)
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::HubClosed);
    }

    #[test]
    fn test_decode_error_kinds_are_not_fatal() {
        let err = ChangeEvent::from_notification("{}").unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Decode(DecodeErrorKind::MissingProject)
        );
        assert!(!err.is_fatal());
    }
}
