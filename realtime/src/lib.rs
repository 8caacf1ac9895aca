//! Realtime change broadcast for Hanbase projects.
//!
//! Database triggers `NOTIFY` a single global channel with a JSON payload naming
//! the project (schema) that changed. This crate turns those notifications into
//! WebSocket frames for every client connected to that project.
//!
//! # Architecture
//!
//! - **Change listener**: holds a dedicated connection subscribed to the notify
//!   channel, decodes each payload and publishes it to the hub.
//! - **Hub**: one control loop per process, the only writer of the session
//!   registry. Register, unregister and publish requests share one bounded
//!   queue and are applied one at a time, in arrival order.
//! - **Sessions**: each connection owns a bounded outbound queue, drained by a
//!   writer task, plus a reader task that only watches for closure.
//!
//! # Message Flow
//!
//! 1. Client upgrades `/ws/{project}`; a `Session` scoped to that project is
//!    registered with the hub before any task starts.
//! 2. A trigger fires `NOTIFY db_events, '{"schema": "shop", ...}'`.
//! 3. The listener decodes the payload and publishes a `ChangeEvent`.
//! 4. The hub offers the raw payload to every `shop` session without waiting.
//!    A session whose queue is full is evicted on the spot.
//! 5. Each writer forwards its queue to the socket as text frames.
//!
//! Events are ephemeral: a client that is not connected misses them.
//!
//! # Modules
//!
//! - `hub`: control loop and the cloneable `HubHandle`
//! - `registry`: dual-index session registry owned by the hub
//! - `session`: per-connection queue and the writer/reader task pair
//! - `listener`: `NotificationSource` trait, Postgres source and `ChangeListener`
//! - `message`: project/session identifiers, change events and registry stats
//! - `error`: realtime error kinds

pub mod error;
pub mod hub;
pub mod listener;
pub mod message;
pub mod registry;
pub mod session;

pub use error::{Error, ErrorKind};
pub use hub::{Hub, HubConfig, HubHandle};
pub use listener::{ChangeListener, NotificationSource, PgNotificationSource};
pub use message::{ChangeEvent, ProjectId, RegistryStats, SessionId};
pub use session::Session;
