use crate::error::{DecodeErrorKind, Error, ErrorKind};
use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// JSON field of a change notification that names the target project.
pub const PROJECT_FIELD: &str = "schema";

/// Frame payload handed to sessions. Clones share the same buffer, so fanning
/// one event out to many sessions does not copy it.
pub type Payload = Utf8Bytes;

/// Tenant namespace name, used as the broadcast routing key.
///
/// Compared case-sensitively and never re-validated here; the admin layer that
/// creates project schemas owns validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Unique identifier for a realtime session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A database change routed to every session of one project.
///
/// Ephemeral: never persisted, and dropped when nobody is subscribed.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub project: ProjectId,
    pub payload: Payload,
}

impl ChangeEvent {
    pub fn new(project: impl Into<ProjectId>, payload: impl Into<Payload>) -> Self {
        Self {
            project: project.into(),
            payload: payload.into(),
        }
    }

    /// Builds an event from a raw notification payload.
    ///
    /// The payload must be a JSON object with a string `schema` field. The raw
    /// text is forwarded verbatim, so subscribers see every other field exactly
    /// as the database trigger emitted it.
    pub fn from_notification(raw: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::new(ErrorKind::Decode(DecodeErrorKind::NotAnObject)))?;
        let project = object
            .get(PROJECT_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::new(ErrorKind::Decode(DecodeErrorKind::MissingProject)))?;

        Ok(Self::new(project, raw.to_owned()))
    }
}

/// Point-in-time view of the hub registry: live session count per project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub sessions: usize,
    pub projects: BTreeMap<ProjectId, usize>,
}

impl RegistryStats {
    pub fn sessions_in(&self, project: &ProjectId) -> usize {
        self.projects.get(project).copied().unwrap_or(0)
    }
}
