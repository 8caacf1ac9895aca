//! Error types for the `realtime` crate.
//!
//! Follows the same layering as the rest of the workspace: a root `Error` struct
//! holding an `error_kind` tree and the optional underlying cause.
use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the realtime subsystem.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of failures the realtime subsystem can observe.
///
/// Only `ConnectionLost` is fatal to the change listener. Every other kind is
/// local to the notification or session that produced it.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A change notification payload could not be turned into a `ChangeEvent`.
    Decode(DecodeErrorKind),
    /// Subscribing to the notification channel failed.
    Subscribe,
    /// Waiting for the next notification failed; the wait may be retried.
    Wait,
    /// The dedicated notification connection is gone.
    ConnectionLost,
    /// The hub control loop is no longer accepting requests.
    HubClosed,
}

#[derive(Debug, PartialEq)]
pub enum DecodeErrorKind {
    InvalidJson,
    NotAnObject,
    MissingProject,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source(
        error_kind: ErrorKind,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }

    pub fn hub_closed() -> Self {
        Self::new(ErrorKind::HubClosed)
    }

    /// Whether the failed operation leaves its loop unable to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::ConnectionLost | ErrorKind::HubClosed
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Realtime Error: {:?}: {source}", self.error_kind),
            None => write!(f, "Realtime Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Decode(DecodeErrorKind::InvalidJson), err)
    }
}

// Database errors surfacing from a notification wait are treated as transient.
// Connection loss is reported separately by the notification source.
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::with_source(ErrorKind::Wait, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_loss_and_closed_hub_are_fatal() {
        assert!(Error::new(ErrorKind::ConnectionLost).is_fatal());
        assert!(Error::hub_closed().is_fatal());
        assert!(!Error::new(ErrorKind::Wait).is_fatal());
        assert!(!Error::new(ErrorKind::Subscribe).is_fatal());
        assert!(!Error::new(ErrorKind::Decode(DecodeErrorKind::MissingProject)).is_fatal());
    }

    #[test]
    fn test_json_errors_map_to_invalid_json_decode_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(
            err.error_kind,
            ErrorKind::Decode(DecodeErrorKind::InvalidJson)
        );
        assert!(err.source.is_some());
    }

    #[test]
    fn test_display_includes_source_message() {
        let err = Error::with_source(ErrorKind::Wait, "socket reset");
        assert_eq!(err.to_string(), "Realtime Error: Wait: socket reset");
    }
}
