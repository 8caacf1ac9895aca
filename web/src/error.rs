use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;
use realtime::ErrorKind as RealtimeErrorKind;
use sea_orm::DbErr;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: WebErrorKind,
}

/// The kinds of failures the HTTP layer reports to clients.
#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    /// A backing service (database, realtime hub) cannot serve requests right now.
    ServiceUnavailable,
    Internal,
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        warn!("Request failed: {self}");
        match self.error_kind {
            WebErrorKind::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
            }
            WebErrorKind::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: WebErrorKind::ServiceUnavailable,
        }
    }
}

impl From<realtime::Error> for Error {
    fn from(err: realtime::Error) -> Self {
        let error_kind = match err.error_kind {
            RealtimeErrorKind::HubClosed => WebErrorKind::ServiceUnavailable,
            _ => WebErrorKind::Internal,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
