//! Unified error handling for tawkd.
//!
//! Centralized error hierarchy for event processing, with automatic
//! conversions, client reply generation, and metric labeling.

use crate::db::DbError;
use crate::events::ServerEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while handling a client event.
#[derive(Debug, Error)]
pub enum EventError {
    /// Caller supplied ids that cannot form a valid pair (e.g. a
    /// self-addressed friend request).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Storage I/O failed. Aborts the current event; the event is not
    /// retried automatically.
    #[error("persistence failure: {0}")]
    Persistence(DbError),

    #[error("file storage failure: {0}")]
    Storage(String),

    #[error("send error: {0}")]
    Send(#[from] mpsc::error::SendError<ServerEvent>),

    /// Client requested connection close (the `end` event). Control flow,
    /// not a failure.
    #[error("connection ended by client")]
    End,
}

impl EventError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence_failure",
            Self::Storage(_) => "storage_failure",
            Self::Send(_) => "send_error",
            Self::End => "end",
        }
    }

    /// Convert to an `error` event for the initiating client.
    ///
    /// Returns `None` for errors that don't warrant a client-visible reply
    /// (send failures, the `end` control-flow marker).
    pub fn to_client_reply(&self, event_name: &str) -> Option<ServerEvent> {
        match self {
            Self::InvalidArgument(_) | Self::NotFound(_) | Self::Persistence(_) | Self::Storage(_) => {
                Some(ServerEvent::Error {
                    event: event_name.to_string(),
                    code: self.error_code().to_string(),
                    message: self.to_string(),
                })
            }
            Self::Send(_) | Self::End => None,
        }
    }
}

impl From<DbError> for EventError {
    fn from(err: DbError) -> Self {
        match err {
            // Caller mistakes, not storage faults
            DbError::SameParticipants => {
                EventError::InvalidArgument("participant ids must be distinct".to_string())
            }
            DbError::ParticipantMissing => EventError::NotFound("participant not found".to_string()),
            other => EventError::Persistence(other),
        }
    }
}

/// Result type for event handlers.
pub type EventResult = Result<(), EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(
            EventError::InvalidArgument("x".into()).error_code(),
            "invalid_argument"
        );
        assert_eq!(EventError::NotFound("x".into()).error_code(), "not_found");
        assert_eq!(EventError::End.error_code(), "end");
    }

    #[test]
    fn client_reply_policy() {
        let reply = EventError::NotFound("user u9".into()).to_client_reply("friend_request");
        match reply {
            Some(ServerEvent::Error { event, code, .. }) => {
                assert_eq!(event, "friend_request");
                assert_eq!(code, "not_found");
            }
            other => panic!("expected error reply, got {other:?}"),
        }

        // Control-flow markers don't generate replies
        assert!(EventError::End.to_client_reply("end").is_none());
    }

    #[test]
    fn same_participants_maps_to_invalid_argument() {
        let err: EventError = DbError::SameParticipants.into();
        assert_eq!(err.error_code(), "invalid_argument");

        let err: EventError = DbError::Internal("boom".into()).into();
        assert_eq!(err.error_code(), "persistence_failure");
    }
}
