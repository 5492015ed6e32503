//! Repository error taxonomy.

use astron_config::ConfigError;
use astron_dc::{ClassId, ParseError};
use astron_net::{ConnectionError, DatagramError, DoId};

use crate::config::Protocol;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("schema error: {0}")]
    Parse(#[from] ParseError),

    #[error("malformed datagram: {0}")]
    Datagram(#[from] DatagramError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An internal-only message was requested on a client connection.
    #[error("client repository may not send {operation}")]
    SuspiciousClientBehavior { operation: &'static str },

    /// A client-only message was requested on an internal connection.
    #[error("{operation} is not available on a {protocol:?} repository")]
    ProtocolMismatch {
        operation: &'static str,
        protocol: Protocol,
    },

    #[error("unknown class '{0}'")]
    ClassNotFound(String),

    #[error("unknown class id {0}")]
    ClassIdNotFound(ClassId),

    #[error("no live object {0}")]
    ObjectNotFound(DoId),

    #[error("no view '{view}' registered for class '{class}'")]
    ViewNotFound { class: String, view: String },

    #[error("view name '{0}' has an unknown role suffix")]
    InvalidViewRole(String),

    #[error("class '{class}' has no field {field}")]
    FieldNotFound { class: String, field: String },

    #[error("unknown struct '{0}'")]
    StructNotFound(String),

    #[error("expected {expected}, got {found}")]
    ValueMismatch { expected: String, found: String },

    #[error("poll rate must be a positive number of hertz, got {0}")]
    InvalidPollRate(f64),

    /// Raised by application view code.
    #[error("view of object {do_id} failed: {reason}")]
    View { do_id: DoId, reason: String },
}

impl RepositoryError {
    /// Whether an error raised while dispatching an inbound datagram should stop
    /// the repository.
    ///
    /// Truncated datagrams and unknown objects are dropped. An unknown class or
    /// field id means the cluster runs a different schema.
    pub fn is_fatal(&self) -> bool {
        match self {
            RepositoryError::Datagram(_)
            | RepositoryError::ObjectNotFound(_)
            | RepositoryError::ViewNotFound { .. }
            | RepositoryError::ValueMismatch { .. }
            | RepositoryError::View { .. } => false,
            RepositoryError::Connection(e) => !e.is_terminal(),
            _ => true,
        }
    }
}
