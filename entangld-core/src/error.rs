use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Wire-safe representation of an [`EntangldError`]. `receive()` packs one of these into
/// the dedicated [`crate::message::Message::Error`] reply when it cannot satisfy a request
/// it has already accepted.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct ErrorMessage {
    pub msg: String,
}

impl From<EntangldError> for ErrorMessage {
    fn from(value: EntangldError) -> Self {
        ErrorMessage {
            msg: format!("{value}"),
        }
    }
}

impl std::error::Error for ErrorMessage {}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.msg, f)
    }
}

#[derive(Debug, Clone)]
pub enum EntangldErrorType {
    /// Null/empty namespace, non-string path, or a non-callable `transmit` argument.
    InvalidArgument(String),

    /// A second `attach` at a namespace that is already registered.
    AlreadyAttached(String),

    /// `unsubscribe` found no matching non-pass-through link.
    NotFound(String),

    /// `unsubscribe_tree` left pass-through links behind that only their remote owner can remove.
    PartialFailure(String),

    /// A `set` would overwrite or shadow an attached mount.
    ConflictingMount(String),

    /// `push` against a non-sequence leaf, or `set` at the root with a non-mapping value.
    TypeError(String),

    /// `receive` was handed a message kind it does not recognize.
    ProtocolError(String),

    /// `receive` got an `event` message with no sender remote handle attached.
    MissingContext(String),
}

#[derive(Debug, Clone)]
pub struct EntangldError {
    pub kind: EntangldErrorType,
}

impl EntangldError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::InvalidArgument(msg.into()),
        }
    }

    pub fn already_attached(namespace: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::AlreadyAttached(namespace.into()),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::NotFound(what.into()),
        }
    }

    pub fn partial_failure(msg: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::PartialFailure(msg.into()),
        }
    }

    pub fn conflicting_mount(path: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::ConflictingMount(path.into()),
        }
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::TypeError(msg.into()),
        }
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::ProtocolError(msg.into()),
        }
    }

    pub fn missing_context(msg: impl Into<String>) -> Self {
        Self {
            kind: EntangldErrorType::MissingContext(msg.into()),
        }
    }
}

impl fmt::Display for EntangldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EntangldErrorType::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EntangldErrorType::AlreadyAttached(namespace) => write!(f, "namespace already attached: {namespace}"),
            EntangldErrorType::NotFound(what) => write!(f, "not found: {what}"),
            EntangldErrorType::PartialFailure(msg) => write!(f, "partial failure: {msg}"),
            EntangldErrorType::ConflictingMount(path) => {
                write!(f, "set at {path} conflicts with an attached mount")
            }
            EntangldErrorType::TypeError(msg) => write!(f, "type error: {msg}"),
            EntangldErrorType::ProtocolError(msg) => write!(f, "protocol error: {msg}"),
            EntangldErrorType::MissingContext(msg) => write!(f, "missing context: {msg}"),
        }
    }
}

impl std::error::Error for EntangldError {}

pub type Result<T> = std::result::Result<T, EntangldError>;
