use crate::dynamic::FieldError;
use crate::legacy::LegacyError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which representation an envelope's buffer holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BufferKind {
    Protobuf,
    Legacy,
}

/// Transport-level delivery failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("no receiver is attached to the transport")]
    Disconnected,

    #[error("invalid key expression '{0}'")]
    KeyExpr(String),

    #[error("zenoh: {0}")]
    Zenoh(String),
}

/// Why a `send` was rejected as a whole.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendFailure {
    #[error("recipient set is empty")]
    NoRecipients,

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Legacy(#[from] LegacyError),

    #[error("unknown user message type '{0}'")]
    UnknownMessageType(String),

    #[error("no user message registered with index {0}")]
    UnknownMessageIndex(i32),

    #[error("message index {index} is already registered as '{existing}'")]
    DuplicateMessageIndex { index: i32, existing: String },

    #[error("user message '{message}' has a {found} buffer, not {expected}")]
    BufferKindMismatch {
        message: String,
        expected: BufferKind,
        found: BufferKind,
    },

    #[error("failed to send '{message}': {reason}")]
    SendFailed {
        message: String,
        #[source]
        reason: SendFailure,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("zenoh: {0}")]
    Zenoh(String),
}

impl From<zenoh::Error> for Error {
    fn from(e: zenoh::Error) -> Self {
        Error::Zenoh(e.to_string())
    }
}
