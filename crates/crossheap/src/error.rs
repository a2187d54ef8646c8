//! Error types for boundary operations

use thiserror::Error;

use crate::tag::TypeTag;

/// Violations of the cross-heap reference protocol.
///
/// Apart from acquire/release races (which are logged, not raised), every
/// protocol error means the two registries no longer agree and the bridge
/// cannot safely continue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A tag code outside the closed kind set
    #[error("unknown type tag {0}")]
    UnknownTag(i32),

    /// A payload that is not a valid reference id
    #[error("malformed reference id {0}")]
    MalformedReference(f64),

    /// The reference id space is used up
    #[error("reference id space exhausted")]
    IdSpaceExhausted,

    /// A callback or shared buffer id that the host no longer knows
    #[error("received {tag} reference {id} that is no longer registered; it was collected while the script still referenced it")]
    SpecialReferenceCollected {
        /// Tag of the received reference
        tag: TypeTag,
        /// Reference id
        id: u64,
    },

    /// The Exception tag reached a place where a value was expected
    #[error("Exception tag cannot be decoded as a value")]
    ExceptionAsValue,

    /// An operation was attempted before `InitializeInternal`
    #[error("bridge used before initialization")]
    NotInitialized,

    /// `InitializeInternal` was called a second time
    #[error("bridge initialized twice")]
    AlreadyInitialized,

    /// A callback dispatch returned without a response
    #[error("callback response {response_id} was never delivered")]
    UnansweredCallback {
        /// Correlation id of the missing response
        response_id: u64,
    },

    /// A response arrived for an id with no outstanding slot
    #[error("no outstanding callback response {response_id}")]
    UnknownResponse {
        /// Correlation id of the stray response
        response_id: u64,
    },

    /// A second response arrived for an already answered slot
    #[error("callback response {response_id} was already delivered")]
    DuplicateResponse {
        /// Correlation id of the duplicate response
        response_id: u64,
    },

    /// The script runtime detected a protocol violation while serving a request
    #[error("script runtime reported a protocol violation: {0}")]
    ScriptViolation(String),

    /// The host runtime was poisoned by an earlier fatal error
    #[error("bridge is desynchronized after an earlier protocol error")]
    Desynchronized,
}

/// Main error type for bridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The script side threw while running the operation
    #[error("Script exception: {message}")]
    Script {
        /// Message text carried across the boundary
        message: String,
    },

    /// The script side failed without a message
    #[error("Unknown script exception in {operation}")]
    UnknownScript {
        /// Name of the boundary operation that failed
        operation: &'static str,
    },

    /// A value cannot become the requested native type
    #[error("Type error: cannot convert {from} to {to}")]
    Coercion {
        /// Kind of the value
        from: TypeTag,
        /// Requested native type
        to: &'static str,
    },

    /// A null-like value was requested as a non-optional native type
    #[error("Type error: null or undefined cannot be converted to {to}")]
    NullValue {
        /// Requested native type
        to: &'static str,
    },

    /// The script runtime speaks a different protocol
    #[error("Platform mismatch: expected protocol version {expected}, found {found}")]
    PlatformMismatch {
        /// Version this host implements
        expected: u32,
        /// Version the script runtime reported
        found: u32,
    },

    /// Reference protocol violation
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Operation not allowed on this value
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Nested callbacks went deeper than the configured limit
    #[error("Callback depth exceeded: {depth} (max: {max})")]
    CallDepthExceeded {
        /// Depth that was reached
        depth: usize,
        /// Configured maximum
        max: usize,
    },

    /// The bridge was shut down
    #[error("bridge has been shut down")]
    ShutDown,

    /// Invalid configuration input
    #[error("Config error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the error leaves the bridge in an unrecoverable state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Protocol(_) | BridgeError::PlatformMismatch { .. })
    }

    /// Build a coercion error
    pub fn coercion(from: TypeTag, to: &'static str) -> Self {
        BridgeError::Coercion { from, to }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// An error thrown inside the script engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Generic thrown error
    #[error("Error: {0}")]
    Error(String),

    /// Operation applied to a value of the wrong kind
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Lookup of something that does not exist
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Numeric argument out of range
    #[error("RangeError: {0}")]
    RangeError(String),

    /// A protocol violation. Its message starts with
    /// [`PROTOCOL_ERROR_PREFIX`] so the host can tell it apart from an
    /// ordinary thrown error.
    #[error("ProtocolError: {0}")]
    Protocol(String),
}

/// Message prefix marking a thrown [`ScriptError::Protocol`].
pub const PROTOCOL_ERROR_PREFIX: &str = "ProtocolError: ";

impl ScriptError {
    /// Create a generic error with a message
    pub fn new(message: impl Into<String>) -> Self {
        ScriptError::Error(message.into())
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        ScriptError::TypeError(message.into())
    }
}

impl From<ProtocolError> for ScriptError {
    fn from(err: ProtocolError) -> Self {
        ScriptError::Protocol(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
