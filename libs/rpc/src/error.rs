use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] wirecall_fabric::Error),

    /// The server answered with an error; carries its message text
    #[error("{0}")]
    Remote(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Method `{0}` already bound")]
    AlreadyBound(String),

    /// A call id was reused while its previous call was still pending
    #[error("Call id {0} is still pending")]
    CallIdCollision(u32),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Call {call_id} got no response before its deadline")]
    DeadlineExceeded { call_id: u32 },
}

impl RpcError {
    /// True if the server answered and the error came from its side
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Why the server could not produce a result for a request.
///
/// The `Display` text is what travels back in the error slot of the response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("wrong argument count for `{method}`: expected {expected}, got {got}")]
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid arguments for `{method}`: {reason}")]
    BadArguments { method: String, reason: String },

    /// The handler returned an error; carries its message verbatim
    #[error("{0}")]
    Failed(String),

    #[error("method `{method}` panicked: {message}")]
    Panicked { method: String, message: String },

    #[error("failed to encode result: {0}")]
    Encode(String),
}
