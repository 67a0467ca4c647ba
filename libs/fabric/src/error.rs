use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Socket setup failed (socket creation, bind, listen or connect)
    #[error("{context}: {source}")]
    Setup {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Background thread `{thread}` failed: {source}")]
    ThreadFailed {
        thread: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Background thread `{thread}` panicked: {message}")]
    ThreadPanicked { thread: String, message: String },

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn setup(context: &'static str, source: std::io::Error) -> Self {
        Self::Setup { context, source }
    }

    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
