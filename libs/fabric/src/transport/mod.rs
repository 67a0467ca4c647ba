use std::fmt;
use std::io::ErrorKind;

use crate::envelope::Envelope;

pub mod client;
pub mod server;

pub use self::client::TcpClientTransport;
pub use self::server::TcpServerTransport;

/// Identity of an accepted connection.
///
/// Never reused within one server, so a late response cannot be routed to a
/// different peer that happened to get the same socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<mio::Token> for ConnectionId {
    fn from(token: mio::Token) -> Self {
        Self(token.0 as u64)
    }
}

impl From<ConnectionId> for mio::Token {
    fn from(id: ConnectionId) -> Self {
        mio::Token(id.0 as usize)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An envelope received by the server, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub connection: ConnectionId,
    pub envelope: Envelope,
}

/// Errors that only mean "try again"
pub(crate) fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Errors that mean the peer went away
pub(crate) fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}
