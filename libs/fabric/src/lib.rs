//! Wirecall Fabric - Low-level transport and codec layer
//!
//! Provides the pieces an RPC engine is built from: a blocking concurrent
//! queue, the MessagePack codec boundary and length-prefix framing, the
//! request/response envelope, and thread-based TCP transports (a blocking
//! client connection and a readiness-polling server).
//!
//! # Example
//!
//! ```no_run
//! use wirecall_fabric::{
//!     config::{ClientConfig, ServerConfig},
//!     Envelope, Supervisor, TcpClientTransport, TcpServerTransport,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Supervisor::new();
//! let server = TcpServerTransport::bind(&ServerConfig::new().port(0), &supervisor)?;
//!
//! let client = TcpClientTransport::connect(
//!     &ClientConfig::new().socket_addr(server.local_addr()),
//!     &supervisor,
//! )?;
//! client.post(&Envelope::request(0, "ping", vec![0x90]).to_frame()?)?;
//!
//! let inbound = server.inbound().pop_blocking();
//! # let _ = inbound;
//! supervisor.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use envelope::{Envelope, MessageKind};
pub use error::{Error, Result};
pub use queue::{ConcurrentQueue, Popped};
pub use supervisor::Supervisor;
pub use transport::{ConnectionId, Inbound, TcpClientTransport, TcpServerTransport};
