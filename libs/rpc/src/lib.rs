//! Remote procedure calls over the `wirecall-fabric` transport.
//!
//! A [`Server`] maps method names to plain Rust functions. A [`Client`] calls
//! them by name with a tuple of arguments and gets the typed result back,
//! either blocking or through a [`CallHandle`] that can also be awaited.
//!
//! ```no_run
//! use wirecall_fabric::config::{ClientConfig, ServerConfig};
//! use wirecall_rpc::{Client, Server};
//!
//! let mut server = Server::new(ServerConfig::new())?;
//! server.bind("funcD", |a: i32| a + 1)?;
//! let handle = server.start()?;
//!
//! let client = Client::connect(ClientConfig::new().socket_addr(handle.local_addr()))?;
//! let b: i32 = client.call("funcD", (41,))?;
//! assert_eq!(b, 42);
//! # Ok::<(), wirecall_rpc::RpcError>(())
//! ```

pub mod args;
pub mod client;
pub mod error;
pub mod handler;
mod pending;
pub mod registry;
pub mod reply;
pub mod server;

pub use args::{Arguments, FromArguments};
pub use client::{CallHandle, Client};
pub use error::{DispatchError, Result, RpcError};
pub use handler::Handler;
pub use registry::{MethodRegistry, Signature};
pub use reply::{IntoReply, Value};
pub use server::{Server, ServerHandle};
