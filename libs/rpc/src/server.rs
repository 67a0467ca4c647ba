use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use wirecall_fabric::codec::encode_frame;
use wirecall_fabric::config::ServerConfig;
use wirecall_fabric::{ConcurrentQueue, Envelope, Inbound, Supervisor, TcpServerTransport};

use crate::args::FromArguments;
use crate::error::{DispatchError, Result};
use crate::handler::Handler;
use crate::registry::MethodRegistry;

/// An RPC server that is listening but not yet serving.
///
/// Bind every method first, then [`start`](Self::start) it. Binding after
/// start is impossible since starting consumes the server.
///
/// ```no_run
/// use wirecall_fabric::codec::encode_frame;
/// use wirecall_fabric::config::ServerConfig;
/// use wirecall_rpc::Server;
///
/// let mut server = Server::new(ServerConfig::new().worker_threads(4))?;
/// server.bind("funcA", || 123)?;
/// server.bind("funcD", |a: i32| a + 1)?;
/// let handle = server.start()?;
/// # handle.shutdown()?;
/// # Ok::<(), wirecall_rpc::RpcError>(())
/// ```
pub struct Server {
    config: ServerConfig,
    registry: MethodRegistry,
    supervisor: Supervisor,
    transport: TcpServerTransport,
}

impl Server {
    /// Bind the listening socket. Connections are accepted right away but
    /// requests wait in the queue until the server is started.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let supervisor = Supervisor::new();
        let transport = TcpServerTransport::bind(&config, &supervisor)?;
        Ok(Self {
            config,
            registry: MethodRegistry::new(),
            supervisor,
            transport,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Bind `handler` under `method`; see [`MethodRegistry::bind`]
    pub fn bind<H, Args>(&mut self, method: impl Into<String>, handler: H) -> Result<()>
    where
        H: Handler<Args>,
        Args: FromArguments + 'static,
    {
        self.registry.bind(method, handler)
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Start the worker pool and return without blocking
    pub fn start(self) -> Result<ServerHandle> {
        let registry = Arc::new(self.registry);
        let transport = Arc::new(self.transport);
        let supervisor = self.supervisor;
        let workers = self.config.worker_threads;
        let max_frame_len = self.config.max_frame_len;

        for index in 0..workers {
            let registry = Arc::clone(&registry);
            let transport = Arc::clone(&transport);
            let inbound = transport.inbound();
            supervisor.spawn(format!("wirecall-worker-{index}"), move |token| {
                worker_loop(&inbound, &registry, &transport, &token, max_frame_len);
                Ok(())
            })?;
        }

        tracing::info!(
            addr = %transport.local_addr(),
            workers,
            methods = registry.len(),
            "server started"
        );

        Ok(ServerHandle {
            supervisor,
            transport,
            stopped: false,
        })
    }

    /// Start and block until the server stops on a fatal error
    pub fn run(self) -> Result<()> {
        self.start()?.wait()
    }
}

/// A running server.
///
/// Dropping the handle shuts the server down.
pub struct ServerHandle {
    supervisor: Supervisor,
    transport: Arc<TcpServerTransport>,
    stopped: bool,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn is_running(&self) -> bool {
        !self.supervisor.is_cancelled()
    }

    /// Why the server stopped on its own, if it did
    pub fn failure(&self) -> Option<String> {
        self.supervisor.failure()
    }

    /// Block until a background thread fails and brings the server down
    pub fn wait(mut self) -> Result<()> {
        self.stopped = true;
        self.supervisor.join()?;
        Ok(())
    }

    /// Stop accepting, close every connection and join all threads
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.supervisor.cancel();
        // the I/O thread may already be gone
        if let Err(e) = self.transport.wake() {
            tracing::trace!(error = %e, "could not wake I/O thread");
        }
        self.transport.inbound().notify_all();
        self.supervisor.join()?;
        tracing::info!("server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "server stopped after failure");
        }
    }
}

fn worker_loop(
    inbound: &ConcurrentQueue<Inbound>,
    registry: &MethodRegistry,
    transport: &TcpServerTransport,
    token: &CancellationToken,
    max_frame_len: usize,
) {
    while !token.is_cancelled() {
        let Some(Inbound {
            connection,
            envelope,
        }) = inbound.pop_blocking()
        else {
            if inbound.is_closed() {
                break;
            }
            continue;
        };

        match envelope {
            Envelope::Request {
                call_id,
                method,
                args,
            } => {
                let outcome = registry.dispatch(&method, &args);
                if let Err(e) = &outcome {
                    tracing::debug!(call_id, %method, error = %e, "call failed");
                }
                let frame = match respond(call_id, outcome, max_frame_len) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(call_id, %method, error = %e, "could not encode response");
                        continue;
                    }
                };
                if let Err(e) = transport.post(connection, frame) {
                    tracing::warn!(%connection, call_id, error = %e, "response dropped");
                }
            }
            Envelope::Response { call_id, .. } => {
                tracing::warn!(%connection, call_id, "server does not expect responses, discarding");
            }
            Envelope::Notification { method, .. } => {
                tracing::warn!(%connection, %method, "notifications are not implemented, skipping");
            }
        }
    }
    tracing::debug!("worker stopped");
}

/// Frame the response for one call.
///
/// A result whose envelope exceeds `max_frame_len` would make the peer drop
/// the whole connection, so it is replaced by an error response and the
/// caller still hears back.
fn respond(
    call_id: u32,
    outcome: std::result::Result<Option<Vec<u8>>, DispatchError>,
    max_frame_len: usize,
) -> wirecall_fabric::Result<Bytes> {
    let response = match outcome {
        Ok(result) => Envelope::success(call_id, result.unwrap_or_default()),
        Err(e) => Envelope::failure(call_id, &e.to_string())?,
    };
    let payload = response.encode()?;
    if payload.len() > max_frame_len {
        tracing::warn!(call_id, len = payload.len(), max_frame_len, "response too large");
        let message = format!("result too large: {} bytes", payload.len());
        return Envelope::failure(call_id, &message)?.to_frame();
    }
    encode_frame(&payload)
}
