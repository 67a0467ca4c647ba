use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use wirecall_fabric::codec::msgpack::NIL;
use wirecall_fabric::codec::{Codec, MsgPackCodec};
use wirecall_fabric::config::ClientConfig;
use wirecall_fabric::{ConcurrentQueue, Envelope, Popped, Supervisor, TcpClientTransport};

use crate::args::Arguments;
use crate::error::{Result, RpcError};
use crate::pending::{Outcome, PendingCalls};

/// Upper bound on how long an overdue call can go unnoticed
const MAX_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Result of an in-flight call.
///
/// Either block on it with [`wait`](Self::wait) or `.await` it.
#[derive(Debug)]
pub struct CallHandle<R> {
    call_id: u32,
    rx: oneshot::Receiver<Result<R>>,
}

impl<R> CallHandle<R> {
    pub fn call_id(&self) -> u32 {
        self.call_id
    }

    /// Block the current thread until the call resolves.
    ///
    /// Must not be used from inside an async runtime; await the handle there.
    pub fn wait(self) -> Result<R> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(RpcError::ConnectionLost))
    }

    /// The result if it is already in, without blocking
    pub fn try_result(&mut self) -> Option<Result<R>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(RpcError::ConnectionLost)),
        }
    }
}

impl<R> Future for CallHandle<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RpcError::ConnectionLost)))
    }
}

/// RPC client over one TCP connection.
///
/// Calls may be issued from any number of threads. Responses are matched to
/// calls by id on a dedicated dispatch thread, so they may arrive in any
/// order.
///
/// ```no_run
/// use wirecall_fabric::config::ClientConfig;
/// use wirecall_rpc::Client;
///
/// let client = Client::connect(ClientConfig::new())?;
/// let answer: i32 = client.call("foo", (1, false, "Hello, World", 3.5, vec![5, 6]))?;
/// # Ok::<(), wirecall_rpc::RpcError>(())
/// ```
pub struct Client {
    transport: TcpClientTransport,
    supervisor: Supervisor,
    pending: Arc<PendingCalls>,
    next_call_id: AtomicU32,
    call_timeout: Option<Duration>,
    stopped: bool,
}

impl Client {
    /// Connect to the server and start the read and dispatch threads
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let supervisor = Supervisor::new();
        let transport = TcpClientTransport::connect(&config, &supervisor)?;
        let pending = Arc::new(PendingCalls::new());
        let call_timeout = config.call_timeout_duration();

        let inbound = transport.inbound();
        let table = Arc::clone(&pending);
        let sweep = call_timeout.map(|t| t.min(MAX_SWEEP_INTERVAL));
        supervisor.spawn("wirecall-dispatch", move |token| {
            dispatch_loop(&inbound, &table, &token, sweep);
            Ok(())
        })?;

        tracing::info!(peer = %transport.peer_addr(), "client connected");

        Ok(Self {
            transport,
            supervisor,
            pending,
            next_call_id: AtomicU32::new(0),
            call_timeout,
            stopped: false,
        })
    }

    /// Send a call and return immediately with a handle to its result
    pub fn async_call<R, A>(&self, method: &str, args: A) -> Result<CallHandle<R>>
    where
        R: DeserializeOwned + Send + 'static,
        A: Arguments,
    {
        let payload = args.pack().map_err(|e| RpcError::Encode(e.to_string()))?;
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let deadline = self.call_timeout.map(|t| Instant::now() + t);

        let (tx, rx) = oneshot::channel();
        self.pending.register(
            call_id,
            deadline,
            Box::new(move |outcome: Outcome| {
                // the caller may have dropped its handle
                let _ = tx.send(outcome.and_then(|bytes| decode_result(&bytes)));
            }),
        )?;

        let sent = Envelope::request(call_id, method, payload)
            .to_frame()
            .and_then(|frame| self.transport.post(&frame));
        if let Err(e) = sent {
            self.pending.remove(call_id);
            return Err(match e {
                wirecall_fabric::Error::ConnectionClosed => RpcError::ConnectionLost,
                other => other.into(),
            });
        }

        tracing::trace!(call_id, method, "request sent");
        Ok(CallHandle { call_id, rx })
    }

    /// Send a call and block until its result arrives
    pub fn call<R, A>(&self, method: &str, args: A) -> Result<R>
    where
        R: DeserializeOwned + Send + 'static,
        A: Arguments,
    {
        self.async_call(method, args)?.wait()
    }

    /// Number of calls still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn is_connected(&self) -> bool {
        !self.supervisor.is_cancelled() && !self.pending.is_closed()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.transport.peer_addr()
    }

    /// Why the connection dropped, if it did
    pub fn failure(&self) -> Option<String> {
        self.supervisor.failure()
    }

    /// Close the connection and join the background threads.
    ///
    /// Calls still pending fail with [`RpcError::ConnectionLost`]. Returns
    /// the error that stopped a background thread, if any did.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.supervisor.cancel();
        self.transport.shutdown();
        self.supervisor.join()?;
        tracing::debug!("client stopped");
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::debug!(error = %e, "client stopped after failure");
        }
    }
}

fn decode_result<R: DeserializeOwned>(bytes: &[u8]) -> Result<R> {
    // an empty slot is a method without a value
    let bytes = if bytes.is_empty() { NIL } else { bytes };
    MsgPackCodec
        .decode(bytes)
        .map_err(|e| RpcError::Decode(e.to_string()))
}

fn dispatch_loop(
    inbound: &ConcurrentQueue<Envelope>,
    pending: &PendingCalls,
    token: &CancellationToken,
    sweep: Option<Duration>,
) {
    loop {
        let next = match sweep {
            Some(interval) => inbound.pop_timeout(interval),
            None => match inbound.pop_blocking() {
                Some(envelope) => Popped::Item(envelope),
                None if inbound.is_closed() => Popped::Closed,
                None => Popped::Notified,
            },
        };

        match next {
            Popped::Item(envelope) => handle_envelope(envelope, pending),
            Popped::Closed => break,
            Popped::Notified if token.is_cancelled() => break,
            Popped::Notified | Popped::TimedOut => {}
        }

        if sweep.is_some() {
            pending.expire(Instant::now());
        }
    }

    let lost = pending.close(|| RpcError::ConnectionLost);
    if lost > 0 {
        tracing::warn!(calls = lost, "connection lost with calls pending");
    }
    tracing::debug!("dispatch thread stopped");
}

fn handle_envelope(envelope: Envelope, pending: &PendingCalls) {
    match envelope {
        Envelope::Response {
            call_id,
            error,
            result,
        } => {
            let outcome = if error.is_empty() {
                Ok(result)
            } else {
                match MsgPackCodec.decode::<String>(&error) {
                    Ok(message) => Err(RpcError::Remote(message)),
                    Err(e) => Err(RpcError::Decode(format!("unreadable error slot: {e}"))),
                }
            };
            if !pending.complete(call_id, outcome) {
                tracing::warn!(call_id, "could not find pending call, discarding response");
            }
        }
        Envelope::Notification { method, .. } => {
            tracing::warn!(%method, "notifications are not implemented, skipping");
        }
        Envelope::Request {
            call_id, method, ..
        } => {
            tracing::warn!(call_id, %method, "client does not serve requests, discarding");
        }
    }
}
