use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use tokio_util::sync::CancellationToken;

use crate::codec::FrameDecoder;
use crate::config::ServerConfig;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::queue::ConcurrentQueue;
use crate::supervisor::Supervisor;
use crate::transport::{is_disconnect, ConnectionId, Inbound};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

const READ_CHUNK: usize = 8 * 1024;
const EVENTS_CAPACITY: usize = 256;

struct Outbound {
    connection: ConnectionId,
    frame: Bytes,
}

/// Listening socket plus the I/O thread that multiplexes every accepted
/// connection.
///
/// The I/O thread is the only owner of connections: it accepts them, reads
/// them, writes queued responses to them and closes them. Other threads refer
/// to a connection by [`ConnectionId`] only.
pub struct TcpServerTransport {
    local_addr: SocketAddr,
    inbound: Arc<ConcurrentQueue<Inbound>>,
    outbound: Arc<ConcurrentQueue<Outbound>>,
    waker: Arc<Waker>,
}

impl TcpServerTransport {
    /// Bind, listen and start the I/O thread on `supervisor`
    pub fn bind(config: &ServerConfig, supervisor: &Supervisor) -> Result<Self> {
        config.validate()?;
        let addr = config.resolve()?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| Error::setup("socket creation failed", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::setup("setting SO_REUSEADDR failed", e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| Error::setup("bind failed", e))?;
        socket
            .listen(config.backlog)
            .map_err(|e| Error::setup("listen failed", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::setup("setting O_NONBLOCK failed", e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let local_addr = std_listener.local_addr()?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(|e| Error::setup("creating poll instance failed", e))?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|e| Error::setup("registering listener failed", e))?;
        let waker = Arc::new(
            Waker::new(poll.registry(), WAKER)
                .map_err(|e| Error::setup("creating waker failed", e))?,
        );

        let inbound = Arc::new(ConcurrentQueue::new());
        let outbound = Arc::new(ConcurrentQueue::new());

        let mut io = IoLoop {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            inbound: Arc::clone(&inbound),
            outbound: Arc::clone(&outbound),
            poll_interval: config.poll_interval_duration(),
            write_timeout: config.write_timeout_duration(),
            max_frame_len: config.max_frame_len,
        };
        supervisor.spawn("wirecall-io", move |token| {
            let result = io.run(&token);
            io.close_all();
            result
        })?;

        tracing::info!(%local_addr, backlog = config.backlog, "listening");

        Ok(Self {
            local_addr,
            inbound,
            outbound,
            waker,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Envelopes received from every connection, tagged with their origin
    pub fn inbound(&self) -> Arc<ConcurrentQueue<Inbound>> {
        Arc::clone(&self.inbound)
    }

    /// Queue `frame` for delivery to `connection`.
    ///
    /// Delivery is best effort: if the connection is gone by the time the
    /// I/O thread gets to it the frame is dropped and logged.
    pub fn post(&self, connection: ConnectionId, frame: Bytes) -> Result<()> {
        if self.outbound.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.outbound.push(Outbound { connection, frame });
        self.waker.wake()?;
        Ok(())
    }

    /// Interrupt the current readiness wait, e.g. so a cancellation is seen
    /// without waiting for the poll interval
    pub fn wake(&self) -> Result<()> {
        self.waker.wake()?;
        Ok(())
    }

    /// True once the I/O thread has stopped
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

enum Liveness {
    Open,
    Closed(&'static str),
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
    /// Frames not yet fully written; the front one may be partially sent
    pending: VecDeque<Bytes>,
    stalled_since: Option<Instant>,
    wants_write: bool,
}

impl Connection {
    /// Read until the socket would block, pushing every complete envelope.
    ///
    /// Readiness is edge-triggered, so stopping early would lose the wake-up
    /// for the bytes left behind.
    fn read_available(
        &mut self,
        id: ConnectionId,
        inbound: &ConcurrentQueue<Inbound>,
    ) -> io::Result<Liveness> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(Liveness::Closed("closed by peer")),
                Ok(n) => {
                    self.decoder.extend(&buf[..n]);
                    loop {
                        match self.decoder.next_frame() {
                            Ok(Some(frame)) => match Envelope::decode(&frame) {
                                Ok(envelope) => inbound.push(Inbound {
                                    connection: id,
                                    envelope,
                                }),
                                Err(e) => tracing::warn!(
                                    connection = %id,
                                    error = %e,
                                    "invalid message format, discarding"
                                ),
                            },
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!(connection = %id, error = %e, "unrecoverable framing error");
                                return Ok(Liveness::Closed("invalid frame"));
                            }
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Liveness::Open),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(e.kind()) => return Ok(Liveness::Closed("reset by peer")),
                Err(e) => return Err(e),
            }
        }
    }

    /// Write queued frames until done or the socket stops accepting bytes
    fn flush(&mut self) -> io::Result<Liveness> {
        while let Some(front) = self.pending.front_mut() {
            match self.stream.write(front) {
                Ok(0) => return Ok(Liveness::Closed("write returned zero")),
                Ok(n) => {
                    self.stalled_since = None;
                    if n == front.len() {
                        self.pending.pop_front();
                    } else {
                        front.advance(n);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.stalled_since.get_or_insert_with(Instant::now);
                    return Ok(Liveness::Open);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(e.kind()) => return Ok(Liveness::Closed("reset by peer")),
                Err(e) => return Err(e),
            }
        }
        self.stalled_since = None;
        Ok(Liveness::Open)
    }
}

struct IoLoop {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    inbound: Arc<ConcurrentQueue<Inbound>>,
    outbound: Arc<ConcurrentQueue<Outbound>>,
    poll_interval: Duration,
    write_timeout: Duration,
    max_frame_len: usize,
}

impl IoLoop {
    fn run(&mut self, token: &CancellationToken) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        tracing::debug!("I/O thread started");

        while !token.is_cancelled() {
            if let Err(e) = self.poll.poll(&mut events, Some(self.poll_interval)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept()?,
                    WAKER => {}
                    conn => self.connection_event(conn, event.is_readable(), event.is_writable())?,
                }
            }

            self.drain_outbound();
            self.close_stalled();
        }

        tracing::debug!("I/O thread finished");
        Ok(())
    }

    fn accept(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "could not set TCP_NODELAY");
                    }
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;

                    tracing::debug!(connection = %ConnectionId::from(token), %peer, "client connected");
                    self.connections.insert(
                        token,
                        Connection {
                            stream,
                            peer,
                            decoder: FrameDecoder::new(self.max_frame_len),
                            pending: VecDeque::new(),
                            stalled_since: None,
                            wants_write: false,
                        },
                    );
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // peer gave up between SYN and accept
                Err(e) if is_disconnect(e.kind()) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn connection_event(&mut self, token: Token, readable: bool, writable: bool) -> Result<()> {
        let id = ConnectionId::from(token);

        if readable {
            let Some(conn) = self.connections.get_mut(&token) else {
                return Ok(());
            };
            match conn.read_available(id, &self.inbound)? {
                Liveness::Open => {}
                Liveness::Closed(reason) => {
                    self.close(token, reason);
                    return Ok(());
                }
            }
        }

        if writable {
            self.flush(token);
        }
        Ok(())
    }

    /// Move responses posted by workers onto their connections and try to
    /// write them right away
    fn drain_outbound(&mut self) {
        let mut touched = HashSet::new();
        while let Some(Outbound { connection, frame }) = self.outbound.try_pop() {
            let token = Token::from(connection);
            match self.connections.get_mut(&token) {
                Some(conn) => {
                    conn.pending.push_back(frame);
                    touched.insert(token);
                }
                None => tracing::warn!(%connection, "connection closed, message lost"),
            }
        }
        for token in touched {
            self.flush(token);
        }
    }

    fn flush(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let reason = match conn.flush() {
            Ok(Liveness::Open) => {
                let wants_write = !conn.pending.is_empty();
                if wants_write != conn.wants_write {
                    let interest = if wants_write {
                        Interest::READABLE | Interest::WRITABLE
                    } else {
                        Interest::READABLE
                    };
                    match self
                        .poll
                        .registry()
                        .reregister(&mut conn.stream, token, interest)
                    {
                        Ok(()) => {
                            conn.wants_write = wants_write;
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(connection = %ConnectionId::from(token), error = %e, "reregister failed");
                            "reregister failed"
                        }
                    }
                } else {
                    return;
                }
            }
            Ok(Liveness::Closed(reason)) => reason,
            Err(e) => {
                tracing::warn!(connection = %ConnectionId::from(token), error = %e, "write failed");
                "write failed"
            }
        };
        self.close(token, reason);
    }

    fn close_stalled(&mut self) {
        let timeout = self.write_timeout;
        let stalled: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.stalled_since.is_some_and(|t| t.elapsed() >= timeout))
            .map(|(token, _)| *token)
            .collect();
        for token in stalled {
            tracing::warn!(connection = %ConnectionId::from(token), ?timeout, "write stalled");
            self.close(token, "write timeout");
        }
    }

    fn close(&mut self, token: Token, reason: &'static str) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        let id = ConnectionId::from(token);
        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            tracing::trace!(connection = %id, error = %e, "deregister failed");
        }
        if !conn.pending.is_empty() {
            tracing::warn!(
                connection = %id,
                dropped = conn.pending.len(),
                "connection closed with undelivered messages"
            );
        }
        tracing::debug!(connection = %id, peer = %conn.peer, reason, "connection closed");
    }

    /// Release every connection and stop accepting work in both directions
    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close(token, "server shutting down");
        }
        self.outbound.close();
        self.inbound.close();
    }
}
