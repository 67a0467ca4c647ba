use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::codec::FrameDecoder;
use crate::config::ClientConfig;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::queue::ConcurrentQueue;
use crate::supervisor::Supervisor;
use crate::transport::{is_disconnect, is_transient};

const READ_CHUNK: usize = 8 * 1024;

/// One blocking TCP connection to a server.
///
/// A supervised read thread decodes envelopes off the socket and pushes them
/// onto [`inbound`](Self::inbound). Writes happen synchronously on the
/// caller's thread.
pub struct TcpClientTransport {
    writer: Mutex<TcpStream>,
    control: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    inbound: Arc<ConcurrentQueue<Envelope>>,
}

impl TcpClientTransport {
    /// Connect and start the read thread on `supervisor`
    pub fn connect(config: &ClientConfig, supervisor: &Supervisor) -> Result<Self> {
        config.validate()?;
        let addr = config.resolve()?;

        let stream = TcpStream::connect(addr).map_err(|e| Error::setup("connect failed", e))?;
        stream
            .set_nodelay(config.nodelay)
            .map_err(|e| Error::setup("setting TCP_NODELAY failed", e))?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let reader = stream
            .try_clone()
            .map_err(|e| Error::setup("cloning socket failed", e))?;
        let control = stream
            .try_clone()
            .map_err(|e| Error::setup("cloning socket failed", e))?;

        let inbound = Arc::new(ConcurrentQueue::new());
        let queue = Arc::clone(&inbound);
        let max_frame_len = config.max_frame_len;
        supervisor.spawn("wirecall-read", move |token| {
            let result = read_loop(reader, &queue, &token, max_frame_len);
            // wakes the dispatch thread whatever the reason we stopped
            queue.close();
            result
        })?;

        tracing::debug!(peer = %peer_addr, local = %local_addr, "connected");

        Ok(Self {
            writer: Mutex::new(stream),
            control,
            peer_addr,
            local_addr,
            inbound,
        })
    }

    /// Envelopes decoded by the read thread
    pub fn inbound(&self) -> Arc<ConcurrentQueue<Envelope>> {
        Arc::clone(&self.inbound)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Write a complete frame, retrying on interruption.
    ///
    /// Concurrent callers are serialized so frames never interleave.
    pub fn post(&self, frame: &[u8]) -> Result<()> {
        let mut stream = self.writer.lock();
        let mut sent = 0;
        while sent < frame.len() {
            match stream.write(&frame[sent..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => sent += n,
                Err(e) if is_transient(e.kind()) => {
                    tracing::trace!(error = %e, "write interrupted, retrying");
                }
                Err(e) if is_disconnect(e.kind()) => return Err(Error::ConnectionClosed),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Shut the socket down in both directions, unblocking the read thread
    pub fn shutdown(&self) {
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            tracing::trace!(error = %e, "socket already shut down");
        }
    }
}

impl Drop for TcpClientTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(
    mut stream: TcpStream,
    queue: &ConcurrentQueue<Envelope>,
    token: &CancellationToken,
    max_frame_len: usize,
) -> Result<()> {
    let mut decoder = FrameDecoder::new(max_frame_len);
    let mut buf = [0u8; READ_CHUNK];

    while !token.is_cancelled() {
        match stream.read(&mut buf) {
            Ok(0) => {
                if token.is_cancelled() {
                    break;
                }
                return Err(Error::ConnectionClosed);
            }
            Ok(n) => {
                decoder.extend(&buf[..n]);
                while let Some(frame) = decoder.next_frame()? {
                    match Envelope::decode(&frame) {
                        Ok(envelope) => queue.push(envelope),
                        Err(e) => {
                            tracing::warn!(error = %e, "invalid message format, discarding")
                        }
                    }
                }
            }
            Err(e) if is_transient(e.kind()) => continue,
            Err(e) => {
                if token.is_cancelled() {
                    break;
                }
                if is_disconnect(e.kind()) {
                    return Err(Error::ConnectionClosed);
                }
                return Err(e.into());
            }
        }
    }

    tracing::debug!("read thread stopped");
    Ok(())
}
