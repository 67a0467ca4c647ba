use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use wirecall_fabric::{
    codec::encode_frame,
    config::{ClientConfig, ServerConfig},
    error::Error,
    ConnectionId, Envelope, Inbound, Popped, Supervisor, TcpClientTransport, TcpServerTransport,
};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper to start a server transport on a free port
fn start_server() -> (Supervisor, TcpServerTransport) {
    init_tracing();
    let supervisor = Supervisor::new();
    let config = ServerConfig::new()
        .port(0)
        .poll_interval(Duration::from_millis(50));
    let server = TcpServerTransport::bind(&config, &supervisor).unwrap();
    (supervisor, server)
}

fn next_inbound(server: &TcpServerTransport) -> Inbound {
    match server.inbound().pop_timeout(WAIT) {
        Popped::Item(inbound) => inbound,
        other => panic!("expected an inbound envelope, got {other:?}"),
    }
}

fn read_envelope(stream: &mut TcpStream) -> Envelope {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(prefix) as usize];
    stream.read_exact(&mut body).unwrap();
    Envelope::decode(&body).unwrap()
}

fn raw_connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    stream
}

#[test]
fn client_connect_refused_is_setup_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let supervisor = Supervisor::new();
    let result = TcpClientTransport::connect(&ClientConfig::new().socket_addr(addr), &supervisor);
    match result {
        Err(Error::Setup { context, .. }) => assert_eq!(context, "connect failed"),
        Err(other) => panic!("expected Setup error, got {other:?}"),
        Ok(_) => panic!("connect to a closed port succeeded"),
    }
}

#[test]
fn client_rejects_invalid_address() {
    let supervisor = Supervisor::new();
    let result = TcpClientTransport::connect(&ClientConfig::new().address("localhost:x"), &supervisor);
    assert!(matches!(result, Err(Error::InvalidAddress(_))));
}

#[test]
fn server_bind_conflict_is_setup_error() {
    let (_supervisor, server) = start_server();
    let other = Supervisor::new();
    let config = ServerConfig::new().port(server.local_addr().port());
    match TcpServerTransport::bind(&config, &other) {
        Err(Error::Setup { context, .. }) => assert_eq!(context, "bind failed"),
        Err(e) => panic!("expected Setup error, got {e:?}"),
        Ok(_) => panic!("second bind on the same port succeeded"),
    }
}

#[test]
fn request_is_tagged_and_reply_routed_back() {
    let (_server_sup, server) = start_server();
    let client_sup = Supervisor::new();
    let client = TcpClientTransport::connect(
        &ClientConfig::new().socket_addr(server.local_addr()),
        &client_sup,
    )
    .unwrap();

    let request = Envelope::request(1, "foo", vec![0x90]);
    client.post(&request.to_frame().unwrap()).unwrap();

    let inbound = next_inbound(&server);
    assert_eq!(inbound.envelope, request);

    let reply = Envelope::success(1, vec![0x2a]);
    server
        .post(inbound.connection, reply.to_frame().unwrap())
        .unwrap();

    match client.inbound().pop_timeout(WAIT) {
        Popped::Item(envelope) => assert_eq!(envelope, reply),
        other => panic!("expected reply, got {other:?}"),
    }
}

#[test]
fn preserves_boundaries_of_coalesced_and_split_frames() {
    let (_supervisor, server) = start_server();
    let mut stream = raw_connect(server.local_addr());

    let first = Envelope::request(1, "a", vec![0x90]);
    let second = Envelope::request(2, "b", vec![0x90]);
    let third = Envelope::request(3, "c", vec![0x91, 0x01]);

    // two frames in one write
    let mut both = first.to_frame().unwrap().to_vec();
    both.extend_from_slice(&second.to_frame().unwrap());
    stream.write_all(&both).unwrap();

    // one frame across two writes
    let frame = third.to_frame().unwrap();
    let (head, tail) = frame.split_at(5);
    stream.write_all(head).unwrap();
    stream.flush().unwrap();
    thread::sleep(Duration::from_millis(100));
    stream.write_all(tail).unwrap();

    let received: Vec<Inbound> = (0..3).map(|_| next_inbound(&server)).collect();
    assert_eq!(received[0].envelope, first);
    assert_eq!(received[1].envelope, second);
    assert_eq!(received[2].envelope, third);
    assert!(received.iter().all(|i| i.connection == received[0].connection));
}

#[test]
fn malformed_envelope_is_dropped_and_connection_kept() {
    let (_supervisor, server) = start_server();
    let mut stream = raw_connect(server.local_addr());

    let two_fields = rmp_serde_bytes(&(0u8, 5u32));
    stream.write_all(&encode_frame(&two_fields).unwrap()).unwrap();

    let notification = Envelope::Notification {
        method: "tick".into(),
        args: vec![0x90],
    };
    stream.write_all(&notification.to_frame().unwrap()).unwrap();

    let request = Envelope::request(6, "after", vec![0x90]);
    stream.write_all(&request.to_frame().unwrap()).unwrap();

    assert_eq!(next_inbound(&server).envelope, notification);
    let inbound = next_inbound(&server);
    assert_eq!(inbound.envelope, request);

    // the connection is still usable in both directions
    server
        .post(inbound.connection, Envelope::success(6, Vec::new()).to_frame().unwrap())
        .unwrap();
    assert_eq!(read_envelope(&mut stream), Envelope::success(6, Vec::new()));
}

#[test]
fn reply_to_closed_connection_is_dropped() {
    let (_supervisor, server) = start_server();

    let gone = {
        let mut stream = raw_connect(server.local_addr());
        stream
            .write_all(&Envelope::request(1, "x", vec![0x90]).to_frame().unwrap())
            .unwrap();
        next_inbound(&server).connection
    };
    thread::sleep(Duration::from_millis(200));

    server
        .post(gone, Envelope::success(1, Vec::new()).to_frame().unwrap())
        .unwrap();

    // the server keeps serving new peers, under a fresh identity
    let mut stream = raw_connect(server.local_addr());
    stream
        .write_all(&Envelope::request(2, "y", vec![0x90]).to_frame().unwrap())
        .unwrap();
    let inbound = next_inbound(&server);
    assert_ne!(inbound.connection, gone);
    assert!(!server.is_closed());
}

#[test]
fn oversized_frame_closes_only_that_connection() {
    let init = ServerConfig::new()
        .port(0)
        .max_frame_len(1024)
        .poll_interval(Duration::from_millis(50));
    init_tracing();
    let supervisor = Supervisor::new();
    let server = TcpServerTransport::bind(&init, &supervisor).unwrap();

    let mut bad = raw_connect(server.local_addr());
    bad.write_all(&u32::MAX.to_be_bytes()).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(bad.read(&mut buf).unwrap(), 0, "server should close the stream");

    let mut good = raw_connect(server.local_addr());
    let request = Envelope::request(1, "still-up", vec![0x90]);
    good.write_all(&request.to_frame().unwrap()).unwrap();
    assert_eq!(next_inbound(&server).envelope, request);
}

#[test]
fn client_reports_server_hangup() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let supervisor = Supervisor::new();
    let client =
        TcpClientTransport::connect(&ClientConfig::new().socket_addr(addr), &supervisor).unwrap();
    acceptor.join().unwrap();

    // the read thread closes the queue on its way out
    assert_eq!(client.inbound().pop_blocking(), None);
    match supervisor.join() {
        Err(Error::ThreadFailed { source, .. }) => {
            assert!(matches!(*source, Error::ConnectionClosed))
        }
        other => panic!("expected ThreadFailed, got {other:?}"),
    }
}

#[test]
fn shutdown_stops_the_io_thread() {
    let (supervisor, server) = start_server();
    let _peer = raw_connect(server.local_addr());

    supervisor.cancel();
    server.wake().unwrap();
    supervisor.join().unwrap();

    assert!(server.is_closed());
    assert!(server.inbound().pop_blocking().is_none());
}

/// Connect a raw peer and send one request so the server learns its id
fn introduce_peer(server: &TcpServerTransport) -> (TcpStream, ConnectionId) {
    let mut stream = raw_connect(server.local_addr());
    stream
        .write_all(&Envelope::request(1, "hello", vec![0x90]).to_frame().unwrap())
        .unwrap();
    (stream, next_inbound(server).connection)
}

#[test]
fn large_frame_reaches_slow_reader_intact() {
    let (_supervisor, server) = start_server();
    let (mut stream, connection) = introduce_peer(&server);

    let payload: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let reply = Envelope::success(1, payload);
    let frame = reply.to_frame().unwrap();
    let expected_len = frame.len();
    server.post(connection, frame).unwrap();

    // let the socket buffers fill before draining them in small steps
    thread::sleep(Duration::from_millis(200));
    let mut received = Vec::with_capacity(expected_len);
    let mut chunk = [0u8; 64 * 1024];
    while received.len() < expected_len {
        let n = stream.read(&mut chunk).unwrap();
        assert_ne!(n, 0, "server closed a connection that was still reading");
        received.extend_from_slice(&chunk[..n]);
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(received.len(), expected_len);
    assert_eq!(Envelope::decode(&received[4..]).unwrap(), reply);
    assert!(!server.is_closed());
}

#[test]
fn peer_that_never_reads_is_closed_after_write_timeout() {
    init_tracing();
    let supervisor = Supervisor::new();
    let config = ServerConfig::new()
        .port(0)
        .poll_interval(Duration::from_millis(50))
        .write_timeout(Duration::from_millis(300));
    let server = TcpServerTransport::bind(&config, &supervisor).unwrap();

    let (mut stuck, connection) = introduce_peer(&server);
    let frame = Envelope::success(1, vec![0u8; 32 * 1024 * 1024])
        .to_frame()
        .unwrap();
    let frame_len = frame.len();
    server.post(connection, frame).unwrap();

    thread::sleep(Duration::from_millis(1000));

    // whatever the kernel buffered is readable, then the stream ends
    let started = Instant::now();
    let mut total = 0;
    let mut chunk = [0u8; 64 * 1024];
    loop {
        match stuck.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
            Err(e) => panic!("expected the server to close the stream, got {e}"),
        }
        assert!(started.elapsed() < WAIT, "stalled stream was never closed");
    }
    assert!(total < frame_len, "the whole frame was delivered to a stalled peer");

    // other peers are unaffected
    let (mut good, id) = introduce_peer(&server);
    assert_ne!(id, connection);
    let reply = Envelope::success(1, vec![0x2a]);
    server.post(id, reply.to_frame().unwrap()).unwrap();
    assert_eq!(read_envelope(&mut good), reply);
    assert!(!server.is_closed());
}

fn rmp_serde_bytes<T: serde::Serialize>(value: &T) -> Vec<u8> {
    use wirecall_fabric::codec::{Codec, MsgPackCodec};
    MsgPackCodec.encode(value).unwrap()
}
