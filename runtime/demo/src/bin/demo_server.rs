use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use wirecall_demo::{config, methods, DemoError};
use wirecall_rpc::Server;

fn main() -> Result<(), DemoError> {
    wirecall_demo::init_tracing();
    let cfg = config::load(wirecall_demo::config_path().as_deref())?;

    let last = Arc::new(AtomicI32::new(0));
    let mut server = Server::new(cfg.server)?;
    methods::bind_all(&mut server, Arc::clone(&last))?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let handle = server.start()?;
    tracing::info!(addr = %handle.local_addr(), "demo server running, Ctrl-C to stop");

    while handle.is_running() {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(failure) = handle.failure() {
        tracing::error!(%failure, "server failed");
    }
    tracing::info!(last_func_d = last.load(Ordering::SeqCst), "shutting down");
    handle.shutdown()?;
    Ok(())
}
