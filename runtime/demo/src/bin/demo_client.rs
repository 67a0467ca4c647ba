use std::time::Instant;

use wirecall_demo::{config, DemoError};
use wirecall_rpc::Client;

fn main() -> Result<(), DemoError> {
    wirecall_demo::init_tracing();
    let cfg = config::load(wirecall_demo::config_path().as_deref())?;

    let client = Client::connect(cfg.client)?;

    for flag in [false, true] {
        let started = Instant::now();
        let outcome = client.call::<i32, _>("foo", (1, flag, "Hello, World", 3.5, vec![5, 6]));
        let elapsed = started.elapsed();
        match outcome {
            Ok(value) => tracing::info!(flag, value, ?elapsed, "foo returned"),
            Err(e) if e.is_remote() => tracing::warn!(flag, error = %e, ?elapsed, "foo failed"),
            Err(e) => return Err(e.into()),
        }
    }

    let started = Instant::now();
    let value: i32 = client.call("funcA", ())?;
    tracing::info!(value, elapsed = ?started.elapsed(), "funcA returned");

    client.call::<(), _>("funcD", (41,))?;
    client.shutdown()?;
    Ok(())
}
