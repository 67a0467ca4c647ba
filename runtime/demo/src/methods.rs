//! Methods served by `demo-server`.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use wirecall_rpc::Server;

pub fn foo(a: i32, b: bool, c: String, d: f64, e: Vec<i32>) -> Result<i32, String> {
    tracing::info!(a, b, %c, d, ?e, "foo called");
    if b {
        return Err("true is not good".to_string());
    }
    Ok(42)
}

pub fn func_a() -> i32 {
    123
}

pub fn func_b(a: i32) {
    tracing::info!(a, "funcB called");
}

pub fn func_c() {
    tracing::info!("funcC called");
}

/// Bind every demo method; `funcD` stores `a + 1` into `last`
pub fn bind_all(server: &mut Server, last: Arc<AtomicI32>) -> wirecall_rpc::Result<()> {
    server.bind("foo", foo)?;
    server.bind("funcA", func_a)?;
    server.bind("funcB", func_b)?;
    server.bind("funcC", func_c)?;
    server.bind("funcD", move |a: i32| {
        last.store(a + 1, Ordering::SeqCst);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use wirecall_fabric::config::ServerConfig;

    use super::*;

    #[test]
    fn registers_every_method_once() {
        let mut server = Server::new(ServerConfig::new().port(0)).unwrap();
        bind_all(&mut server, Arc::new(AtomicI32::new(0))).unwrap();

        let registry = server.registry();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.signature("foo").unwrap().arity, 5);
        assert!(!registry.signature("funcD").unwrap().returns_value);

        assert!(bind_all(&mut server, Arc::new(AtomicI32::new(0))).is_err());
    }

    #[test]
    fn foo_rejects_true() {
        assert_eq!(foo(1, false, "x".into(), 1.5, vec![]), Ok(42));
        assert_eq!(
            foo(1, true, "x".into(), 1.5, vec![]),
            Err("true is not good".to_string())
        );
    }
}
