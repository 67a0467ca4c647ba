//! Name to handler table used by the server workers.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use wirecall_fabric::codec::ArgsReader;
use wirecall_fabric::supervisor::panic_message;

use crate::args::FromArguments;
use crate::error::{DispatchError, Result, RpcError};
use crate::handler::Handler;
use crate::reply::IntoReply;

/// Shape of a bound method, recorded at bind time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub arity: usize,
    pub returns_value: bool,
}

type ErasedHandler =
    Box<dyn Fn(&[u8]) -> std::result::Result<Option<Vec<u8>>, DispatchError> + Send + Sync>;

struct Binding {
    signature: Signature,
    handler: ErasedHandler,
}

/// Method registry.
///
/// Handlers of any supported signature are erased behind one callable that
/// takes the encoded argument list and yields the encoded result. The table is
/// filled before the server starts and only read afterwards, so workers share
/// it without locking.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Binding>,
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.methods.iter().map(|(name, b)| (name, b.signature)))
            .finish()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` under `method`.
    ///
    /// Fails with [`RpcError::AlreadyBound`] if the name is taken; the
    /// existing binding is left untouched.
    pub fn bind<H, Args>(&mut self, method: impl Into<String>, handler: H) -> Result<()>
    where
        H: Handler<Args>,
        Args: FromArguments + 'static,
    {
        let method = method.into();
        if self.methods.contains_key(&method) {
            return Err(RpcError::AlreadyBound(method));
        }

        let signature = Signature {
            arity: Args::ARITY,
            returns_value: <H::Output as IntoReply>::RETURNS_VALUE,
        };
        let name = method.clone();
        let erased: ErasedHandler = Box::new(move |payload: &[u8]| {
            let bad_arguments = |e: wirecall_fabric::Error| DispatchError::BadArguments {
                method: name.clone(),
                reason: e.to_string(),
            };
            let mut reader = ArgsReader::new(payload).map_err(bad_arguments)?;
            if reader.len() != Args::ARITY {
                return Err(DispatchError::ArgumentCount {
                    method: name.clone(),
                    expected: Args::ARITY,
                    got: reader.len(),
                });
            }
            let args = Args::unpack(&mut reader).map_err(bad_arguments)?;
            handler.invoke(args).into_reply()
        });

        tracing::debug!(
            %method,
            arity = signature.arity,
            returns_value = signature.returns_value,
            "method bound"
        );
        self.methods.insert(
            method,
            Binding {
                signature,
                handler: erased,
            },
        );
        Ok(())
    }

    /// Run the handler bound to `method` on an encoded argument list.
    ///
    /// Returns the encoded result, or `None` for a method without a value.
    /// Panics inside the handler are caught and reported as
    /// [`DispatchError::Panicked`].
    pub fn dispatch(
        &self,
        method: &str,
        payload: &[u8],
    ) -> std::result::Result<Option<Vec<u8>>, DispatchError> {
        let binding = self
            .methods
            .get(method)
            .ok_or_else(|| DispatchError::MethodNotFound(method.to_string()))?;

        match catch_unwind(AssertUnwindSafe(|| (binding.handler)(payload))) {
            Ok(outcome) => outcome,
            Err(panic) => Err(DispatchError::Panicked {
                method: method.to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    pub fn signature(&self, method: &str) -> Option<Signature> {
        self.methods.get(method).map(|b| b.signature)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use wirecall_fabric::codec::{Codec, MsgPackCodec};

    use super::*;
    use crate::args::Arguments;

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> T {
        MsgPackCodec.decode(bytes).unwrap()
    }

    #[test]
    fn dispatches_to_bound_handler() {
        let mut registry = MethodRegistry::new();
        registry.bind("add", |a: i64, b: i64| a + b).unwrap();

        let result = registry.dispatch("add", &(2, 40).pack().unwrap()).unwrap();
        assert_eq!(decode::<i64>(&result.unwrap()), 42);
        assert_eq!(
            registry.signature("add"),
            Some(Signature {
                arity: 2,
                returns_value: true
            })
        );
    }

    #[test]
    fn duplicate_bind_keeps_first_handler() {
        let mut registry = MethodRegistry::new();
        registry.bind("funcA", || 123).unwrap();
        let err = registry.bind("funcA", || 456).unwrap_err();
        assert!(matches!(err, RpcError::AlreadyBound(ref name) if name == "funcA"));

        let result = registry.dispatch("funcA", &().pack().unwrap()).unwrap();
        assert_eq!(decode::<i32>(&result.unwrap()), 123);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn wrong_arity_never_runs_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = MethodRegistry::new();
        registry
            .bind("funcB", move |_: i32| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let err = registry
            .dispatch("funcB", &(1, 2).pack().unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::ArgumentCount {
                method: "funcB".into(),
                expected: 1,
                got: 2
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn void_handler_yields_no_payload() {
        let mut registry = MethodRegistry::new();
        registry.bind("funcC", || {}).unwrap();
        assert_eq!(registry.dispatch("funcC", &().pack().unwrap()), Ok(None));
        assert!(!registry.signature("funcC").unwrap().returns_value);
    }

    #[test]
    fn unknown_method_is_reported() {
        let registry = MethodRegistry::new();
        let err = registry.dispatch("nope", &().pack().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "method not found: nope");
    }

    #[test]
    fn bad_argument_types_are_reported() {
        let mut registry = MethodRegistry::new();
        registry.bind("funcB", |_: i32| {}).unwrap();
        let err = registry
            .dispatch("funcB", &("one",).pack().unwrap())
            .unwrap_err();
        assert!(matches!(err, DispatchError::BadArguments { .. }));

        // not even a list
        let err = registry.dispatch("funcB", &[0x2a]).unwrap_err();
        assert!(matches!(err, DispatchError::BadArguments { .. }));
    }

    #[test]
    fn handler_errors_and_panics_are_captured() {
        let mut registry = MethodRegistry::new();
        registry
            .bind("check", |flag: bool| -> std::result::Result<i32, String> {
                if flag {
                    Err("true is not good".into())
                } else {
                    Ok(42)
                }
            })
            .unwrap();
        registry
            .bind("explode", || -> i32 { panic!("handler blew up") })
            .unwrap();

        let err = registry
            .dispatch("check", &(true,).pack().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "true is not good");

        let err = registry.dispatch("explode", &().pack().unwrap()).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Panicked {
                method: "explode".into(),
                message: "handler blew up".into()
            }
        );

        // the registry is still usable afterwards
        let ok = registry.dispatch("check", &(false,).pack().unwrap()).unwrap();
        assert_eq!(decode::<i32>(&ok.unwrap()), 42);
    }
}
