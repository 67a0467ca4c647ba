//! Conversion of handler return values into response payloads.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;

use serde::Serialize;
use wirecall_fabric::codec::{Codec, MsgPackCodec};

use crate::error::DispatchError;

/// What a handler may return.
///
/// `Ok(None)` means the method produces no value and the response carries an
/// empty result slot.
pub trait IntoReply {
    /// False for handlers that return nothing
    const RETURNS_VALUE: bool = true;

    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError>;
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Option<Vec<u8>>, DispatchError> {
    MsgPackCodec
        .encode(value)
        .map(Some)
        .map_err(|e| DispatchError::Encode(e.to_string()))
}

impl IntoReply for () {
    const RETURNS_VALUE: bool = false;

    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        Ok(None)
    }
}

macro_rules! impl_into_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
                    encode(&self)
                }
            }
        )*
    };
}

impl_into_reply!(
    bool, char, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, f32, f64, String, &'static str,
);

impl<T: Serialize> IntoReply for Vec<T> {
    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        encode(&self)
    }
}

impl<T: Serialize> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        encode(&self)
    }
}

impl<K: Serialize + Eq + Hash, V: Serialize> IntoReply for HashMap<K, V> {
    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        encode(&self)
    }
}

impl<K: Serialize + Ord, V: Serialize> IntoReply for BTreeMap<K, V> {
    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        encode(&self)
    }
}

/// An error turns into a failed response carrying its `Display` text
impl<T: IntoReply, E: Display> IntoReply for Result<T, E> {
    const RETURNS_VALUE: bool = T::RETURNS_VALUE;

    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        match self {
            Ok(value) => value.into_reply(),
            Err(e) => Err(DispatchError::Failed(e.to_string())),
        }
    }
}

/// Wraps any serializable type so it can be returned from a handler
///
/// ```
/// use wirecall_rpc::Value;
///
/// #[derive(serde::Serialize)]
/// struct Point { x: i32, y: i32 }
///
/// let handler = |x: i32, y: i32| Value(Point { x, y });
/// # let _ = handler(1, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value<T>(pub T);

impl<T: Serialize> IntoReply for Value<T> {
    fn into_reply(self) -> Result<Option<Vec<u8>>, DispatchError> {
        encode(&self.0)
    }
}
