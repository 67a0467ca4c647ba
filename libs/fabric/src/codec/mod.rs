use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

pub mod frame;
pub mod msgpack;

pub use self::frame::{encode_frame, FrameDecoder};
pub use self::msgpack::{ArgsReader, ArgsWriter, MsgPackCodec};

/// Codec trait for serializing and deserializing messages
pub trait Codec: Send + Sync {
    /// Encode a value into bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a value
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}
