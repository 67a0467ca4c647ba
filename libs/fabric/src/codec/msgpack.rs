use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};

/// MessagePack encoding of `nil`, the payload of a unit value
pub const NIL: &[u8] = &[0xc0];

/// MessagePack codec for binary serialization
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}

/// Packs a heterogeneous argument list as one MessagePack array.
///
/// The array header carries the argument count, so a receiver can check the
/// arity before it decodes a single element.
pub struct ArgsWriter {
    buf: Vec<u8>,
    expected: u32,
    written: u32,
}

impl ArgsWriter {
    pub fn new(count: u32) -> Result<Self> {
        let mut buf = Vec::with_capacity(16);
        rmp::encode::write_array_len(&mut buf, count)
            .map_err(|e| Error::Codec(e.to_string()))?;
        Ok(Self {
            buf,
            expected: count,
            written: 0,
        })
    }

    pub fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        rmp_serde::encode::write(&mut self.buf, value).map_err(|e| Error::Codec(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if self.written != self.expected {
            return Err(Error::Codec(format!(
                "argument list declared {} elements but {} were written",
                self.expected, self.written
            )));
        }
        Ok(self.buf)
    }
}

/// Reads back an argument list produced by [`ArgsWriter`]
pub struct ArgsReader<'a> {
    rest: &'a [u8],
    len: u32,
    consumed: u32,
}

impl<'a> ArgsReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let mut rest = bytes;
        let len = rmp::decode::read_array_len(&mut rest)
            .map_err(|e| Error::Codec(format!("argument list is not an array: {e}")))?;
        Ok(Self { rest, len, consumed: 0 })
    }

    /// Number of arguments announced by the array header
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T> {
        if self.consumed >= self.len {
            return Err(Error::Codec(format!(
                "argument list exhausted after {} elements",
                self.len
            )));
        }
        let value = rmp_serde::decode::from_read(&mut self.rest)
            .map_err(|e| Error::Codec(format!("argument {}: {e}", self.consumed)))?;
        self.consumed += 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_round_trip_mixed_types() {
        let mut writer = ArgsWriter::new(5).unwrap();
        writer.push(&1i32).unwrap();
        writer.push(&false).unwrap();
        writer.push("Hello, World").unwrap();
        writer.push(&1.25f64).unwrap();
        writer.push(&vec![5i32, 6]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ArgsReader::new(&bytes).unwrap();
        assert_eq!(reader.len(), 5);
        assert_eq!(reader.read::<i32>().unwrap(), 1);
        assert!(!reader.read::<bool>().unwrap());
        assert_eq!(reader.read::<String>().unwrap(), "Hello, World");
        assert_eq!(reader.read::<f64>().unwrap(), 1.25);
        assert_eq!(reader.read::<Vec<i32>>().unwrap(), vec![5, 6]);
        assert!(reader.read::<i32>().is_err());
    }

    #[test]
    fn empty_argument_list_is_an_empty_array() {
        let bytes = ArgsWriter::new(0).unwrap().finish().unwrap();
        assert_eq!(bytes, vec![0x90]);
        let reader = ArgsReader::new(&bytes).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn writer_rejects_short_lists() {
        let mut writer = ArgsWriter::new(2).unwrap();
        writer.push(&1u8).unwrap();
        assert!(matches!(writer.finish(), Err(Error::Codec(_))));
    }

    #[test]
    fn reader_rejects_non_arrays() {
        let bytes = MsgPackCodec.encode(&42u32).unwrap();
        assert!(ArgsReader::new(&bytes).is_err());
    }

    #[test]
    fn unit_encodes_as_nil() {
        assert_eq!(MsgPackCodec.encode(&()).unwrap(), NIL);
        MsgPackCodec.decode::<()>(NIL).unwrap();
        assert_eq!(MsgPackCodec.decode::<Option<i32>>(NIL).unwrap(), None);
    }
}
