//! Length-prefix framing for envelopes on a byte stream.
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const LENGTH_PREFIX_LEN: usize = 4;

/// Upper bound on a single frame unless configured otherwise
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prefix `payload` with its length
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        Error::InvalidFrame(format!("Message too large: {} bytes", payload.len()))
    })?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.put_u32(len);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Incremental frame decoder.
///
/// Bytes are appended as they come off the socket; complete frames are
/// yielded in order and a trailing partial frame stays buffered until the
/// rest of it arrives.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_len,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// An oversized length prefix is an error; the stream cannot be
    /// resynchronized after it.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_len {
            return Err(Error::InvalidFrame(format!(
                "Message too large: {} bytes",
                len
            )));
        }

        if self.buf.len() < LENGTH_PREFIX_LEN + len {
            self.buf.reserve(LENGTH_PREFIX_LEN + len - self.buf.len());
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_LEN);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Bytes received but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
