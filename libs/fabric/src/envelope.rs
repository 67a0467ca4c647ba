//! Protocol envelopes.
//!
//! Every message on the wire is a MessagePack array:
//!
//! | kind | layout |
//! |---|---|
//! | request | `[0, call_id, method: str, args: bin]` |
//! | response | `[1, call_id, error: bin, result: bin]` |
//! | notification | `[2, method: str, args: bin]` |
//!
//! A response carries either a non-empty error slot or a result slot (empty
//! for void returns), never both.

use bytes::Bytes;
use serde_bytes::ByteBuf;

use crate::codec::{encode_frame, Codec, MsgPackCodec};
use crate::error::{Error, Result};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request = 0,
    Response = 1,
    Notification = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::Notification),
            other => Err(Error::InvalidMessage(format!("unknown message kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Request {
        call_id: u32,
        method: String,
        args: Vec<u8>,
    },
    Response {
        call_id: u32,
        error: Vec<u8>,
        result: Vec<u8>,
    },
    /// Recognized on the wire but never acted on
    Notification { method: String, args: Vec<u8> },
}

impl Envelope {
    pub fn request(call_id: u32, method: impl Into<String>, args: Vec<u8>) -> Self {
        Self::Request {
            call_id,
            method: method.into(),
            args,
        }
    }

    /// Successful response; `result` is empty for void calls
    pub fn success(call_id: u32, result: Vec<u8>) -> Self {
        Self::Response {
            call_id,
            error: Vec::new(),
            result,
        }
    }

    /// Failed response carrying `message` in the error slot
    pub fn failure(call_id: u32, message: &str) -> Result<Self> {
        Ok(Self::Response {
            call_id,
            error: MsgPackCodec.encode(message)?,
            result: Vec::new(),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request { .. } => MessageKind::Request,
            Self::Response { .. } => MessageKind::Response,
            Self::Notification { .. } => MessageKind::Notification,
        }
    }

    pub fn call_id(&self) -> Option<u32> {
        match self {
            Self::Request { call_id, .. } | Self::Response { call_id, .. } => Some(*call_id),
            Self::Notification { .. } => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoded = match self {
            Self::Request {
                call_id,
                method,
                args,
            } => rmp_serde::to_vec(&(
                MessageKind::Request as u8,
                *call_id,
                method.as_str(),
                serde_bytes::Bytes::new(args),
            )),
            Self::Response {
                call_id,
                error,
                result,
            } => rmp_serde::to_vec(&(
                MessageKind::Response as u8,
                *call_id,
                serde_bytes::Bytes::new(error),
                serde_bytes::Bytes::new(result),
            )),
            Self::Notification { method, args } => rmp_serde::to_vec(&(
                MessageKind::Notification as u8,
                method.as_str(),
                serde_bytes::Bytes::new(args),
            )),
        };
        encoded.map_err(|e| Error::Codec(e.to_string()))
    }

    /// Encode and length-prefix, ready to be written to a stream
    pub fn to_frame(&self) -> Result<Bytes> {
        encode_frame(&self.encode()?)
    }

    /// Decode one envelope.
    ///
    /// The field count and the kind field must agree: three fields for a
    /// notification, four for a request or response. Anything else is
    /// [`Error::InvalidMessage`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut header = bytes;
        let fields = rmp::decode::read_array_len(&mut header)
            .map_err(|e| Error::InvalidMessage(format!("envelope is not an array: {e}")))?;
        let kind: u8 = rmp::decode::read_int(&mut header)
            .map_err(|e| Error::InvalidMessage(format!("invalid message kind: {e}")))?;
        let kind = MessageKind::try_from(kind)?;

        let invalid = |e: rmp_serde::decode::Error| {
            Error::InvalidMessage(format!("malformed {kind:?} envelope: {e}"))
        };

        match (fields, kind) {
            (3, MessageKind::Notification) => {
                let (_, method, args): (u8, String, ByteBuf) =
                    rmp_serde::from_slice(bytes).map_err(invalid)?;
                Ok(Self::Notification {
                    method,
                    args: args.into_vec(),
                })
            }
            (4, MessageKind::Request) => {
                let (_, call_id, method, args): (u8, u32, String, ByteBuf) =
                    rmp_serde::from_slice(bytes).map_err(invalid)?;
                Ok(Self::Request {
                    call_id,
                    method,
                    args: args.into_vec(),
                })
            }
            (4, MessageKind::Response) => {
                let (_, call_id, error, result): (u8, u32, ByteBuf, ByteBuf) =
                    rmp_serde::from_slice(bytes).map_err(invalid)?;
                Ok(Self::Response {
                    call_id,
                    error: error.into_vec(),
                    result: result.into_vec(),
                })
            }
            (n, kind) => Err(Error::InvalidMessage(format!(
                "{kind:?} envelope with {n} fields"
            ))),
        }
    }
}
