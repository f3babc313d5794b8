//! Two-frame message encoding.
//!
//! Every exchange with the broker carries two independently encoded CBOR
//! frames:
//!
//! ```text
//! frame 0 (header):  { timestamp: f64, version: "1.0" }
//! frame 1 (payload): { data: <value>, version: "1.0" }
//! ```
//!
//! Decoding never panics. Any shape or type mismatch is reported as a
//! [`DecodeError`] so the caller can drop the message and carry on. The header
//! is decoded first and a failure there short-circuits the payload.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::error::{DecodeError, Result, SkynetError};

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Number of frames in a data exchange.
pub const FRAME_COUNT: usize = 2;

/// Encoded `[header, payload]` pair.
pub type Frames = SmallVec<[Bytes; FRAME_COUNT]>;

/// Per-exchange metadata, always the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Header {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub version: String,
}

impl Header {
    /// Header stamped with the current wall-clock time.
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self::at(timestamp)
    }

    /// Header stamped with an explicit timestamp.
    pub fn at(timestamp: f64) -> Self {
        Self {
            timestamp,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A value together with its header.
///
/// `length` is filled in by [`decode`] with the total size of both frames;
/// it is never transmitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub header: Header,
    pub data: T,
    pub length: Option<usize>,
}

impl<T> Message<T> {
    /// Wrap `data` with a header stamped now.
    pub fn new(data: T) -> Self {
        Self::with_header(Header::now(), data)
    }

    pub fn with_header(header: Header, data: T) -> Self {
        Self {
            header,
            data,
            length: None,
        }
    }

    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.header.timestamp
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// Transform the value, keeping header and length.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            header: self.header,
            data: f(self.data),
            length: self.length,
        }
    }
}

#[derive(Serialize)]
struct PayloadRef<'a, T> {
    data: &'a T,
    version: &'a str,
}

#[derive(Deserialize)]
struct Payload<T> {
    data: T,
    version: String,
}

fn to_cbor<S: Serialize>(value: &S) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(64);
    ciborium::into_writer(value, &mut buf).map_err(|e| SkynetError::encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

pub fn encode_header(header: &Header) -> Result<Bytes> {
    to_cbor(header)
}

/// Encode a bare value as a versioned payload frame.
pub fn encode_payload<T: Serialize>(data: &T) -> Result<Bytes> {
    to_cbor(&PayloadRef {
        data,
        version: PROTOCOL_VERSION,
    })
}

/// Encode a message into its `[header, payload]` frames.
pub fn encode<T: Serialize>(message: &Message<T>) -> Result<Frames> {
    let header = encode_header(&message.header)?;
    let payload = encode_payload(&message.data)?;
    Ok(smallvec![header, payload])
}

pub fn decode_header(bytes: &[u8]) -> std::result::Result<Header, DecodeError> {
    ciborium::from_reader(bytes).map_err(|e| DecodeError::Header(e.to_string()))
}

/// Decode a versioned payload frame into its bare value.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<T, DecodeError> {
    let payload: Payload<T> =
        ciborium::from_reader(bytes).map_err(|e| DecodeError::Payload(e.to_string()))?;
    if payload.version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            expected: PROTOCOL_VERSION.to_string(),
            actual: payload.version,
        });
    }
    Ok(payload.data)
}

/// Decode a `[header, payload]` pair.
pub fn decode<T: DeserializeOwned>(
    header: &[u8],
    payload: &[u8],
) -> std::result::Result<Message<T>, DecodeError> {
    let head = decode_header(header)?;
    let data = decode_payload(payload)?;
    Ok(Message {
        header: head,
        data,
        length: Some(header.len() + payload.len()),
    })
}

/// Decode a received multipart exchange, checking the frame count first.
pub fn decode_frames<T, F>(frames: &[F]) -> std::result::Result<Message<T>, DecodeError>
where
    T: DeserializeOwned,
    F: AsRef<[u8]>,
{
    match frames {
        [header, payload] => decode(header.as_ref(), payload.as_ref()),
        _ => Err(DecodeError::FrameCount {
            expected: FRAME_COUNT,
            actual: frames.len(),
        }),
    }
}
