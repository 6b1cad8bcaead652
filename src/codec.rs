//! Wire frame decoding and encoding.
//!
//! Inbound frames are turned into a [`DecodedMessage`]: text frames are JSON
//! decoded when they look like an object or array, binary frames are first
//! decompressed according to the connection's [`Compression`], and control
//! frames become [`ControlEvent`]s. Outbound messages are either sent verbatim
//! (strings) or serialized to compact JSON.

use std::error::Error as StdError;
use std::fmt;
use std::io::Read as _;
use std::string::FromUtf8Error;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::{DeflateDecoder, GzDecoder};
use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::error::{Error, Kind};

/// Close code sent on a client-initiated close, and assumed when the remote
/// closes without a status code.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the transport ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// A frame as read from, or written to, the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close {
        code: u16,
        reason: String,
    },
}

/// Transport-level control events surfaced by the codec.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Result of decoding a single inbound frame. Lives for one dispatch cycle.
#[non_exhaustive]
#[derive(Debug)]
pub enum DecodedMessage {
    /// Application data, either structured JSON or a raw string
    Payload(Value),
    Control(ControlEvent),
    Error(Error),
}

/// Decompression applied to binary frames before decoding.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    /// Raw deflate stream without zlib header
    Inflate,
    /// Base64 text wrapping a raw deflate stream. Applies to text frames too.
    Inflate64,
}

impl Compression {
    /// Map the `gunzip` / `inflate` flag pair onto a single scheme. Gzip wins
    /// when both are set.
    #[must_use]
    pub const fn from_flags(gunzip: bool, inflate: bool) -> Self {
        if gunzip {
            Self::Gzip
        } else if inflate {
            Self::Inflate
        } else {
            Self::None
        }
    }
}

/// An outgoing application message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Sent verbatim
    Text(String),
    /// Serialized to compact JSON
    Json(Value),
}

impl Outgoing {
    /// Build a JSON message from any serializable request type.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub enum CodecError {
    /// Decompression of a binary payload failed
    Decompress {
        scheme: Compression,
        source: std::io::Error,
    },
    /// Payload was not valid base64
    Base64(base64::DecodeError),
    /// Decompressed payload was not valid UTF-8
    InvalidUtf8(FromUtf8Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decompress { scheme, source } => {
                write!(f, "failed to decompress {scheme} payload: {source}")
            }
            Self::Base64(e) => write!(f, "invalid base64 payload: {e}"),
            Self::InvalidUtf8(e) => write!(f, "payload is not valid UTF-8: {e}"),
        }
    }
}

impl StdError for CodecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Decompress { source, .. } => Some(source),
            Self::Base64(e) => Some(e),
            Self::InvalidUtf8(e) => Some(e),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::with_source(Kind::Codec, e)
    }
}

/// Whether `text` should be handed to the JSON decoder.
#[must_use]
pub fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().as_bytes().first(), Some(b'{' | b'['))
}

/// Per-connection frame codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    compression: Compression,
    verbose: bool,
}

impl FrameCodec {
    #[must_use]
    pub const fn new(compression: Compression, verbose: bool) -> Self {
        Self {
            compression,
            verbose,
        }
    }

    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Decode one inbound frame.
    ///
    /// Text that looks like JSON but fails to parse is passed through as a
    /// raw string rather than reported as an error. Decompression and UTF-8
    /// failures come back as [`DecodedMessage::Error`] with [`Kind::Codec`].
    #[must_use]
    pub fn decode(&self, frame: Frame) -> DecodedMessage {
        match frame {
            Frame::Text(text) if self.compression == Compression::Inflate64 => {
                self.decode_bytes(text.as_bytes())
            }
            Frame::Text(text) => DecodedMessage::Payload(self.decode_text(text)),
            Frame::Binary(bytes) => self.decode_bytes(&bytes),
            Frame::Ping(payload) => DecodedMessage::Control(ControlEvent::Ping(payload)),
            Frame::Pong(payload) => DecodedMessage::Control(ControlEvent::Pong(payload)),
            Frame::Close { code, reason } => {
                DecodedMessage::Control(ControlEvent::Close { code, reason })
            }
        }
    }

    /// Encode an outgoing message for a text frame.
    #[must_use]
    pub fn encode(&self, message: &Outgoing) -> String {
        match message {
            Outgoing::Text(text) => text.clone(),
            // Display on Value is the compact serializer and cannot fail
            Outgoing::Json(value) => value.to_string(),
        }
    }

    fn decode_bytes(&self, bytes: &[u8]) -> DecodedMessage {
        let text = self
            .decompress(bytes)
            .and_then(|raw| String::from_utf8(raw).map_err(CodecError::InvalidUtf8));

        match text {
            Ok(text) => DecodedMessage::Payload(self.decode_text(text)),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(compression = %self.compression, error = %e, "Dropping undecodable frame");
                DecodedMessage::Error(e.into())
            }
        }
    }

    fn decompress(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        let scheme = self.compression;
        let mut out = Vec::new();
        let read = match scheme {
            Compression::None => return Ok(bytes.to_vec()),
            Compression::Gzip => GzDecoder::new(bytes).read_to_end(&mut out),
            Compression::Inflate => DeflateDecoder::new(bytes).read_to_end(&mut out),
            Compression::Inflate64 => {
                let decoded = STANDARD
                    .decode(bytes.trim_ascii())
                    .map_err(CodecError::Base64)?;
                DeflateDecoder::new(decoded.as_slice()).read_to_end(&mut out)
            }
        };

        read.map_err(|source| CodecError::Decompress { scheme, source })?;
        Ok(out)
    }

    fn decode_text(&self, text: String) -> Value {
        verbose!(self.verbose, %text, "message");

        if !looks_like_json(&text) {
            return Value::String(text);
        }

        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%text, error = %e, "Text frame is not valid JSON, passing through");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                Value::String(text)
            }
        }
    }
}
