//! L3: pluggable {none, msgpack, arrow} encode/decode of entry values.
//!
//! Expressed as a small tagged enum with a uniform dispatch surface rather
//! than a trait-object hierarchy — the method set is closed and small enough
//! that a `match` reads better than a vtable.

use crate::error::{AtomError, AtomResult};
use serde::{de::DeserializeOwned, Serialize};

/// The reserved entry key naming the serialization method.
pub const SER_KEY: &str = "ser";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializationMethod {
    None,
    MsgPack,
    Arrow,
}

impl SerializationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationMethod::None => "none",
            SerializationMethod::MsgPack => "msgpack",
            SerializationMethod::Arrow => "arrow",
        }
    }

    /// Parses the `ser` wire value; absence is handled by the caller
    /// (defaults to `None` per §4.5), this only parses a present value.
    pub fn parse(s: &str) -> AtomResult<Self> {
        match s {
            "none" => Ok(SerializationMethod::None),
            "msgpack" => Ok(SerializationMethod::MsgPack),
            "arrow" => Ok(SerializationMethod::Arrow),
            other => Err(AtomError::InvalidCommand(format!(
                "unknown serialization method '{other}'"
            ))),
        }
    }

    /// Encodes a raw byte value according to this method. For `None` this is
    /// the identity function; for `MsgPack` it wraps the bytes as a msgpack
    /// binary value so a `none`-producer and a `msgpack`-consumer never
    /// silently misinterpret each other's payloads.
    pub fn encode_bytes(&self, value: &[u8]) -> AtomResult<Vec<u8>> {
        match self {
            SerializationMethod::None => Ok(value.to_vec()),
            SerializationMethod::MsgPack => {
                let v = rmpv::Value::Binary(value.to_vec());
                let mut out = Vec::new();
                rmpv::encode::write_value(&mut out, &v)
                    .map_err(|e| AtomError::CallbackFailed(format!("msgpack encode: {e}")))?;
                Ok(out)
            }
            SerializationMethod::Arrow => Err(AtomError::CallbackFailed(
                "arrow serialization is unsupported".to_string(),
            )),
        }
    }

    /// Encodes an arbitrary `Serialize` value to msgpack. Only meaningful
    /// for `MsgPack`; callers that pass `None` or `Arrow` here get an error
    /// since neither has a generic value encoding (`None` only carries raw
    /// bytes, `Arrow` is unimplemented).
    pub fn encode_value<T: Serialize>(&self, value: &T) -> AtomResult<Vec<u8>> {
        match self {
            SerializationMethod::MsgPack => {
                Ok(rmp_serde::to_vec_named(value).map_err(AtomError::from)?)
            }
            SerializationMethod::None => Err(AtomError::CallbackFailed(
                "serialization method 'none' cannot encode a typed value".to_string(),
            )),
            SerializationMethod::Arrow => Err(AtomError::CallbackFailed(
                "arrow serialization is unsupported".to_string(),
            )),
        }
    }

    /// Decodes bytes into a dynamic msgpack value. Used by the generic read
    /// path (`entry_read_n`/`entry_read_since`) which does not know the
    /// concrete user type ahead of time.
    pub fn decode_dynamic(&self, bytes: &[u8]) -> AtomResult<rmpv::Value> {
        match self {
            SerializationMethod::None => Ok(rmpv::Value::Binary(bytes.to_vec())),
            SerializationMethod::MsgPack => rmpv::decode::read_value(&mut std::io::Cursor::new(bytes))
                .map_err(|e| AtomError::CallbackFailed(format!("msgpack decode: {e}"))),
            SerializationMethod::Arrow => Err(AtomError::CallbackFailed(
                "arrow serialization is unsupported".to_string(),
            )),
        }
    }

    /// Decodes bytes into a concrete type `T`. Used by typed command
    /// handlers (§4.7.4) that know their request/response shape.
    pub fn decode_value<T: DeserializeOwned>(&self, bytes: &[u8]) -> AtomResult<T> {
        match self {
            SerializationMethod::MsgPack => {
                Ok(rmp_serde::from_slice(bytes).map_err(AtomError::from)?)
            }
            SerializationMethod::None => Err(AtomError::CallbackFailed(
                "serialization method 'none' cannot decode a typed value".to_string(),
            )),
            SerializationMethod::Arrow => Err(AtomError::CallbackFailed(
                "arrow serialization is unsupported".to_string(),
            )),
        }
    }
}
