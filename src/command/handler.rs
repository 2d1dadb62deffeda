//! Typed handler variants (§4.7.4): a small tagged enum covering the four
//! "does it have a serialized request / response" shapes, with one uniform
//! dispatch entry point. One `match` in `dispatch` rather than a handler
//! trait object per variant.

use crate::error::{AtomError, AtomResult};
use crate::serialization::SerializationMethod;

/// The four convenience shapes from §4.7.4, each reducible to the same
/// byte-level contract: `(data: &[u8], method) -> (Vec<u8>, method)`.
pub enum HandlerKind {
    /// Request and response both carry a msgpack-encoded payload.
    MsgPackBoth(Box<dyn Fn(rmpv::Value) -> AtomResult<rmpv::Value> + Send + Sync>),
    /// Request carries a msgpack payload; the response body is empty.
    RequestOnly(Box<dyn Fn(rmpv::Value) -> AtomResult<()> + Send + Sync>),
    /// Request body is empty; the response carries a msgpack payload.
    ResponseOnly(Box<dyn Fn() -> AtomResult<rmpv::Value> + Send + Sync>),
    /// Neither side carries a payload — a pure trigger or error-only command.
    Neither(Box<dyn Fn() -> AtomResult<()> + Send + Sync>),
    /// The escape hatch: raw bytes in, raw bytes out, no serialization
    /// negotiation at all.
    Raw(Box<dyn Fn(&[u8]) -> AtomResult<Vec<u8>> + Send + Sync>),
}

/// A registered command (§3 "Command descriptor"). Immutable once added to
/// a `CommandTable` and the command loop has started.
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub kind: HandlerKind,
    pub timeout_ms: u64,
    /// Runs before `kind`'s handler; failure maps to `InvalidCommand` (§4.7.4).
    pub validate: Option<Box<dyn Fn(&[u8]) -> AtomResult<()> + Send + Sync>>,
}

impl CommandDescriptor {
    pub fn raw(
        name: impl Into<String>,
        timeout_ms: u64,
        handler: impl Fn(&[u8]) -> AtomResult<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: HandlerKind::Raw(Box::new(handler)),
            timeout_ms,
            validate: None,
        }
    }

    pub fn msgpack_both(
        name: impl Into<String>,
        timeout_ms: u64,
        handler: impl Fn(rmpv::Value) -> AtomResult<rmpv::Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: HandlerKind::MsgPackBoth(Box::new(handler)),
            timeout_ms,
            validate: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_validate(
        mut self,
        validate: impl Fn(&[u8]) -> AtomResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Box::new(validate));
        self
    }
}

/// The uniform dispatch entry point every `HandlerKind` reduces to.
/// Runs `validate` (if present) first, then the handler, decoding/encoding
/// msgpack payloads as each variant requires.
pub fn dispatch(
    descriptor: &CommandDescriptor,
    data: &[u8],
    method: SerializationMethod,
) -> AtomResult<(Vec<u8>, SerializationMethod)> {
    if let Some(validate) = &descriptor.validate {
        validate(data).map_err(|e| AtomError::InvalidCommand(e.to_string()))?;
    }

    match &descriptor.kind {
        HandlerKind::Raw(f) => Ok((f(data)?, SerializationMethod::None)),
        HandlerKind::MsgPackBoth(f) => {
            let request = method.decode_dynamic(data)?;
            let response = f(request)?;
            Ok((
                encode_dynamic(&response)?,
                SerializationMethod::MsgPack,
            ))
        }
        HandlerKind::RequestOnly(f) => {
            let request = method.decode_dynamic(data)?;
            f(request)?;
            Ok((Vec::new(), SerializationMethod::None))
        }
        HandlerKind::ResponseOnly(f) => {
            let response = f()?;
            Ok((encode_dynamic(&response)?, SerializationMethod::MsgPack))
        }
        HandlerKind::Neither(f) => {
            f()?;
            Ok((Vec::new(), SerializationMethod::None))
        }
    }
}

fn encode_dynamic(value: &rmpv::Value) -> AtomResult<Vec<u8>> {
    let mut out = Vec::new();
    rmpv::encode::write_value(&mut out, value)
        .map_err(|e| AtomError::CallbackFailed(format!("msgpack encode: {e}")))?;
    Ok(out)
}
