//! L0: deterministic key and stream name derivation.
//!
//! A pure function layer; no other module builds a Redis key by hand.

use crate::error::{AtomError, AtomResult};

pub const NAME_MAXLEN: usize = 128;

/// The fixed key of the shared log stream.
pub const LOG_STREAM: &str = "log";

/// Validates an element or stream name component: non-empty, at most
/// `NAME_MAXLEN` bytes, and free of `:` (which would collide with the
/// namespace separator).
pub fn validate_name(name: &str) -> AtomResult<()> {
    if name.is_empty() {
        return Err(AtomError::InvalidName {
            name: name.to_string(),
            reason: "empty",
        });
    }
    if name.len() > NAME_MAXLEN {
        return Err(AtomError::InvalidName {
            name: name.to_string(),
            reason: "exceeds 128 bytes",
        });
    }
    if name.contains(':') {
        return Err(AtomError::InvalidName {
            name: name.to_string(),
            reason: "contains reserved ':' separator",
        });
    }
    Ok(())
}

pub fn command_key(element: &str) -> String {
    format!("command:{element}")
}

pub fn response_key(element: &str) -> String {
    format!("response:{element}")
}

pub fn stream_key(element: &str, stream: &str) -> String {
    format!("stream:{element}:{stream}")
}

/// Strips the `command:` prefix used by element discovery; returns `None`
/// for keys that don't carry it.
pub fn element_from_command_key(key: &str) -> Option<&str> {
    key.strip_prefix("command:")
}

/// Strips the `stream:` prefix, splitting the remainder into
/// `(element, stream_name)`.
pub fn element_and_stream_from_stream_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("stream:")?;
    rest.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(NAME_MAXLEN + 1);
        assert!(validate_name(&long).is_err());
    }

    #[test]
    fn rejects_colon() {
        assert!(validate_name("a:b").is_err());
    }

    #[test]
    fn accepts_boundary_length() {
        let ok = "a".repeat(NAME_MAXLEN);
        assert!(validate_name(&ok).is_ok());
    }

    #[test]
    fn key_derivation_is_pure() {
        assert_eq!(command_key("robot"), "command:robot");
        assert_eq!(response_key("robot"), "response:robot");
        assert_eq!(stream_key("robot", "lidar"), "stream:robot:lidar");
    }

    #[test]
    fn discovery_helpers_roundtrip() {
        assert_eq!(element_from_command_key("command:robot"), Some("robot"));
        assert_eq!(element_from_command_key("response:robot"), None);
        assert_eq!(
            element_and_stream_from_stream_key("stream:robot:lidar"),
            Some(("robot", "lidar"))
        );
    }
}
