//! §4.8: the shared `log` stream, `{level, host, element, msg}`.
//!
//! Distinct from the `tracing`-based diagnostic logging this crate emits for
//! its own connection/pool/dispatch internals (see the crate root docs):
//! this is a wire-level Atom feature other elements can subscribe to like
//! any other stream, not an operator-facing log line.

use crate::config::LogLevel;
use crate::error::AtomResult;
use crate::naming::LOG_STREAM;
use crate::pool::connection::RedisConnection;
use crate::wire;
use once_cell::sync::OnceCell;

static HOST: OnceCell<String> = OnceCell::new();

/// The process's hostname, captured once (§4.8 "host is captured once per
/// process") — the one piece of deliberate global state this crate carries.
fn host() -> &'static str {
    HOST.get_or_init(|| {
        std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "unknown-host".to_string())
    })
}

/// Writes one entry to the shared `log` stream. `level` out-of-range is
/// rejected by `LogLevel::from_u8` before this is ever called.
pub async fn log(conn: &mut RedisConnection, element: &str, level: LogLevel, msg: &str) -> AtomResult<String> {
    let level_str = (level as u8).to_string();
    let fields: [(&str, &[u8]); 4] = [
        ("level", level_str.as_bytes()),
        ("host", host().as_bytes()),
        ("element", element.as_bytes()),
        ("msg", msg.as_bytes()),
    ];
    wire::xadd(conn, LOG_STREAM, Some(4096), &fields).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_stable_across_calls() {
        assert_eq!(host(), host());
        assert!(!host().is_empty());
    }

    #[test]
    fn level_encodes_as_its_numeric_value() {
        assert_eq!(LogLevel::Emerg as u8, 0);
        assert_eq!(LogLevel::Debug as u8, 7);
    }
}
