//! Client-side half of the command protocol (§4.7.2): `send_command` and
//! the ACK-then-response wait.

use crate::config::ACK_TIMEOUT_MS;
use crate::entry::Entry;
use crate::error::{AtomError, AtomResult};
use crate::naming;
use crate::pool::connection::RedisConnection;
use crate::serialization::SerializationMethod;
use crate::wire;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct SendCommandOptions {
    /// If `false`, return as soon as the ACK is observed.
    pub block: bool,
    /// Overrides the ACK-advertised response timeout.
    pub timeout_override_ms: Option<u64>,
    pub ser: SerializationMethod,
}

impl Default for SendCommandOptions {
    fn default() -> Self {
        Self {
            block: true,
            timeout_override_ms: None,
            ser: SerializationMethod::None,
        }
    }
}

/// The aggregated result of a `send_command` call: a single value folding
/// together transport errors (no ACK, no response) and user errors (§7
/// "send_command returns a single value that aggregates transport and user
/// error").
#[derive(Debug, Clone)]
pub struct ElementResponse {
    pub err_code: i64,
    pub err_str: String,
    pub data: Vec<u8>,
    pub method: SerializationMethod,
}

impl ElementResponse {
    pub fn is_ok(&self) -> bool {
        self.err_code == 0
    }

    fn success(data: Vec<u8>, method: SerializationMethod) -> Self {
        Self { err_code: 0, err_str: String::new(), data, method }
    }

    fn ack_only() -> Self {
        Self::success(Vec::new(), SerializationMethod::None)
    }
}

fn field_str(entry: &wire::StreamId, key: &str) -> Option<String> {
    entry.field(key).map(|b| String::from_utf8_lossy(b).to_string())
}

/// `send_command(target, name, data, block?, timeout_override?, ser?)`.
///
/// `request_conn` issues the `XADD` request; `response_conn` performs the
/// ACK/response `XREAD`s — two distinct pooled connections, so the blocking
/// read never wedges the writer (§2 control flow).
///
/// Both the ACK wait and the response wait track one deadline computed at
/// the start of that phase and feed the *remaining* time into each `XREAD`
/// iteration, so the budget is a true total rather than "up to N ms per
/// spurious wake" (§9 Open Question (a), resolved).
pub async fn send_command(
    request_conn: &mut RedisConnection,
    response_conn: &mut RedisConnection,
    caller: &str,
    target: &str,
    cmd: &str,
    data: &[u8],
    options: SendCommandOptions,
) -> AtomResult<ElementResponse> {
    naming::validate_name(caller)?;
    naming::validate_name(target)?;

    let command_stream = naming::command_key(target);
    let response_stream = naming::response_key(caller);

    let ser_tag = options.ser.as_str();
    let fields: Vec<(&str, &[u8])> = vec![
        ("element", caller.as_bytes()),
        ("cmd", cmd.as_bytes()),
        ("data", data),
        ("ser", ser_tag.as_bytes()),
    ];
    // Command streams use a tighter MAXLEN than response streams (§9 Open
    // Question (b)): both are tunables, this crate's default split is 16/1024.
    let cmd_id = wire::xadd(request_conn, &command_stream, Some(16), &fields).await?;

    let mut last_id = "$".to_string();
    let ack_deadline = Instant::now() + Duration::from_millis(ACK_TIMEOUT_MS);

    let advertised_timeout_ms = loop {
        let remaining = ack_deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AtomError::NoAck { element: target.to_string() });
        }

        let keys = wire::xread(response_conn, &response_stream, &last_id, remaining.as_millis() as u64, None).await?;
        let Some(found) = keys.into_iter().find(|k| k.key == response_stream) else {
            continue;
        };

        let mut matched = None;
        for raw in found.ids {
            last_id = raw.id.clone();
            if field_str(&raw, "element").as_deref() != Some(target) {
                continue;
            }
            if field_str(&raw, "cmd_id").as_deref() != Some(cmd_id.as_str()) {
                continue;
            }
            // The ACK entry carries `timeout`; a response entry carries
            // `err_code` instead. Only the ACK satisfies this wait.
            if let Some(t) = field_str(&raw, "timeout") {
                matched = t.parse::<u64>().ok();
                break;
            }
        }

        if let Some(t) = matched {
            break t;
        }
    };

    if !options.block {
        return Ok(ElementResponse::ack_only());
    }

    let response_timeout_ms = options.timeout_override_ms.unwrap_or(advertised_timeout_ms);
    let response_deadline = Instant::now() + Duration::from_millis(response_timeout_ms);

    loop {
        let remaining = response_deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AtomError::NoResponse { element: target.to_string() });
        }

        let keys = wire::xread(response_conn, &response_stream, &last_id, remaining.as_millis() as u64, None).await?;
        let Some(found) = keys.into_iter().find(|k| k.key == response_stream) else {
            continue;
        };

        for raw in found.ids {
            last_id = raw.id.clone();
            if field_str(&raw, "element").as_deref() != Some(target) {
                continue;
            }
            if field_str(&raw, "cmd_id").as_deref() != Some(cmd_id.as_str()) {
                continue;
            }
            let Some(err_code_raw) = raw.field("err_code") else {
                continue; // this is the ACK we already consumed; keep scanning
            };
            let err_code: i64 = String::from_utf8_lossy(err_code_raw)
                .parse()
                .map_err(|_| AtomError::InternalError("err_code is not an integer".to_string()))?;
            let err_str = field_str(&raw, "err_str").unwrap_or_default();
            let entry = Entry::from_wire(raw)?;
            let data = entry.field("data").unwrap_or(&[]).to_vec();
            return Ok(ElementResponse { err_code, err_str, data, method: entry.method });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_block_with_no_override() {
        let opts = SendCommandOptions::default();
        assert!(opts.block);
        assert!(opts.timeout_override_ms.is_none());
    }

    #[test]
    fn ack_only_response_is_success_with_empty_data() {
        let r = ElementResponse::ack_only();
        assert!(r.is_ok());
        assert!(r.data.is_empty());
    }
}
