//! Server-side half of the command protocol (§4.7.1): the command loop.
//!
//! Same shape as a worker `run()` loop elsewhere in this codebase:
//! block-with-timeout XREAD, `select!` against a shutdown signal, process,
//! advance the cursor — with the batch-processing step replaced by
//! ACK-then-dispatch-then-respond.

use crate::command::handler;
use crate::command::table::CommandTable;
use crate::config::NO_COMMAND_TIMEOUT_MS;
use crate::entry::Entry;
use crate::error::{AtomError, AtomResult};
use crate::naming;
use crate::pool::connection::RedisConnection;
use crate::serialization::SerializationMethod;
use crate::wire;
use tokio::sync::watch;
use tracing::warn;

/// How long each `XREAD BLOCK` waits before re-checking the shutdown signal.
const POLL_BLOCK_MS: u64 = 1000;

async fn emit_ack(
    conn: &mut RedisConnection,
    caller: &str,
    target: &str,
    cmd_id: &str,
    timeout_ms: u64,
) -> AtomResult<()> {
    let key = naming::response_key(caller);
    let timeout_str = timeout_ms.to_string();
    let fields: [(&str, &[u8]); 3] = [
        ("element", target.as_bytes()),
        ("cmd_id", cmd_id.as_bytes()),
        ("timeout", timeout_str.as_bytes()),
    ];
    wire::xadd(conn, &key, Some(1024), &fields).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn emit_response(
    conn: &mut RedisConnection,
    caller: &str,
    target: &str,
    cmd_id: &str,
    cmd_name: &str,
    err_code: i64,
    err_str: &str,
    data: &[u8],
    method: SerializationMethod,
) -> AtomResult<()> {
    let key = naming::response_key(caller);
    let err_code_str = err_code.to_string();
    let fields: [(&str, &[u8]); 7] = [
        ("element", target.as_bytes()),
        ("cmd", cmd_name.as_bytes()),
        ("cmd_id", cmd_id.as_bytes()),
        ("err_code", err_code_str.as_bytes()),
        ("err_str", err_str.as_bytes()),
        ("data", data),
        ("ser", method.as_str().as_bytes()),
    ];
    wire::xadd(conn, &key, Some(1024), &fields).await?;
    Ok(())
}

/// Runs the command loop for `self_name` until `shutdown` fires or
/// `n_loops` iterations elapse (`0` means run forever).
///
/// `read_conn` is dedicated to the blocking `XREAD` on `command:<self_name>`;
/// `write_conn` is dedicated to emitting ACK and response entries. Both are
/// obtained once at element creation and held for the command loop's
/// lifetime, never cycled back through the pool mid-loop (§4.7.1).
pub async fn run_command_loop(
    self_name: &str,
    read_conn: &mut RedisConnection,
    write_conn: &mut RedisConnection,
    table: &CommandTable,
    n_loops: u64,
    mut shutdown: watch::Receiver<bool>,
) -> AtomResult<()> {
    let command_stream = naming::command_key(self_name);
    let mut last_id = "$".to_string();
    let mut iterations: u64 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let found = tokio::select! {
            result = wire::xread(read_conn, &command_stream, &last_id, POLL_BLOCK_MS, None) => result?,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let Some(stream) = found.into_iter().find(|k| k.key == command_stream) else {
            continue;
        };

        for raw in stream.ids {
            last_id = raw.id.clone();
            let cmd_id = raw.id.clone();

            let entry = match Entry::from_wire(raw) {
                Ok(e) => e,
                Err(e) => {
                    warn!(element = self_name, error = %e, "dropping malformed command entry");
                    continue;
                }
            };

            let Some(caller) = entry
                .field("element")
                .map(|b| String::from_utf8_lossy(b).to_string())
            else {
                warn!(element = self_name, cmd_id = %cmd_id, "command entry with no caller, cannot ACK");
                continue;
            };

            let cmd_name = entry.field("cmd").map(|b| String::from_utf8_lossy(b).to_string());
            let data = entry.field("data").unwrap_or(&[]).to_vec();
            let descriptor = cmd_name.as_deref().and_then(|n| table.get(n));
            let timeout_ms = descriptor
                .as_ref()
                .map(|d| d.timeout_ms)
                .unwrap_or(NO_COMMAND_TIMEOUT_MS);

            emit_ack(write_conn, &caller, self_name, &cmd_id, timeout_ms).await?;

            let (err_code, err_str, out_data, out_method) = match (&cmd_name, &descriptor) {
                (None, _) => {
                    let e = AtomError::InvalidCommand("command entry is missing 'cmd'".to_string());
                    (e.wire_code(), e.to_string(), Vec::new(), SerializationMethod::None)
                }
                (Some(name), None) => {
                    let e = AtomError::UnsupportedCommand {
                        element: self_name.to_string(),
                        cmd: name.clone(),
                    };
                    (e.wire_code(), e.to_string(), Vec::new(), SerializationMethod::None)
                }
                (Some(_), Some(d)) => match handler::dispatch(d, &data, entry.method) {
                    Ok((bytes, method)) => (0, String::new(), bytes, method),
                    Err(e) => (e.wire_code(), e.to_string(), Vec::new(), SerializationMethod::None),
                },
            };

            emit_response(
                write_conn,
                &caller,
                self_name,
                &cmd_id,
                cmd_name.as_deref().unwrap_or(""),
                err_code,
                &err_str,
                &out_data,
                out_method,
            )
            .await?;
        }

        iterations += 1;
        if n_loops != 0 && iterations >= n_loops {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handler::CommandDescriptor;

    #[test]
    fn table_lookup_falls_back_to_default_timeout_when_command_unknown() {
        let table = CommandTable::new();
        table.add(CommandDescriptor::raw("known", 5000, |d| Ok(d.to_vec())));
        assert_eq!(table.get("known").unwrap().timeout_ms, 5000);
        assert!(table.get("unknown").is_none());
        assert_eq!(NO_COMMAND_TIMEOUT_MS, 1000);
    }
}
