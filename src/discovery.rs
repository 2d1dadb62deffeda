//! §4.8 discovery: enumerating live elements, their published streams, and
//! (via the `command_list` handshake) their registered commands.

use crate::command::{send_command, SendCommandOptions};
use crate::error::{AtomError, AtomResult};
use crate::naming;
use crate::pool::connection::RedisConnection;
use crate::wire;

/// Every element that has ever announced itself (§4.9), deduplicated and
/// sorted. Built on the `command:*` key space — an element exists from the
/// moment its `Element::new` announce write lands.
pub async fn list_elements(conn: &mut RedisConnection) -> AtomResult<Vec<String>> {
    let keys = wire::scan_match(conn, "command:*").await?;
    let mut names: Vec<String> = keys
        .iter()
        .filter_map(|k| naming::element_from_command_key(k))
        .map(|s| s.to_string())
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Every `stream:<element>:<name>` stream, as `(element, stream)` pairs,
/// optionally restricted to one element.
pub async fn list_streams(conn: &mut RedisConnection, element: Option<&str>) -> AtomResult<Vec<(String, String)>> {
    let pattern = match element {
        Some(e) => format!("stream:{e}:*"),
        None => "stream:*".to_string(),
    };
    let keys = wire::scan_match(conn, &pattern).await?;
    let mut pairs: Vec<(String, String)> = keys
        .iter()
        .filter_map(naming::element_and_stream_from_stream_key)
        .map(|(e, s)| (e.to_string(), s.to_string()))
        .collect();
    pairs.sort();
    pairs.dedup();
    Ok(pairs)
}

/// Enumerates `target`'s registered commands by invoking its built-in
/// `command_list` handshake (§4.8) and decoding the msgpack array it returns.
pub async fn list_commands(
    request_conn: &mut RedisConnection,
    response_conn: &mut RedisConnection,
    caller: &str,
    target: &str,
) -> AtomResult<Vec<String>> {
    let response = send_command(
        request_conn,
        response_conn,
        caller,
        target,
        "command_list",
        &[],
        SendCommandOptions::default(),
    )
    .await?;

    if !response.is_ok() {
        return Err(AtomError::UnsupportedCommand {
            element: target.to_string(),
            cmd: "command_list".to_string(),
        });
    }

    let value = response.method.decode_dynamic(&response.data)?;
    let rmpv::Value::Array(items) = value else {
        return Err(AtomError::InternalError(
            "command_list response is not an array".to_string(),
        ));
    };
    items
        .into_iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| AtomError::InternalError("command_list entry is not a string".to_string()))
        })
        .collect()
}
