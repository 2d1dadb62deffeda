//! §4.10: reference objects — server-side blobs with optional TTLs, backed
//! by plain Redis strings under `ref:<uuid>:<field>` keys.

use crate::entry::{entry_read_n, Entry};
use crate::error::{AtomError, AtomResult};
use crate::naming;
use crate::pool::connection::RedisConnection;
use crate::wire;
use std::collections::HashMap;
use uuid::Uuid;

/// `create_reference_from_stream(element, stream, id?, ttl_ms?)`. Reads the
/// entry named by `id`, or the newest entry if `id` is omitted, then `SET`s
/// each of its fields into a fresh `ref:<uuid>:<field>` key (with `PX ttl_ms`
/// if given) and returns the field → key mapping. Expiration is delegated
/// entirely to Redis — there is no reaper on this side.
pub async fn create_reference_from_stream(
    conn: &mut RedisConnection,
    element: &str,
    stream: &str,
    id: Option<&str>,
    ttl_ms: Option<u64>,
) -> AtomResult<HashMap<String, String>> {
    let entry = match id {
        Some(wanted) => {
            let key = naming::stream_key(element, stream);
            let rows = wire::xrange(conn, &key, wanted, wanted, Some(1)).await?;
            let raw = rows
                .into_iter()
                .next()
                .ok_or_else(|| AtomError::InvalidCommand(format!("no entry '{wanted}' on {key}")))?;
            Entry::from_wire(raw)?
        }
        None => {
            let newest = entry_read_n(conn, element, stream, 1, None).await?;
            newest
                .into_iter()
                .next()
                .ok_or_else(|| AtomError::InvalidCommand(format!("stream:{element}:{stream} is empty")))?
        }
    };

    let reference_id = Uuid::new_v4();
    let mut out = HashMap::with_capacity(entry.fields.len());
    for (field, value) in &entry.fields {
        let key = format!("ref:{reference_id}:{field}");
        wire::set(conn, &key, value, ttl_ms).await?;
        out.insert(field.clone(), key);
    }
    Ok(out)
}

/// `get_reference(keys)`: a bulk `GET` over reference keys, `None` where the
/// key has already expired or never existed.
pub async fn get_reference(conn: &mut RedisConnection, keys: &[&str]) -> AtomResult<Vec<Option<Vec<u8>>>> {
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        out.push(wire::get(conn, key).await?);
    }
    Ok(out)
}

/// Remaining TTL in milliseconds; `-1` means no TTL set, `-2` means the key
/// does not exist (standard `PTTL` semantics, passed through unchanged).
pub async fn get_reference_timeout(conn: &mut RedisConnection, key: &str) -> AtomResult<i64> {
    wire::pttl(conn, key).await
}

/// Resets a reference key's TTL; `false` if the key does not exist.
pub async fn update_reference_timeout(conn: &mut RedisConnection, key: &str, ttl_ms: u64) -> AtomResult<bool> {
    wire::pexpire(conn, key, ttl_ms).await
}
