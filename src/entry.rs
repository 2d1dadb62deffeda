//! L4: the entry engine — write/read-n/read-since/read-loop over
//! `stream:<element>:<name>`.

use crate::config::MAXLEN_DEFAULT;
use crate::error::{AtomError, AtomResult};
use crate::naming;
use crate::pool::buffer::BufferPool;
use crate::pool::connection::RedisConnection;
use crate::serialization::{SerializationMethod, SER_KEY};
use crate::wire;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One decoded entry: a server-assigned id, the serialization method it
/// declared, and its user fields (raw bytes, ready for the caller's own
/// `SerializationMethod::decode_value`/`decode_dynamic`).
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub method: SerializationMethod,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl Entry {
    pub(crate) fn from_wire(raw: wire::StreamId) -> AtomResult<Self> {
        Self::from_wire_forcing(raw, None)
    }

    /// As `from_wire`, but when `force_method` is given it replaces the
    /// entry's declared `ser` rather than the one read off the wire — the
    /// `force_serialization` override on `entry_read_n`/`entry_read_since`
    /// (§4.5), used for bootstrap compatibility with a producer that didn't
    /// tag its entries correctly. A mismatched forced method surfaces as a
    /// decode failure the first time the caller actually decodes the value,
    /// since msgpack's wire format is self-describing and cheaply fallible —
    /// never silently handed back as garbage (§9 Open Question (c)).
    pub(crate) fn from_wire_forcing(raw: wire::StreamId, force_method: Option<SerializationMethod>) -> AtomResult<Self> {
        let method = match force_method {
            Some(m) => m,
            None => match raw.field(SER_KEY) {
                Some(bytes) => {
                    let s = std::str::from_utf8(bytes)
                        .map_err(|_| AtomError::InvalidCommand("ser value is not utf-8".to_string()))?;
                    SerializationMethod::parse(s)?
                }
                None => SerializationMethod::None,
            },
        };
        let fields = raw.fields.into_iter().filter(|(k, _)| k != SER_KEY).collect();
        Ok(Entry { id: raw.id, method, fields })
    }

    pub fn field(&self, key: &str) -> Option<&[u8]> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }

    /// The wall-clock time Redis assigned this entry, parsed from the
    /// `<ms>-<seq>` id (§3). Falls back to now if the id is somehow not in
    /// that shape, which should not happen for a server-assigned id.
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.id
            .split('-')
            .next()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_else(chrono::Utc::now)
    }

    /// How long ago this entry was written.
    pub fn age(&self) -> chrono::Duration {
        chrono::Utc::now() - self.timestamp()
    }
}

/// Validates that no user-supplied key is the reserved `ser` key and that
/// there are no duplicate keys, per §4.6.
fn validate_kv_pairs(kv_pairs: &[(&str, &[u8])]) -> AtomResult<()> {
    if kv_pairs.is_empty() {
        return Err(AtomError::InvalidCommand("entry_write requires at least one field".to_string()));
    }
    let mut seen = std::collections::HashSet::new();
    for (k, _) in kv_pairs {
        if *k == SER_KEY {
            return Err(AtomError::InvalidCommand("'ser' is a reserved key".to_string()));
        }
        if !seen.insert(*k) {
            return Err(AtomError::InvalidCommand(format!("duplicate key '{k}'")));
        }
    }
    Ok(())
}

/// `entry_write(stream, kv_pairs, method, maxlen?)`. Stages the encoded
/// field bytes through the buffer pool (bounding how many concurrent writes
/// an element may have in flight) before issuing one `XADD`.
pub async fn entry_write(
    conn: &mut RedisConnection,
    buffers: &Arc<BufferPool>,
    buffer_wait_timeout_ms: u64,
    element: &str,
    stream: &str,
    kv_pairs: &[(&str, &[u8])],
    method: SerializationMethod,
    maxlen: Option<usize>,
) -> AtomResult<String> {
    naming::validate_name(element)?;
    naming::validate_name(stream)?;
    validate_kv_pairs(kv_pairs)?;

    let buf = buffers.acquire(buffer_wait_timeout_ms).await?;
    let mut encoded: Vec<(String, Vec<u8>)> = Vec::with_capacity(kv_pairs.len() + 1);
    encoded.push((SER_KEY.to_string(), method.as_str().as_bytes().to_vec()));
    for (k, v) in kv_pairs {
        let value = method.encode_bytes(v)?;
        encoded.push((k.to_string(), value));
    }

    let staged: Vec<u8> = encoded.iter().flat_map(|(k, v)| {
        let mut bytes = k.as_bytes().to_vec();
        bytes.extend_from_slice(v);
        bytes
    }).collect();
    buffers.fill(&buf, &staged).await;
    let staged_len = staged.len();
    buffers.release(buf, staged_len).await;

    let key = naming::stream_key(element, stream);
    let fields: Vec<(&str, &[u8])> = encoded.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    let id = wire::xadd(conn, &key, maxlen.or(Some(MAXLEN_DEFAULT)), &fields).await?;
    debug!(element, stream, id = %id, "entry_write");
    Ok(id)
}

/// `entry_read_n(element, stream, n, method?)`. Newest-first via
/// `XREVRANGE`. `method` forces `force_serialization` (§4.5) on every
/// returned entry instead of trusting its declared `ser`.
pub async fn entry_read_n(
    conn: &mut RedisConnection,
    element: &str,
    stream: &str,
    n: usize,
    method: Option<SerializationMethod>,
) -> AtomResult<Vec<Entry>> {
    naming::validate_name(element)?;
    naming::validate_name(stream)?;
    let key = naming::stream_key(element, stream);
    let raw = wire::xrevrange(conn, &key, n).await?;
    raw.into_iter().map(|e| Entry::from_wire_forcing(e, method)).collect()
}

/// `entry_read_since(element, stream, n, last_id, block_ms?, method?)`.
/// `"$"` means "only strictly newer than now"; `"0"` means "from the
/// beginning"; `block_ms == 0` blocks indefinitely. Returns
/// `(entries, new_last_id)`; `new_last_id` equals `last_id` unchanged when
/// the read times out empty. `method` forces `force_serialization` (§4.5)
/// as in `entry_read_n`.
pub async fn entry_read_since(
    conn: &mut RedisConnection,
    element: &str,
    stream: &str,
    n: usize,
    last_id: &str,
    block_ms: u64,
    method: Option<SerializationMethod>,
) -> AtomResult<(Vec<Entry>, String)> {
    naming::validate_name(element)?;
    naming::validate_name(stream)?;
    let key = naming::stream_key(element, stream);
    let keys = wire::xread(conn, &key, last_id, block_ms, Some(n)).await?;
    let Some(found) = keys.into_iter().find(|k| k.key == key) else {
        return Ok((Vec::new(), last_id.to_string()));
    };
    let new_last_id = found.ids.last().map(|e| e.id.clone()).unwrap_or_else(|| last_id.to_string());
    let entries = found
        .ids
        .into_iter()
        .map(|e| Entry::from_wire_forcing(e, method))
        .collect::<AtomResult<Vec<_>>>()?;
    Ok((entries, new_last_id))
}

/// A single subscription inside a read loop: which `(element, stream)` to
/// track, and the handler to invoke for each entry it delivers.
pub struct ReadLoopHandler<'a> {
    pub element: String,
    pub stream: String,
    pub handler: Box<dyn FnMut(&Entry) -> AtomResult<()> + Send + 'a>,
}

/// `entry_read_loop(handlers, n_loops?, block_ms?)`. Issues exactly one
/// multi-stream `XREAD` per iteration across every tracked `(element,
/// stream)` pair, dispatches each returned entry to its handler in Redis's
/// reply order, and advances that stream's last-seen id. A single combined
/// call is required rather than one `XREAD` per handler: with `block_ms ==
/// 0` ("block indefinitely") a per-handler call on the first handler would
/// never return, starving every other handler. A handler failure is logged
/// and does not abort the loop (§4.6, §7).
pub async fn entry_read_loop(
    conn: &mut RedisConnection,
    handlers: &mut [ReadLoopHandler<'_>],
    n_loops: u64,
    block_ms: u64,
) -> AtomResult<()> {
    let keys: Vec<String> = handlers.iter().map(|h| naming::stream_key(&h.element, &h.stream)).collect();
    let mut last_ids: HashMap<String, String> = keys.iter().cloned().map(|k| (k, "$".to_string())).collect();

    let mut iterations: u64 = 0;
    loop {
        let streams: Vec<(&str, &str)> = keys
            .iter()
            .map(|k| (k.as_str(), last_ids.get(k).map(String::as_str).unwrap_or("$")))
            .collect();
        let found_keys = wire::xread_multi(conn, &streams, block_ms, None).await?;

        for handler in handlers.iter_mut() {
            let key = naming::stream_key(&handler.element, &handler.stream);
            let Some(found) = found_keys.iter().find(|k| k.key == key) else {
                continue;
            };
            for raw in &found.ids {
                let entry = Entry::from_wire(raw.clone())?;
                last_ids.insert(key.clone(), entry.id.clone());
                if let Err(e) = (handler.handler)(&entry) {
                    warn!(element = %handler.element, stream = %handler.stream, error = %e, "read loop handler failed");
                }
            }
        }

        iterations += 1;
        if n_loops != 0 && iterations >= n_loops {
            break;
        }
    }
    Ok(())
}
