//! L1: thin wrapper over a Redis connection offering exactly the operations
//! the rest of the crate needs, plus the three reply-parsing shapes (§4.2).
//!
//! Grounded in `redis-streams`' hand-rolled `FromRedisValue` impls for
//! stream replies, generalized to preserve field order (parsing straight
//! into a `HashMap` loses emit order; this crate needs emit order to keep
//! `ser` first and to support ordered round-trips).

use crate::error::AtomResult;
use crate::pool::connection::RedisConnection;
use redis::{from_redis_value, ErrorKind, RedisError, Value};

/// One stream entry: a server-assigned id plus its fields in emit order.
#[derive(Debug, Clone, Default)]
pub struct StreamId {
    pub id: String,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl StreamId {
    pub fn field(&self, key: &str) -> Option<&[u8]> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }
}

/// One stream's worth of entries, as returned by `XREAD`/`XREADGROUP`.
#[derive(Debug, Clone, Default)]
pub struct StreamKey {
    pub key: String,
    pub ids: Vec<StreamId>,
}

fn parse_error(context: &str) -> RedisError {
    RedisError::from((ErrorKind::TypeError, "unexpected reply shape", context.to_string()))
}

/// Parses one `[id, [k1, v1, k2, v2, ...]]` pair, the unit cell of both the
/// *entry map* and *multi-stream entry list* shapes.
fn parse_stream_id(v: &Value) -> AtomResult<StreamId> {
    let Value::Array(parts) = v else {
        return Err(parse_error("expected id/fields pair").into());
    };
    let [id_v, fields_v] = parts.as_slice() else {
        return Err(parse_error("expected exactly [id, fields]").into());
    };
    let id: String = from_redis_value(id_v)?;

    let Value::Array(flat) = fields_v else {
        return Err(parse_error("expected flat field array").into());
    };
    let mut fields = Vec::with_capacity(flat.len() / 2);
    let mut it = flat.iter();
    while let (Some(k), Some(val)) = (it.next(), it.next()) {
        let key: String = from_redis_value(k)?;
        let value: Vec<u8> = from_redis_value(val)?;
        fields.push((key, value));
    }
    Ok(StreamId { id, fields })
}

/// *Entry map*: the reply shape of `XRANGE`/`XREVRANGE` — an array of
/// `(id, fields[])` pairs, in server order.
pub fn parse_entry_map(v: &Value) -> AtomResult<Vec<StreamId>> {
    let Value::Array(rows) = v else {
        return Err(parse_error("expected entry-map array").into());
    };
    rows.iter().map(parse_stream_id).collect()
}

/// *Multi-stream entry list*: the reply shape of `XREAD`/`XREADGROUP` — an
/// array of `(stream_name, entry_map)` pairs. Returns an empty vec on a nil
/// reply (block timeout), which is not an error (§4.6).
pub fn parse_multi_stream(v: &Value) -> AtomResult<Vec<StreamKey>> {
    if matches!(v, Value::Nil) {
        return Ok(Vec::new());
    }
    let Value::Array(rows) = v else {
        return Err(parse_error("expected multi-stream array").into());
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Value::Array(parts) = row else {
            return Err(parse_error("expected [stream, entries] pair").into());
        };
        let [key_v, ids_v] = parts.as_slice() else {
            return Err(parse_error("expected exactly [stream, entries]").into());
        };
        let key: String = from_redis_value(key_v)?;
        let Value::Array(id_rows) = ids_v else {
            return Err(parse_error("expected entry-map array").into());
        };
        let ids = id_rows.iter().map(parse_stream_id).collect::<AtomResult<Vec<_>>>()?;
        out.push(StreamKey { key, ids });
    }
    Ok(out)
}

/// `XADD stream [MAXLEN ~ maxlen] id field value [field value ...]` →
/// the new entry id.
pub async fn xadd(
    conn: &mut RedisConnection,
    stream: &str,
    maxlen: Option<usize>,
    fields: &[(&str, &[u8])],
) -> AtomResult<String> {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream);
    if let Some(n) = maxlen {
        if n > 0 {
            cmd.arg("MAXLEN").arg("~").arg(n);
        }
    }
    cmd.arg("*");
    for (k, v) in fields {
        cmd.arg(*k).arg(*v);
    }
    let id: String = cmd.query_async(conn).await?;
    Ok(id)
}

/// `XREVRANGE stream + - COUNT n` → newest-first entries.
pub async fn xrevrange(conn: &mut RedisConnection, stream: &str, count: usize) -> AtomResult<Vec<StreamId>> {
    let reply: Value = redis::cmd("XREVRANGE")
        .arg(stream)
        .arg("+")
        .arg("-")
        .arg("COUNT")
        .arg(count)
        .query_async(conn)
        .await?;
    parse_entry_map(&reply)
}

/// `XRANGE stream start end [COUNT n]`.
pub async fn xrange(
    conn: &mut RedisConnection,
    stream: &str,
    start: &str,
    end: &str,
    count: Option<usize>,
) -> AtomResult<Vec<StreamId>> {
    let mut cmd = redis::cmd("XRANGE");
    cmd.arg(stream).arg(start).arg(end);
    if let Some(n) = count {
        cmd.arg("COUNT").arg(n);
    }
    let reply: Value = cmd.query_async(conn).await?;
    parse_entry_map(&reply)
}

/// `XREAD [BLOCK block_ms] COUNT count STREAMS stream id`. Empty on block
/// timeout, which is not an error.
pub async fn xread(
    conn: &mut RedisConnection,
    stream: &str,
    last_id: &str,
    block_ms: u64,
    count: Option<usize>,
) -> AtomResult<Vec<StreamKey>> {
    let mut cmd = redis::cmd("XREAD");
    cmd.arg("BLOCK").arg(block_ms);
    if let Some(n) = count {
        cmd.arg("COUNT").arg(n);
    }
    cmd.arg("STREAMS").arg(stream).arg(last_id);
    let reply: Value = cmd.query_async(conn).await?;
    parse_multi_stream(&reply)
}

/// `XREAD [BLOCK block_ms] COUNT count STREAMS key1 key2 ... id1 id2 ...`,
/// one call covering every tracked stream so a block on one never starves
/// the others. Empty on block timeout, which is not an error.
pub async fn xread_multi(
    conn: &mut RedisConnection,
    streams: &[(&str, &str)],
    block_ms: u64,
    count: Option<usize>,
) -> AtomResult<Vec<StreamKey>> {
    let mut cmd = redis::cmd("XREAD");
    cmd.arg("BLOCK").arg(block_ms);
    if let Some(n) = count {
        cmd.arg("COUNT").arg(n);
    }
    cmd.arg("STREAMS");
    for (key, _) in streams {
        cmd.arg(*key);
    }
    for (_, id) in streams {
        cmd.arg(*id);
    }
    let reply: Value = cmd.query_async(conn).await?;
    parse_multi_stream(&reply)
}

/// `XREADGROUP GROUP group consumer [BLOCK block_ms] COUNT count STREAMS stream id`.
pub async fn xreadgroup(
    conn: &mut RedisConnection,
    group: &str,
    consumer: &str,
    stream: &str,
    id: &str,
    block_ms: u64,
    count: Option<usize>,
) -> AtomResult<Vec<StreamKey>> {
    let mut cmd = redis::cmd("XREADGROUP");
    cmd.arg("GROUP").arg(group).arg(consumer);
    cmd.arg("BLOCK").arg(block_ms);
    if let Some(n) = count {
        cmd.arg("COUNT").arg(n);
    }
    cmd.arg("STREAMS").arg(stream).arg(id);
    let reply: Value = cmd.query_async(conn).await?;
    parse_multi_stream(&reply)
}

pub async fn xgroup_create_mkstream(
    conn: &mut RedisConnection,
    stream: &str,
    group: &str,
    id: &str,
) -> AtomResult<()> {
    let result: AtomResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(group)
        .arg(id)
        .arg("MKSTREAM")
        .query_async(conn)
        .await
        .map_err(Into::into);
    match result {
        Ok(()) => Ok(()),
        Err(crate::error::AtomError::RedisError(msg)) if msg.contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(e),
    }
}

pub async fn xgroup_destroy(conn: &mut RedisConnection, stream: &str, group: &str) -> AtomResult<()> {
    let _: i64 = redis::cmd("XGROUP").arg("DESTROY").arg(stream).arg(group).query_async(conn).await?;
    Ok(())
}

pub async fn xack(conn: &mut RedisConnection, stream: &str, group: &str, id: &str) -> AtomResult<()> {
    let _: i64 = redis::cmd("XACK").arg(stream).arg(group).arg(id).query_async(conn).await?;
    Ok(())
}

pub async fn xdel(conn: &mut RedisConnection, stream: &str, id: &str) -> AtomResult<()> {
    let _: i64 = redis::cmd("XDEL").arg(stream).arg(id).query_async(conn).await?;
    Ok(())
}

pub async fn del(conn: &mut RedisConnection, key: &str) -> AtomResult<()> {
    let _: i64 = redis::cmd("UNLINK").arg(key).query_async(conn).await?;
    Ok(())
}

pub async fn set(conn: &mut RedisConnection, key: &str, value: &[u8], px_ms: Option<u64>) -> AtomResult<()> {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(ms) = px_ms {
        cmd.arg("PX").arg(ms);
    }
    let _: () = cmd.query_async(conn).await?;
    Ok(())
}

pub async fn get(conn: &mut RedisConnection, key: &str) -> AtomResult<Option<Vec<u8>>> {
    let v: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(conn).await?;
    Ok(v)
}

pub async fn pttl(conn: &mut RedisConnection, key: &str) -> AtomResult<i64> {
    let v: i64 = redis::cmd("PTTL").arg(key).query_async(conn).await?;
    Ok(v)
}

pub async fn pexpire(conn: &mut RedisConnection, key: &str, ms: u64) -> AtomResult<bool> {
    let v: i64 = redis::cmd("PEXPIRE").arg(key).arg(ms).query_async(conn).await?;
    Ok(v == 1)
}

/// `SCAN cursor MATCH pattern`, collected to completion (cursor `0` ends
/// the iteration). Used by discovery (§4.8), over bounded key spaces
/// (`command:*`, `stream:*`), never a full unfiltered scan.
pub async fn scan_match(conn: &mut RedisConnection, pattern: &str) -> AtomResult<Vec<String>> {
    let mut cursor: u64 = 0;
    let mut out = Vec::new();
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(200)
            .query_async(conn)
            .await?;
        out.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    Ok(out)
}
