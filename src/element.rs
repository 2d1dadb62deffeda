//! L5: the element facade (§4.9) binding L0–L4 into one identity — owns the
//! connection and buffer pools, the command table, and the stream lifecycle.

use crate::command::{self, CommandDescriptor, CommandTable, ElementResponse, SendCommandOptions};
use crate::config::{ElementConfig, Transport};
use crate::entry::{entry_read_loop, entry_read_n, entry_read_since, entry_write, Entry, ReadLoopHandler};
use crate::error::{AtomError, AtomResult};
use crate::logging;
use crate::naming;
use crate::pool::connection::PooledConnection;
use crate::pool::{BufferPool, ConnectionPool};
use crate::serialization::SerializationMethod;
use crate::wire;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Duration};
use tracing::info;

/// A running element: an identity bound to a command/response stream pair,
/// a command table, and its own connection and buffer pools.
pub struct Element {
    name: String,
    config: ElementConfig,
    pool: Arc<ConnectionPool>,
    buffers: Arc<BufferPool>,
    table: CommandTable,
    published_streams: Mutex<HashSet<String>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Element {
    /// Connects per `config`, builds its pools, registers the built-in
    /// `version`/`healthcheck`/`command_list` commands, and performs the
    /// one-shot `{language, version}` announce write to both
    /// `command:<name>` and `response:<name>` (§4.9).
    pub async fn new(config: ElementConfig) -> AtomResult<Self> {
        naming::validate_name(&config.name)?;

        let (unix_client, tcp_client) = build_clients(&config)?;
        let pool = Arc::new(ConnectionPool::new(unix_client, tcp_client, config.max_connections));
        pool.seed(config.num_unix, config.num_tcp).await?;
        let buffers = Arc::new(BufferPool::new(config.max_buffers));
        let table = CommandTable::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let element = Self {
            name: config.name.clone(),
            config,
            pool,
            buffers,
            table,
            published_streams: Mutex::new(HashSet::new()),
            shutdown_tx,
            shutdown_rx,
        };

        element.register_builtin_commands();
        element.announce().await?;
        info!(element = %element.name, "element announced");
        Ok(element)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_table(&self) -> &CommandTable {
        &self.table
    }

    fn transport(&self) -> Transport {
        self.config.transport
    }

    async fn checkout(&self) -> AtomResult<PooledConnection> {
        self.pool.get(self.transport(), self.config.connection_wait_timeout_ms).await
    }

    fn register_builtin_commands(&self) {
        let version_tag = self.config.version_tag.clone();
        let language_tag = self.config.language_tag.clone();
        self.table.add(
            CommandDescriptor::msgpack_both("version", 1000, move |_| {
                let mut map = Vec::new();
                map.push((rmpv::Value::from("language"), rmpv::Value::from(language_tag.clone())));
                map.push((rmpv::Value::from("version"), rmpv::Value::from(version_tag.clone())));
                Ok(rmpv::Value::Map(map))
            })
            .with_description("reports this element's language and version tag"),
        );

        self.table.add(
            CommandDescriptor::raw("healthcheck", 1000, |_| Ok(Vec::new()))
                .with_description("returns success if the element is healthy; override to add real checks"),
        );

        let table_for_list = self.table.clone();
        self.table.add(CommandDescriptor {
            name: "command_list".to_string(),
            description: "lists this element's registered command names".to_string(),
            kind: crate::command::HandlerKind::ResponseOnly(Box::new(move || {
                let names = table_for_list.names();
                Ok(rmpv::Value::Array(names.into_iter().map(rmpv::Value::from).collect()))
            })),
            timeout_ms: 1000,
            validate: None,
        });
    }

    async fn announce(&self) -> AtomResult<()> {
        let mut pooled = self.checkout().await?;
        let conn = pooled.as_mut();
        let fields: [(&str, &[u8]); 2] = [
            ("language", self.config.language_tag.as_bytes()),
            ("version", self.config.version_tag.as_bytes()),
        ];
        wire::xadd(conn, &naming::command_key(&self.name), Some(1), &fields).await?;
        wire::xadd(conn, &naming::response_key(&self.name), Some(1), &fields).await?;
        self.pool.release(pooled).await;
        Ok(())
    }

    /// Signals the command loop to stop and removes this element's
    /// command/response streams (§4.9 lifecycle). Idempotent: `UNLINK` on an
    /// already-absent key is a no-op.
    pub async fn teardown(&self) -> AtomResult<()> {
        self.stop();
        let mut pooled = self.checkout().await?;
        let conn = pooled.as_mut();
        wire::del(conn, &naming::command_key(&self.name)).await?;
        wire::del(conn, &naming::response_key(&self.name)).await?;
        self.pool.release(pooled).await;
        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn add_command(&self, descriptor: CommandDescriptor) {
        self.table.add(descriptor);
    }

    /// Runs the command loop (§4.7.1) until `stop`/`teardown` or `n_loops`
    /// iterations elapse (`0` = forever). Holds two dedicated connections
    /// for the loop's entire lifetime rather than cycling them per entry.
    pub async fn run_command_loop(&self, n_loops: u64) -> AtomResult<()> {
        let mut read_pooled = self.checkout().await?;
        let mut write_pooled = self.checkout().await?;
        let result = command::run_command_loop(
            &self.name,
            read_pooled.as_mut(),
            write_pooled.as_mut(),
            &self.table,
            n_loops,
            self.shutdown_rx.clone(),
        )
        .await;
        self.pool.release(read_pooled).await;
        self.pool.release(write_pooled).await;
        result
    }

    /// `send_command(target, cmd, data, options)` (§4.7.2). Uses two
    /// dedicated connections for the request and the ACK/response wait.
    pub async fn send_command(
        &self,
        target: &str,
        cmd: &str,
        data: &[u8],
        options: SendCommandOptions,
    ) -> AtomResult<ElementResponse> {
        let mut request = self.checkout().await?;
        let mut response = self.checkout().await?;
        let result = command::send_command(
            request.as_mut(),
            response.as_mut(),
            &self.name,
            target,
            cmd,
            data,
            options,
        )
        .await;
        self.pool.release(request).await;
        self.pool.release(response).await;
        result
    }

    pub async fn entry_write(
        &self,
        stream: &str,
        kv_pairs: &[(&str, &[u8])],
        method: SerializationMethod,
        maxlen: Option<usize>,
    ) -> AtomResult<String> {
        let mut pooled = self.checkout().await?;
        let id = entry_write(
            pooled.as_mut(),
            &self.buffers,
            self.config.buffer_wait_timeout_ms,
            &self.name,
            stream,
            kv_pairs,
            method,
            maxlen,
        )
        .await;
        self.pool.release(pooled).await;
        let id = id?;
        self.published_streams.lock().await.insert(stream.to_string());
        Ok(id)
    }

    pub async fn entry_read_n(
        &self,
        element: &str,
        stream: &str,
        n: usize,
        method: Option<SerializationMethod>,
    ) -> AtomResult<Vec<Entry>> {
        let mut pooled = self.checkout().await?;
        let result = entry_read_n(pooled.as_mut(), element, stream, n, method).await;
        self.pool.release(pooled).await;
        result
    }

    pub async fn entry_read_since(
        &self,
        element: &str,
        stream: &str,
        n: usize,
        last_id: &str,
        block_ms: u64,
        method: Option<SerializationMethod>,
    ) -> AtomResult<(Vec<Entry>, String)> {
        let mut pooled = self.checkout().await?;
        let result = entry_read_since(pooled.as_mut(), element, stream, n, last_id, block_ms, method).await;
        self.pool.release(pooled).await;
        result
    }

    /// Runs `entry_read_loop` (§4.6) over `handlers` on a single dedicated
    /// connection, held for the loop's entire lifetime like
    /// `run_command_loop`'s.
    pub async fn entry_read_loop(
        &self,
        handlers: &mut [ReadLoopHandler<'_>],
        n_loops: u64,
        block_ms: u64,
    ) -> AtomResult<()> {
        let mut pooled = self.checkout().await?;
        let result = entry_read_loop(pooled.as_mut(), handlers, n_loops, block_ms).await;
        self.pool.release(pooled).await;
        result
    }

    pub async fn published_streams(&self) -> Vec<String> {
        let mut names: Vec<String> = self.published_streams.lock().await.iter().cloned().collect();
        names.sort();
        names
    }

    /// Writes one entry to the shared `log` stream (§4.8).
    pub async fn log(&self, level: crate::config::LogLevel, msg: &str) -> AtomResult<String> {
        let mut pooled = self.checkout().await?;
        let result = logging::log(pooled.as_mut(), &self.name, level, msg).await;
        self.pool.release(pooled).await;
        result
    }

    /// `wait_for_elements_healthy(names, retry_ms)` (§4.9): polls each named
    /// element's `healthcheck` until all respond successfully. Callers bound
    /// the overall wait with their own `tokio::time::timeout`.
    pub async fn wait_for_elements_healthy(&self, names: &[&str], retry_ms: u64) -> AtomResult<()> {
        let mut pending: HashSet<String> = names.iter().map(|s| s.to_string()).collect();
        while !pending.is_empty() {
            let mut healthy = Vec::new();
            for name in &pending {
                let result = self.send_command(name, "healthcheck", &[], SendCommandOptions::default()).await;
                if matches!(result, Ok(r) if r.is_ok()) {
                    healthy.push(name.clone());
                }
            }
            for name in healthy {
                pending.remove(&name);
            }
            if !pending.is_empty() {
                sleep(Duration::from_millis(retry_ms)).await;
            }
        }
        Ok(())
    }
}

fn build_clients(config: &ElementConfig) -> AtomResult<(Option<redis::Client>, Option<redis::Client>)> {
    match config.transport {
        Transport::Unix => {
            let url = format!("redis+unix://{}", config.endpoint);
            let client = redis::Client::open(url).map_err(AtomError::from)?;
            Ok((Some(client), None))
        }
        Transport::Tcp => {
            let url = format!("redis://{}", config.endpoint);
            let client = redis::Client::open(url).map_err(AtomError::from)?;
            Ok((None, Some(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElementConfig;

    #[test]
    fn build_clients_picks_transport_matching_config() {
        let tcp_config = ElementConfig::new("robot").with_transport(Transport::Tcp, "127.0.0.1:6379");
        let (unix, tcp) = build_clients(&tcp_config).unwrap();
        assert!(unix.is_none());
        assert!(tcp.is_some());

        let unix_config = ElementConfig::new("robot").with_transport(Transport::Unix, "/tmp/r.sock");
        let (unix, tcp) = build_clients(&unix_config).unwrap();
        assert!(unix.is_some());
        assert!(tcp.is_none());
    }
}
