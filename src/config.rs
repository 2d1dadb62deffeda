//! Element configuration: the §6 surface, plus environment-driven defaults
//! in the style of a `FromEnv`-style constructor.

use crate::error::{AtomError, AtomResult};
use std::env;

pub const ACK_TIMEOUT_MS: u64 = 1000;
pub const COMMAND_DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const NO_COMMAND_TIMEOUT_MS: u64 = 1000;
pub const MAXLEN_DEFAULT: usize = 1024;
pub const BUFFER_CAP_DEFAULT: usize = 20;
pub const DEFAULT_UNIX_SOCKET: &str = "/shared/redis.sock";
pub const DEFAULT_TCP_ENDPOINT: &str = "127.0.0.1:6379";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Unix,
    Tcp,
}

/// The eight RFC-5424-style severities the `log` stream's `level` field uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> AtomResult<Self> {
        Ok(match v {
            0 => LogLevel::Emerg,
            1 => LogLevel::Alert,
            2 => LogLevel::Crit,
            3 => LogLevel::Err,
            4 => LogLevel::Warning,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            7 => LogLevel::Debug,
            _ => {
                return Err(AtomError::InvalidCommand(format!(
                    "log level {v} out of range [0..7]"
                )))
            }
        })
    }

    fn from_name(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "EMERG" => LogLevel::Emerg,
            "ALERT" => LogLevel::Alert,
            "CRIT" => LogLevel::Crit,
            "ERR" => LogLevel::Err,
            "WARNING" => LogLevel::Warning,
            "NOTICE" => LogLevel::Notice,
            "INFO" => LogLevel::Info,
            "DEBUG" => LogLevel::Debug,
            _ => return None,
        })
    }
}

/// Configuration surface at element creation, per §6.
#[derive(Clone, Debug)]
pub struct ElementConfig {
    pub name: String,
    pub transport: Transport,
    pub endpoint: String,
    pub max_connections: usize,
    pub connection_wait_timeout_ms: u64,
    pub max_buffers: usize,
    pub buffer_wait_timeout_ms: u64,
    pub num_unix: usize,
    pub num_tcp: usize,
    pub log_level: LogLevel,
    pub language_tag: String,
    pub version_tag: String,
}

impl ElementConfig {
    /// A new config for `name`, reached over TCP at the §6 default endpoint,
    /// with every other field at its spec-mandated default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Tcp,
            endpoint: DEFAULT_TCP_ENDPOINT.to_string(),
            max_connections: 10,
            connection_wait_timeout_ms: ACK_TIMEOUT_MS,
            max_buffers: BUFFER_CAP_DEFAULT,
            buffer_wait_timeout_ms: ACK_TIMEOUT_MS,
            num_unix: 0,
            num_tcp: 1,
            log_level: LogLevel::Notice,
            language_tag: "rust".to_string(),
            version_tag: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_transport(mut self, transport: Transport, endpoint: impl Into<String>) -> Self {
        self.transport = transport;
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_max_buffers(mut self, n: usize) -> Self {
        self.max_buffers = n;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Loads an `ElementConfig` for `name`, applying environment overrides
    /// on top of the §6 defaults. Reads `ATOM_REDIS_SOCKET` (takes priority,
    /// selects the unix transport), else `ATOM_REDIS_HOST` (tcp), else the
    /// compiled-in default endpoint; `ATOM_MAX_CONNECTIONS`/`ATOM_MAX_BUFFERS`
    /// as integers; `DEFAULT_LOG_LEVEL` as one of the named severities.
    pub fn from_env(name: impl Into<String>) -> AtomResult<Self> {
        let mut config = Self::new(name);

        if let Ok(socket) = env::var("ATOM_REDIS_SOCKET") {
            config.transport = Transport::Unix;
            config.endpoint = socket;
        } else if let Ok(host) = env::var("ATOM_REDIS_HOST") {
            config.transport = Transport::Tcp;
            config.endpoint = host;
        }

        if let Ok(raw) = env::var("ATOM_MAX_CONNECTIONS") {
            config.max_connections = raw.parse().map_err(|_| {
                AtomError::InvalidCommand(format!("ATOM_MAX_CONNECTIONS: not an integer: {raw}"))
            })?;
        }

        if let Ok(raw) = env::var("ATOM_MAX_BUFFERS") {
            config.max_buffers = raw.parse().map_err(|_| {
                AtomError::InvalidCommand(format!("ATOM_MAX_BUFFERS: not an integer: {raw}"))
            })?;
        }

        if let Ok(raw) = env::var("DEFAULT_LOG_LEVEL") {
            config.log_level = LogLevel::from_name(&raw).ok_or_else(|| {
                AtomError::InvalidCommand(format!("DEFAULT_LOG_LEVEL: unrecognized level: {raw}"))
            })?;
        }

        Ok(config)
    }
}
