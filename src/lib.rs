//! Atom: a distributed messaging and RPC fabric over Redis Streams.
//!
//! Independent processes ("elements") exchange data through a shared Redis
//! server acting as the transport. Each element simultaneously publishes
//! time-ordered entries on named streams, subscribes to other elements'
//! streams, accepts commands and produces responses, and issues commands to
//! other elements and awaits their replies.
//!
//! The crate is layered bottom-up:
//!
//! - [`naming`] (L0) — pure key derivation and name validation.
//! - [`wire`] (L1) — the thin Redis command surface and reply parsing.
//! - [`pool`] (L2) — the buffer pool and connection pool.
//! - [`serialization`] (L3) — pluggable `{none, msgpack, arrow}` encoding.
//! - [`entry`] and [`command`] (L4) — the entry engine and the
//!   request/ACK/response command protocol.
//! - [`element`] (L5) — the facade binding all of the above into one
//!   element identity, plus [`logging`], [`discovery`], and [`reference`].
//!
//! Most applications only need [`element::Element`] and [`config::ElementConfig`].

pub mod command;
pub mod config;
pub mod discovery;
pub mod element;
pub mod entry;
pub mod error;
pub mod logging;
pub mod naming;
pub mod pool;
pub mod reference;
pub mod serialization;
pub mod wire;

pub use command::{CommandDescriptor, CommandTable, ElementResponse, HandlerKind, SendCommandOptions};
pub use config::{ElementConfig, LogLevel, Transport};
pub use element::Element;
pub use error::{AtomError, AtomResult};
pub use serialization::SerializationMethod;
