//! The command protocol (§4.7): typed handlers, the per-element command
//! table, and the client/server halves of the request-ACK-response exchange.

pub mod client;
pub mod handler;
pub mod server;
pub mod table;

pub use client::{send_command, ElementResponse, SendCommandOptions};
pub use handler::{CommandDescriptor, HandlerKind};
pub use server::run_command_loop;
pub use table::CommandTable;
