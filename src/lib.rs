//! TCP relay for a single shared chat room.
//!
//! The server accepts any number of clients speaking plain newline-delimited
//! text. Every line received from one client is forwarded verbatim to all
//! *other* connected clients and echoed on the operator console. Each module
//! focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for the relay binary.
//! - [`line`] frames a byte stream into newline-delimited text records,
//!   flushing after every written record.
//! - [`registry`] tracks the outbound writer of every live session and fans
//!   received lines out to everyone but the sender.
//! - [`session`] runs one connection's inbound read loop and teardown.
//! - [`server`] accepts connections and spawns a session for each.
//!
//! Integration and end-to-end tests use this crate directly to exercise the
//! fan-out rules and the wire contract.

pub mod cli;
pub mod line;
pub mod registry;
pub mod server;
pub mod session;
