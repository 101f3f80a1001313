//! A small broadcasting chat service: one server, many line-oriented clients.
//!
//! Clients connect, introduce themselves with `#login <id>`, and from then on
//! every line they send is echoed to every connected user as `<id>: <text>`.
//! Both sides also accept `#`-prefixed operator commands at their console.
//!
//! - [`message`] is the wire framing (one JSON string per line) and the
//!   protocol's literal strings.
//! - [`transport`] accepts and drives sockets and reports lifecycle events to
//!   handler traits.
//! - [`registry`] tracks live connections and their login ids.
//! - [`handler`] is the server's login gate and broadcast.
//! - [`server`] and [`client`] are the two endpoints and their console
//!   command interpreters; [`command`] parses those commands.
//! - [`console`], [`cli`], [`logging`] and [`error`] carry the ambient bits.

pub mod cli;
pub mod client;
pub mod command;
pub mod console;
pub mod error;
pub mod handler;
pub mod logging;
pub mod message;
pub mod registry;
pub mod server;
pub mod transport;
