//! Error types shared by the server and the client.
//!
//! Precondition failures render as the exact line shown to the operator,
//! so console code can display `err.to_string()` directly.

use std::io;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Server must be closed before changing port.")]
    ServerListening,

    #[error("Server is already listening.")]
    AlreadyListening,

    #[error("You must log off before changing host.")]
    HostLocked,

    #[error("You must log off before changing port.")]
    PortLocked,

    #[error("Already connected. Use #logoff to disconnect first.")]
    AlreadyConnected,

    #[error("Already logged off.")]
    AlreadyLoggedOff,

    #[error("Not connected. Use #login first.")]
    NotConnected,

    #[error("Failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("client is not reading; outbound queue full")]
    Lagging,

    #[error("login id already set")]
    LoginAlreadySet,

    #[error(transparent)]
    Io(#[from] io::Error),
}
