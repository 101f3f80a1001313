use clap::Parser;

use crate::{client, server};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the chat server", long_about = None)]
pub struct ServerArgs {
    /// Port to listen on. Missing or invalid values fall back to 5555.
    pub port: Option<String>,
}

impl ServerArgs {
    pub fn port(&self) -> PortChoice {
        PortChoice::resolve(self.port.as_deref(), server::DEFAULT_PORT)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Connect to a chat server", long_about = None)]
pub struct ClientArgs {
    /// Identifier shown next to every message you send.
    pub login_id: Option<String>,

    /// Server host name or address.
    pub host: Option<String>,

    /// Server port. Invalid values fall back to 5555.
    pub port: Option<String>,
}

impl ClientArgs {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(client::DEFAULT_HOST)
    }

    pub fn port(&self) -> PortChoice {
        PortChoice::resolve(self.port.as_deref(), client::DEFAULT_PORT)
    }
}

/// A port taken from the command line, remembering whether the default
/// replaced an unparseable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChoice {
    Given(u16),
    Default(u16),
    Invalid { fallback: u16 },
}

impl PortChoice {
    pub fn resolve(arg: Option<&str>, default: u16) -> Self {
        match arg {
            None => PortChoice::Default(default),
            Some(raw) => match raw.trim().parse() {
                Ok(port) => PortChoice::Given(port),
                Err(_) => PortChoice::Invalid { fallback: default },
            },
        }
    }

    pub fn port(self) -> u16 {
        match self {
            PortChoice::Given(port) | PortChoice::Default(port) => port,
            PortChoice::Invalid { fallback } => fallback,
        }
    }
}
