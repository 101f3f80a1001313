//! The chat server endpoint and its operator console.
//!
//! [`ChatServer`] owns the connection registry and the listening socket.
//! `#stop` drops only the acceptor; `#close` also closes every connection.
//! The port can change only while nothing is listening, and that check is
//! made under the same lock that guards the listener.

use std::{io, net::SocketAddr, sync::Arc};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::{
    command::{ServerCommand, command_name, is_command, parse_port_arg, unknown_command},
    console::{Console, ConsoleFlow},
    error::ChatError,
    handler::LoginHandler,
    message::server_line,
    registry::ConnectionRegistry,
    transport::Listener,
};

pub const DEFAULT_PORT: u16 = 5555;

/// Why [`ChatServer::run_console`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    InputClosed,
}

struct Endpoint {
    port: u16,
    listener: Option<Listener>,
}

pub struct ChatServer {
    registry: ConnectionRegistry,
    handler: Arc<LoginHandler>,
    endpoint: Mutex<Endpoint>,
    console: Arc<dyn Console>,
}

impl ChatServer {
    pub fn new(port: u16, console: Arc<dyn Console>) -> Self {
        let registry = ConnectionRegistry::new();
        Self {
            handler: Arc::new(LoginHandler::new(registry.clone())),
            registry,
            endpoint: Mutex::new(Endpoint {
                port,
                listener: None,
            }),
            console,
        }
    }

    pub async fn port(&self) -> u16 {
        self.endpoint.lock().await.port
    }

    pub async fn is_listening(&self) -> bool {
        self.endpoint.lock().await.listener.is_some()
    }

    /// Address of the live listener, if any. Differs from [`Self::port`]
    /// when the configured port is 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint
            .lock()
            .await
            .listener
            .as_ref()
            .map(Listener::local_addr)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn set_port(&self, port: u16) -> Result<(), ChatError> {
        let mut endpoint = self.endpoint.lock().await;
        if endpoint.listener.is_some() {
            return Err(ChatError::ServerListening);
        }
        endpoint.port = port;
        Ok(())
    }

    /// Starts accepting connections on the configured port.
    pub async fn listen(&self) -> Result<SocketAddr, ChatError> {
        let mut endpoint = self.endpoint.lock().await;
        if endpoint.listener.is_some() {
            return Err(ChatError::AlreadyListening);
        }

        let listener = Listener::bind(endpoint.port, Arc::clone(&self.handler)).await?;
        let addr = listener.local_addr();
        endpoint.listener = Some(listener);
        info!(%addr, "Server listening for connections on port {}", addr.port());
        Ok(addr)
    }

    /// Stops accepting new connections. Returns whether anything was listening.
    pub async fn stop_listening(&self) -> bool {
        let listener = self.endpoint.lock().await.listener.take();
        match listener {
            Some(listener) => {
                listener.stop().await;
                info!("Server has stopped listening for connections.");
                true
            }
            None => false,
        }
    }

    /// Stops accepting and closes every connection.
    pub async fn close(&self) {
        self.stop_listening().await;
        let open = self.registry.len();
        self.registry.close_all();
        debug!(open, "closed all client connections");
    }

    /// Handles one line typed by the operator.
    pub async fn handle_message_from_server(&self, line: &str) -> ConsoleFlow {
        let outcome = if is_command(line) {
            self.handle_command(line).await
        } else {
            self.send_to_all_clients(line);
            Ok(ConsoleFlow::Continue)
        };

        match outcome {
            Ok(flow) => flow,
            Err(err) => {
                self.console
                    .display(&format!("Error sending message: {err}"));
                self.close().await;
                ConsoleFlow::Continue
            }
        }
    }

    /// Shows `SERVER MSG> <line>` locally and sends it to every connection,
    /// logged in or not.
    pub fn send_to_all_clients(&self, line: &str) {
        let message = server_line(line);
        self.console.display(&message);
        let delivered = self.registry.broadcast(&message);
        debug!(delivered, "server message broadcast");
    }

    async fn handle_command(&self, line: &str) -> io::Result<ConsoleFlow> {
        debug!(command = command_name(line), "server command");
        match ServerCommand::parse(line) {
            ServerCommand::Quit => return Ok(ConsoleFlow::Quit),
            ServerCommand::Stop => {
                self.stop_listening().await;
                self.console
                    .display("Server stopped listening for new connections.");
            }
            ServerCommand::Close => {
                self.close().await;
                self.console.display("Server closed.");
            }
            ServerCommand::SetPort(arg) => self.set_port_command(arg.as_deref()).await,
            ServerCommand::Start => match self.listen().await {
                Ok(_) => {}
                Err(ChatError::AlreadyListening) => {
                    self.console.display(&ChatError::AlreadyListening.to_string());
                }
                Err(ChatError::Io(err)) => return Err(err),
                Err(err) => return Err(io::Error::other(err)),
            },
            ServerCommand::GetPort => {
                let port = self.port().await;
                self.console.display(&format!("Current port: {port}"));
            }
            ServerCommand::Unknown => self.console.display(&unknown_command(line)),
        }
        Ok(ConsoleFlow::Continue)
    }

    async fn set_port_command(&self, arg: Option<&str>) {
        // A listening server refuses before the argument is even looked at.
        let reply = if self.is_listening().await {
            ChatError::ServerListening.to_string()
        } else {
            match parse_port_arg(arg) {
                Ok(port) => match self.set_port(port).await {
                    Ok(()) => format!("Port set to: {port}"),
                    Err(err) => err.to_string(),
                },
                Err(err) => err.to_string(),
            }
        };
        self.console.display(&reply);
    }

    /// Feeds operator lines to [`Self::handle_message_from_server`] until
    /// `#quit` or end of input.
    pub async fn run_console(&self, lines: &mut mpsc::UnboundedReceiver<String>) -> ConsoleExit {
        while let Some(line) = lines.recv().await {
            if self.handle_message_from_server(&line).await == ConsoleFlow::Quit {
                return ConsoleExit::Quit;
            }
        }
        ConsoleExit::InputClosed
    }
}
