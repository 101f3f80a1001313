//! The interactive chat client.
//!
//! [`ChatClient`] holds the target host and port, the login id, and at most
//! one open connection. Opening a connection sends `#login <id>` before
//! anything else. Console lines starting with `#` are client commands and
//! never reach the server; everything else is sent as chat when connected.

use std::{
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    net::tcp::OwnedWriteHalf,
    select,
    sync::{Mutex as AsyncMutex, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    command::{
        ClientCommand, SETHOST_USAGE, command_name, is_command, parse_port_arg, unknown_command,
    },
    console::{Console, ConsoleFlow},
    error::ChatError,
    message::{login_message, write_message},
    transport::{self, ClientHandler, shutdown_writer},
};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5555;

pub struct ChatClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    login_id: String,
    console: Arc<dyn Console>,
    endpoint: Mutex<ClientEndpoint>,
    next_session: AtomicU64,
    shutdown: watch::Sender<bool>,
}

struct ClientEndpoint {
    host: String,
    port: u16,
    session: Option<Session>,
}

/// One open connection: the write half plus the reader task draining it.
struct Session {
    id: u64,
    writer: Arc<AsyncMutex<OwnedWriteHalf>>,
    stop: oneshot::Sender<()>,
    reader: JoinHandle<()>,
}

impl Session {
    async fn close(self) {
        let Session {
            writer,
            stop,
            reader,
            ..
        } = self;
        let _ = stop.send(());
        shutdown_writer(&mut *writer.lock().await).await;
        if let Err(err) = reader.await {
            warn!(error = ?err, "reader task ended abnormally");
        }
    }
}

impl ClientInner {
    fn lock(&self) -> MutexGuard<'_, ClientEndpoint> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget_session(&self, id: u64) {
        let mut endpoint = self.lock();
        if endpoint.session.as_ref().is_some_and(|session| session.id == id) {
            endpoint.session = None;
        }
    }

    fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Reader callbacks for one session.
struct SessionHooks {
    inner: Arc<ClientInner>,
    session: u64,
}

impl ClientHandler for SessionHooks {
    fn handle_message_from_server(&self, message: String) {
        self.inner.console.display(&message);
    }

    fn connection_closed(&self) {
        self.inner.console.display("Connection closed.");
    }

    fn connection_exception(&self, error: io::Error) {
        self.inner.forget_session(self.session);
        info!(%error, "lost connection to server");
        self.inner.console.display("Server has been shut down.");
        self.inner.request_shutdown();
    }
}

impl ChatClient {
    pub fn new(
        login_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        console: Arc<dyn Console>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                login_id: login_id.into(),
                console,
                endpoint: Mutex::new(ClientEndpoint {
                    host: host.into(),
                    port,
                    session: None,
                }),
                next_session: AtomicU64::new(1),
                shutdown,
            }),
        }
    }

    pub fn login_id(&self) -> &str {
        &self.inner.login_id
    }

    pub fn host(&self) -> String {
        self.inner.lock().host.clone()
    }

    pub fn port(&self) -> u16 {
        self.inner.lock().port
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    /// True once the connection was lost without being asked to close.
    pub fn shutdown_requested(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub fn set_host(&self, host: impl Into<String>) -> Result<(), ChatError> {
        let mut endpoint = self.inner.lock();
        if endpoint.session.is_some() {
            return Err(ChatError::HostLocked);
        }
        endpoint.host = host.into();
        Ok(())
    }

    pub fn set_port(&self, port: u16) -> Result<(), ChatError> {
        let mut endpoint = self.inner.lock();
        if endpoint.session.is_some() {
            return Err(ChatError::PortLocked);
        }
        endpoint.port = port;
        Ok(())
    }

    /// Connects to the current host and port and sends the login handshake.
    pub async fn open_connection(&self) -> Result<(), ChatError> {
        let (host, port) = {
            let endpoint = self.inner.lock();
            if endpoint.session.is_some() {
                return Err(ChatError::AlreadyConnected);
            }
            (endpoint.host.clone(), endpoint.port)
        };

        let (reader, mut writer) = transport::connect(&host, port)
            .await
            .map_err(ChatError::Connect)?;
        write_message(&mut writer, &login_message(&self.inner.login_id))
            .await
            .map_err(ChatError::Connect)?;

        // The reader is spawned under the lock so it cannot report a lost
        // connection before the session it belongs to is recorded.
        let mut endpoint = self.inner.lock();
        if endpoint.session.is_some() {
            return Err(ChatError::AlreadyConnected);
        }
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let (stop, stop_rx) = oneshot::channel();
        let hooks = SessionHooks {
            inner: Arc::clone(&self.inner),
            session: id,
        };
        let reader = transport::spawn_reader(reader, hooks, stop_rx);
        endpoint.session = Some(Session {
            id,
            writer: Arc::new(AsyncMutex::new(writer)),
            stop,
            reader,
        });
        debug!(%host, port, session = id, "session opened");
        Ok(())
    }

    /// Closes the open connection and waits for its reader to finish.
    pub async fn close_connection(&self) -> Result<(), ChatError> {
        let session = self
            .inner
            .lock()
            .session
            .take()
            .ok_or(ChatError::AlreadyLoggedOff)?;
        session.close().await;
        Ok(())
    }

    pub async fn send_to_server(&self, message: &str) -> Result<(), ChatError> {
        let writer = self
            .inner
            .lock()
            .session
            .as_ref()
            .map(|session| Arc::clone(&session.writer))
            .ok_or(ChatError::NotConnected)?;
        let mut writer = writer.lock().await;
        write_message(&mut *writer, message).await?;
        Ok(())
    }

    /// Closes the connection if one is open, ignoring failures.
    pub async fn quit(&self) {
        if let Err(err) = self.close_connection().await {
            debug!(%err, "nothing to close on quit");
        }
    }

    /// Handles one line typed by the user.
    pub async fn handle_message_from_client_ui(&self, line: &str) -> ConsoleFlow {
        if is_command(line) {
            return self.handle_command(line).await;
        }

        match self.send_to_server(line).await {
            Ok(()) => ConsoleFlow::Continue,
            Err(ChatError::NotConnected) => {
                self.display(&ChatError::NotConnected.to_string());
                ConsoleFlow::Continue
            }
            Err(err) => {
                self.display(&format!("Error sending message: {err}"));
                self.quit().await;
                ConsoleFlow::Quit
            }
        }
    }

    async fn handle_command(&self, line: &str) -> ConsoleFlow {
        debug!(command = command_name(line), "client command");
        match ClientCommand::parse(line) {
            ClientCommand::Quit => {
                self.quit().await;
                return ConsoleFlow::Quit;
            }
            ClientCommand::Logoff => {
                if let Err(err) = self.close_connection().await {
                    self.display(&err.to_string());
                }
            }
            ClientCommand::SetHost(arg) => {
                let reply = match (self.is_connected(), arg) {
                    (true, _) => ChatError::HostLocked.to_string(),
                    (false, None) => SETHOST_USAGE.to_string(),
                    (false, Some(host)) => match self.set_host(host.as_str()) {
                        Ok(()) => format!("Host set to: {host}"),
                        Err(err) => err.to_string(),
                    },
                };
                self.display(&reply);
            }
            ClientCommand::SetPort(arg) => {
                let reply = if self.is_connected() {
                    ChatError::PortLocked.to_string()
                } else {
                    match parse_port_arg(arg.as_deref()) {
                        Ok(port) => match self.set_port(port) {
                            Ok(()) => format!("Port set to: {port}"),
                            Err(err) => err.to_string(),
                        },
                        Err(err) => err.to_string(),
                    }
                };
                self.display(&reply);
            }
            ClientCommand::Login => {
                if let Err(err) = self.open_connection().await {
                    self.display(&err.to_string());
                }
            }
            ClientCommand::GetHost => {
                let host = self.host();
                self.display(&format!("Current host: {host}"));
            }
            ClientCommand::GetPort => {
                let port = self.port();
                self.display(&format!("Current port: {port}"));
            }
            ClientCommand::Unknown => self.display(&unknown_command(line)),
        }
        ConsoleFlow::Continue
    }

    /// Feeds user lines to [`Self::handle_message_from_client_ui`] until
    /// `#quit`, end of input, or a lost server.
    pub async fn run_console(&self, lines: &mut mpsc::UnboundedReceiver<String>) {
        let mut shutdown = self.inner.shutdown.subscribe();

        loop {
            select! {
                biased;
                _ = shutdown.wait_for(|requested| *requested) => break,
                line = lines.recv() => {
                    match line {
                        Some(line) => {
                            if self.handle_message_from_client_ui(&line).await == ConsoleFlow::Quit {
                                break;
                            }
                        }
                        None => {
                            self.quit().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    fn display(&self, message: &str) {
        self.inner.console.display(message);
    }
}
