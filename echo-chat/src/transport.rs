//! Socket plumbing shared by the server and the client.
//!
//! The server side accepts TCP connections and drives one task per
//! connection, reporting lifecycle events to a [`ConnectionHandler`]. The
//! client side opens a stream and drives a reader task that reports to a
//! [`ClientHandler`]. Neither side knows anything about the chat protocol
//! beyond "one string per frame".

use std::{
    future::Future,
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    message::{FrameReader, frame_reader, read_message, write_message},
    registry::{ClientConnection, Outbound, OutboundQueue},
};

pub type ConnectionReader = FrameReader<BufReader<OwnedReadHalf>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Server-side lifecycle callbacks for accepted connections.
///
/// `on_connect` runs on the accept task before the connection's own task
/// starts. The rest run on that task, in order: any number of `on_message`,
/// at most one `on_error`, then exactly one `on_close`.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_connect(&self, connection: &Arc<ClientConnection>);
    fn on_message(&self, connection: &Arc<ClientConnection>, message: String);
    fn on_close(&self, connection: &Arc<ClientConnection>);
    fn on_error(&self, connection: &Arc<ClientConnection>, error: &io::Error);
}

/// Client-side callbacks for the reader task of an open connection.
pub trait ClientHandler: Send + Sync + 'static {
    fn handle_message_from_server(&self, message: String);
    /// The reader stopped, whoever asked for it.
    fn connection_closed(&self);
    /// The server went away without being asked to. Follows `connection_closed`.
    fn connection_exception(&self, error: io::Error);
}

/// A running accept loop. Dropping it without calling [`Listener::stop`]
/// also stops accepting, because the shutdown sender is dropped.
pub struct Listener {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Listener {
    /// Binds every interface on `port` and starts accepting connections.
    pub async fn bind<H>(port: u16, handler: Arc<H>) -> io::Result<Self>
    where
        H: ConnectionHandler,
    {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(run_until(listener, handler, async move {
            let _ = shutdown_rx.await;
        }));

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting. Connections that were already accepted keep running.
    pub async fn stop(self) {
        let Listener { shutdown, task, .. } = self;
        let _ = shutdown.send(());
        if let Err(err) = task.await {
            warn!(error = ?err, "accept task ended abnormally");
        }
    }
}

async fn run_until<H, F>(listener: TcpListener, handler: Arc<H>, shutdown: F)
where
    H: ConnectionHandler,
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        select! {
            _ = &mut shutdown => break,
            accept_result = listener.accept() => {
                handle_accept_result(accept_result, &handler);
            }
        }
    }
}

fn handle_accept_result<H>(result: io::Result<(TcpStream, SocketAddr)>, handler: &Arc<H>)
where
    H: ConnectionHandler,
{
    match result {
        Ok((stream, peer)) => spawn_connection(stream, peer, handler),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

/// Registers the connection on the accept task, so once [`Listener::stop`]
/// returns every accepted socket is visible to the handler.
fn spawn_connection<H>(stream: TcpStream, peer: SocketAddr, handler: &Arc<H>)
where
    H: ConnectionHandler,
{
    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let (connection, outbound) = ClientConnection::new(id, peer);
    handler.on_connect(&connection);

    let handler = Arc::clone(handler);
    tokio::spawn(async move {
        handle_connection(stream, connection, outbound, handler).await;
    });
}

async fn handle_connection<H>(
    stream: TcpStream,
    connection: Arc<ClientConnection>,
    outbound: OutboundQueue,
    handler: Arc<H>,
) where
    H: ConnectionHandler,
{
    let (reader, writer) = stream.into_split();
    let result = run_connection(
        &connection,
        frame_reader(reader),
        writer,
        outbound,
        handler.as_ref(),
    )
    .await;

    if let Err(err) = result {
        handler.on_error(&connection, &err);
    }
    handler.on_close(&connection);
}

async fn run_connection<H>(
    connection: &Arc<ClientConnection>,
    mut reader: ConnectionReader,
    mut writer: OwnedWriteHalf,
    outbound: OutboundQueue,
    handler: &H,
) -> io::Result<()>
where
    H: ConnectionHandler,
{
    let OutboundQueue {
        mut messages,
        mut evicted,
    } = outbound;

    loop {
        select! {
            // Eviction first, then queued replies, so a reject-then-close pair
            // goes out before we read anything else from the peer.
            biased;
            _ = async { evicted.wait_for(|evicted| *evicted).await.map(|_| ()) } => {
                return Err(io::Error::other("peer stopped reading; outbound queue full"));
            }
            queued = messages.recv() => {
                match queued {
                    Some(Outbound::Message(text)) => write_message(&mut writer, &text).await?,
                    Some(Outbound::Close) | None => {
                        shutdown_writer(&mut writer).await;
                        break;
                    }
                }
            }
            inbound = read_message::<_, String>(&mut reader) => {
                match inbound? {
                    Some(message) => handler.on_message(connection, message),
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Opens a stream to `host:port` and splits it into framed halves.
pub async fn connect(host: &str, port: u16) -> io::Result<(ConnectionReader, OwnedWriteHalf)> {
    let stream = TcpStream::connect((host, port)).await?;
    info!(host, port, "connected to server");

    let (reader, writer) = stream.into_split();
    Ok((frame_reader(reader), writer))
}

/// Spawns the client's reader task. Firing (or dropping) `stop` ends the
/// task as a locally requested close.
pub fn spawn_reader<H>(
    mut reader: ConnectionReader,
    handler: H,
    mut stop: oneshot::Receiver<()>,
) -> JoinHandle<()>
where
    H: ClientHandler,
{
    tokio::spawn(async move {
        let outcome = loop {
            select! {
                biased;
                _ = &mut stop => break Ok(()),
                message = read_message::<_, String>(&mut reader) => {
                    match message {
                        Ok(Some(message)) => handler.handle_message_from_server(message),
                        Ok(None) => break Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "server closed the connection",
                        )),
                        Err(err) => break Err(err),
                    }
                }
            }
        };

        handler.connection_closed();
        if let Err(err) = outcome {
            debug!(error = %err, "reader stopped by the remote side");
            handler.connection_exception(err);
        }
    })
}

pub async fn shutdown_writer(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        debug!(?error, "failed to shutdown writer cleanly");
    }
}
