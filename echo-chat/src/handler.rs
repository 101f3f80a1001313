//! Login gate and chat fan-out for messages arriving from clients.
//!
//! Each connection starts unauthenticated. The only message it may send is
//! `#login <id>`; anything else earns [`LOGIN_REQUIRED`] and a closed socket.
//! Once the id is set every message is rebroadcast as `<id>: <text>` to the
//! whole registry, sender included. A second `#login` earns
//! [`LOGIN_ONLY_ONCE`] and a closed socket.

use std::{io, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    message::{LOGIN_COMMAND, LOGIN_ONLY_ONCE, LOGIN_REQUIRED, chat_line},
    registry::{ClientConnection, ConnectionRegistry},
    transport::ConnectionHandler,
};

/// What the server did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    LoggedIn(String),
    /// Fanned out to this many connections.
    Broadcast(usize),
    RejectedNotLoggedIn,
    RejectedDuplicateLogin,
}

pub struct LoginHandler {
    registry: ConnectionRegistry,
}

impl LoginHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn handle_message_from_client(
        &self,
        connection: &ClientConnection,
        message: &str,
    ) -> Disposition {
        let text = message.trim();
        let mut tokens = text.split_whitespace();
        let is_login = tokens.next() == Some(LOGIN_COMMAND);

        match connection.login_id() {
            None => {
                let login_id = if is_login { tokens.next() } else { None };
                match login_id {
                    Some(login_id) if connection.set_login_id(login_id).is_ok() => {
                        info!(%connection, login_id, "client logged in");
                        Disposition::LoggedIn(login_id.to_string())
                    }
                    _ => {
                        warn!(%connection, "message before login; closing");
                        reject(connection, LOGIN_REQUIRED);
                        Disposition::RejectedNotLoggedIn
                    }
                }
            }
            Some(_) if is_login => {
                warn!(%connection, "repeated login; closing");
                reject(connection, LOGIN_ONLY_ONCE);
                Disposition::RejectedDuplicateLogin
            }
            Some(login_id) => {
                Disposition::Broadcast(self.registry.broadcast(&chat_line(login_id, text)))
            }
        }
    }
}

fn reject(connection: &ClientConnection, reply: &str) {
    // The reply only fails if the socket task already ended, and then
    // there is nothing left to close.
    if connection.send(reply).is_ok() {
        connection.close();
    }
}

impl ConnectionHandler for LoginHandler {
    fn on_connect(&self, connection: &Arc<ClientConnection>) {
        self.registry.insert(Arc::clone(connection));
        info!(%connection, "Client connected.");
    }

    fn on_message(&self, connection: &Arc<ClientConnection>, message: String) {
        info!("Message received: {message} from {connection}");
        let disposition = self.handle_message_from_client(connection, &message);
        debug!(%connection, ?disposition, "message handled");
    }

    fn on_close(&self, connection: &Arc<ClientConnection>) {
        if self.registry.remove(connection.id()).is_some() {
            info!(%connection, login_id = connection.login_id(), "Client disconnected.");
        }
    }

    fn on_error(&self, connection: &Arc<ClientConnection>, error: &io::Error) {
        warn!(%connection, %error, "connection failed");
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::registry::{Outbound, OutboundQueue};

    struct Fixture {
        registry: ConnectionRegistry,
        handler: LoginHandler,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = ConnectionRegistry::new();
            Self {
                handler: LoginHandler::new(registry.clone()),
                registry,
            }
        }

        fn connect(&self, id: u64) -> (Arc<ClientConnection>, OutboundQueue) {
            let peer: SocketAddr = "127.0.0.1:40000".parse().expect("valid socket address");
            let (connection, rx) = ClientConnection::new(id, peer);
            self.handler.on_connect(&connection);
            (connection, rx)
        }
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = queue.messages.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn chat_before_login_is_rejected_and_closed() {
        let fixture = Fixture::new();
        let (connection, mut rx) = fixture.connect(1);

        let disposition = fixture.handler.handle_message_from_client(&connection, "hello");

        assert_eq!(disposition, Disposition::RejectedNotLoggedIn);
        assert_eq!(
            drain(&mut rx),
            vec![Outbound::Message(LOGIN_REQUIRED.into()), Outbound::Close]
        );
        assert_eq!(connection.login_id(), None);
    }

    #[test]
    fn bare_login_and_blank_input_are_rejected() {
        let fixture = Fixture::new();

        for message in ["#login", "   #login   ", "", "   "] {
            let (connection, mut rx) = fixture.connect(1);
            let disposition = fixture.handler.handle_message_from_client(&connection, message);
            assert_eq!(disposition, Disposition::RejectedNotLoggedIn, "input {message:?}");
            assert_eq!(
                drain(&mut rx),
                vec![Outbound::Message(LOGIN_REQUIRED.into()), Outbound::Close]
            );
        }
    }

    #[test]
    fn login_is_silent_and_sets_the_id() {
        let fixture = Fixture::new();
        let (connection, mut rx) = fixture.connect(1);

        let disposition = fixture
            .handler
            .handle_message_from_client(&connection, "  #login   alice  extra");

        assert_eq!(disposition, Disposition::LoggedIn("alice".into()));
        assert_eq!(connection.login_id(), Some("alice"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn second_login_is_rejected_and_closed() {
        let fixture = Fixture::new();
        let (connection, mut rx) = fixture.connect(1);
        fixture.handler.handle_message_from_client(&connection, "#login alice");

        let disposition = fixture.handler.handle_message_from_client(&connection, "#login x");

        assert_eq!(disposition, Disposition::RejectedDuplicateLogin);
        assert_eq!(
            drain(&mut rx),
            vec![Outbound::Message(LOGIN_ONLY_ONCE.into()), Outbound::Close]
        );
        assert_eq!(connection.login_id(), Some("alice"));
    }

    #[test]
    fn chat_is_trimmed_prefixed_and_sent_to_everyone() {
        let fixture = Fixture::new();
        let (alice, mut alice_rx) = fixture.connect(1);
        let (bob, mut bob_rx) = fixture.connect(2);
        let (_lurker, mut lurker_rx) = fixture.connect(3);
        fixture.handler.handle_message_from_client(&alice, "#login alice");
        fixture.handler.handle_message_from_client(&bob, "#login bob");

        let disposition = fixture.handler.handle_message_from_client(&alice, "  hi there  ");

        assert_eq!(disposition, Disposition::Broadcast(3));
        let expected = vec![Outbound::Message("alice: hi there".into())];
        assert_eq!(drain(&mut alice_rx), expected);
        assert_eq!(drain(&mut bob_rx), expected);
        assert_eq!(drain(&mut lurker_rx), expected);
    }

    #[test]
    fn blank_chat_after_login_broadcasts_empty_text() {
        let fixture = Fixture::new();
        let (alice, mut rx) = fixture.connect(1);
        fixture.handler.handle_message_from_client(&alice, "#login alice");

        fixture.handler.handle_message_from_client(&alice, "   ");

        assert_eq!(drain(&mut rx), vec![Outbound::Message("alice: ".into())]);
    }

    #[test]
    fn login_token_must_match_exactly() {
        let fixture = Fixture::new();
        let (alice, mut rx) = fixture.connect(1);
        fixture.handler.handle_message_from_client(&alice, "#login alice");

        let disposition = fixture.handler.handle_message_from_client(&alice, "#loginx bob");

        assert_eq!(disposition, Disposition::Broadcast(1));
        assert_eq!(drain(&mut rx), vec![Outbound::Message("alice: #loginx bob".into())]);
    }

    #[test]
    fn close_removes_from_registry_once() {
        let fixture = Fixture::new();
        let (alice, _rx) = fixture.connect(1);
        assert_eq!(fixture.registry.len(), 1);

        fixture.handler.on_close(&alice);
        fixture.handler.on_close(&alice);

        assert!(fixture.registry.is_empty());
    }
}
