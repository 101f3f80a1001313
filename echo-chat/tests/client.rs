use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use echo_chat::{
    client::ChatClient,
    console::ChannelConsole,
    server::ChatServer,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time::{sleep, timeout},
};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct Screen {
    lines: UnboundedReceiver<String>,
}

impl Screen {
    async fn expect(&mut self, expected: &str) -> Result<()> {
        let line = timeout(READ_TIMEOUT, self.lines.recv())
            .await
            .with_context(|| format!("timed out waiting for {expected:?}"))?
            .context("console dropped")?;
        assert_eq!(line, expected);
        Ok(())
    }

    fn assert_quiet(&mut self) {
        assert!(self.lines.try_recv().is_err());
    }
}

fn client(login_id: &str, port: u16) -> (ChatClient, Screen) {
    let (console, lines) = ChannelConsole::new();
    let client = ChatClient::new(login_id, "127.0.0.1", port, Arc::new(console));
    (client, Screen { lines })
}

async fn start_server() -> Result<(ChatServer, u16, Screen)> {
    let (console, lines) = ChannelConsole::new();
    let server = ChatServer::new(0, Arc::new(console));
    let addr = server.listen().await?;
    Ok((server, addr.port(), Screen { lines }))
}

async fn wait_for_connections(server: &ChatServer, expected: usize) -> Result<()> {
    timeout(READ_TIMEOUT, async {
        while server.connection_count() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .with_context(|| format!("expected {expected} registered connections"))
}

/// Waits until every registered connection has a login id.
async fn wait_for_logins(server: &ChatServer, expected: usize) -> Result<()> {
    timeout(READ_TIMEOUT, async {
        loop {
            let snapshot = server.registry().snapshot();
            let logged_in = snapshot
                .iter()
                .filter(|connection| connection.login_id().is_some())
                .count();
            if snapshot.len() == expected && logged_in == expected {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .with_context(|| format!("expected {expected} logged in connections"))
}

#[tokio::test]
async fn chat_is_echoed_to_every_client() -> Result<()> {
    let (server, port, _server_screen) = start_server().await?;
    let (alice, mut alice_screen) = client("alice", port);
    let (bob, mut bob_screen) = client("bob", port);

    alice.open_connection().await?;
    bob.open_connection().await?;
    wait_for_logins(&server, 2).await?;

    alice.handle_message_from_client_ui("hi").await;
    alice_screen.expect("> alice: hi").await?;
    bob_screen.expect("> alice: hi").await?;

    bob.handle_message_from_client_ui("hello back").await;
    alice_screen.expect("> bob: hello back").await?;
    bob_screen.expect("> bob: hello back").await?;

    alice.quit().await;
    bob.quit().await;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn login_while_connected_is_refused_locally() -> Result<()> {
    let (server, port, _server_screen) = start_server().await?;
    let (alice, mut alice_screen) = client("alice", port);

    alice.open_connection().await?;
    wait_for_logins(&server, 1).await?;

    alice.handle_message_from_client_ui("#login").await;
    alice_screen
        .expect("> Already connected. Use #logoff to disconnect first.")
        .await?;
    alice.handle_message_from_client_ui("#sethost elsewhere").await;
    alice_screen
        .expect("> You must log off before changing host.")
        .await?;
    alice.handle_message_from_client_ui("#setport 1").await;
    alice_screen
        .expect("> You must log off before changing port.")
        .await?;

    // Still a single, healthy connection.
    assert_eq!(server.connection_count(), 1);
    alice.handle_message_from_client_ui("ok").await;
    alice_screen.expect("> alice: ok").await?;

    alice.quit().await;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn logoff_then_login_again() -> Result<()> {
    let (server, port, _server_screen) = start_server().await?;
    let (alice, mut alice_screen) = client("alice", port);

    alice.open_connection().await?;
    wait_for_logins(&server, 1).await?;

    alice.handle_message_from_client_ui("#logoff").await;
    alice_screen.expect("> Connection closed.").await?;
    assert!(!alice.is_connected());
    assert!(!alice.shutdown_requested());
    wait_for_connections(&server, 0).await?;

    alice.handle_message_from_client_ui("#logoff").await;
    alice_screen.expect("> Already logged off.").await?;
    alice.handle_message_from_client_ui("anyone?").await;
    alice_screen
        .expect("> Not connected. Use #login first.")
        .await?;

    alice.handle_message_from_client_ui("#login").await;
    assert!(alice.is_connected());
    wait_for_logins(&server, 1).await?;
    alice.handle_message_from_client_ui("back").await;
    alice_screen.expect("> alice: back").await?;

    alice.quit().await;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn server_messages_reach_clients() -> Result<()> {
    let (server, port, mut server_screen) = start_server().await?;
    let (alice, mut alice_screen) = client("alice", port);
    let (bob, mut bob_screen) = client("bob", port);

    alice.open_connection().await?;
    bob.open_connection().await?;
    wait_for_logins(&server, 2).await?;

    server.handle_message_from_server("hello all").await;

    server_screen.expect("> SERVER MSG> hello all").await?;
    alice_screen.expect("> SERVER MSG> hello all").await?;
    bob_screen.expect("> SERVER MSG> hello all").await?;

    alice.quit().await;
    bob.quit().await;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn server_close_shuts_the_client_down() -> Result<()> {
    let (server, port, _server_screen) = start_server().await?;
    let (alice, mut alice_screen) = client("alice", port);

    alice.open_connection().await?;
    wait_for_logins(&server, 1).await?;

    server.handle_message_from_server("#close").await;

    alice_screen.expect("> Connection closed.").await?;
    alice_screen.expect("> Server has been shut down.").await?;
    assert!(alice.shutdown_requested());
    assert!(!alice.is_connected());

    // The console loop notices the lost server even with input still open.
    let (_typing, mut lines) = mpsc::unbounded_channel::<String>();
    timeout(READ_TIMEOUT, alice.run_console(&mut lines))
        .await
        .context("console loop kept running")?;
    alice_screen.assert_quiet();
    Ok(())
}

#[tokio::test]
async fn login_ids_need_not_be_unique() -> Result<()> {
    let (server, port, _server_screen) = start_server().await?;
    let (alice, mut alice_screen) = client("alice", port);
    let (twin, mut twin_screen) = client("alice", port);

    alice.open_connection().await?;
    twin.open_connection().await?;
    wait_for_logins(&server, 2).await?;

    twin.handle_message_from_client_ui("me too").await;
    alice_screen.expect("> alice: me too").await?;
    twin_screen.expect("> alice: me too").await?;

    alice.quit().await;
    twin.quit().await;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn console_loop_quits_on_command_and_on_eof() -> Result<()> {
    let (server, port, _server_screen) = start_server().await?;
    let (alice, _alice_screen) = client("alice", port);
    alice.open_connection().await?;
    wait_for_logins(&server, 1).await?;

    let (typing, mut lines) = mpsc::unbounded_channel();
    typing.send("#quit".to_string())?;
    typing.send("sent on the next run".to_string())?;
    timeout(READ_TIMEOUT, alice.run_console(&mut lines)).await?;
    assert!(!alice.is_connected());
    wait_for_connections(&server, 0).await?;

    alice.open_connection().await?;
    wait_for_logins(&server, 1).await?;
    drop(typing);
    timeout(READ_TIMEOUT, alice.run_console(&mut lines)).await?;
    assert!(!alice.is_connected());
    wait_for_connections(&server, 0).await?;

    server.close().await;
    Ok(())
}
