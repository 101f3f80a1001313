//! Client launcher: `echo-client <loginId> [host] [port]`.

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use echo_chat::{
    cli::{ClientArgs, PortChoice},
    client::{ChatClient, DEFAULT_PORT},
    console::{StdoutConsole, stdin_lines},
    logging::init_tracing,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing("warn");

    let args = ClientArgs::parse();
    let Some(login_id) = args.login_id.clone() else {
        println!("login id must be specified as the first argument.");
        return Ok(ExitCode::FAILURE);
    };

    let port = args.port();
    if let PortChoice::Invalid { .. } = port {
        println!("Invalid port number. Using default port {DEFAULT_PORT}.");
    }

    let client = ChatClient::new(login_id, args.host(), port.port(), Arc::new(StdoutConsole));
    if let Err(err) = client.open_connection().await {
        debug!(error = %err, "initial connection failed");
        println!("Can't setup connection! Terminating client.");
        return Ok(ExitCode::FAILURE);
    }

    let mut lines = stdin_lines();
    client.run_console(&mut lines).await;
    Ok(ExitCode::SUCCESS)
}
