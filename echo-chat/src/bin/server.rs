//! Server launcher: `echo-server [port]`.
//!
//! Binds eagerly, then reads operator commands from stdin. End of stdin
//! leaves the server running until Ctrl-C; `#quit` and Ctrl-C both close
//! every connection before exiting with status 0.

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use echo_chat::{
    cli::{PortChoice, ServerArgs},
    console::{StdoutConsole, stdin_lines},
    logging::init_tracing,
    server::{ChatServer, ConsoleExit},
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing("info");

    let args = ServerArgs::parse();
    let port = args.port();
    if let PortChoice::Invalid { fallback } = port {
        warn!(given = ?args.port, "invalid port argument, using {fallback}");
    }

    let server = ChatServer::new(port.port(), Arc::new(StdoutConsole));
    if let Err(err) = server.listen().await {
        error!(error = %err, "could not bind port {}", port.port());
        println!("ERROR - Could not listen for clients!");
        return Ok(ExitCode::FAILURE);
    }

    let mut lines = stdin_lines();
    let exit = tokio::select! {
        exit = server.run_console(&mut lines) => exit,
        ctrl_c = tokio::signal::ctrl_c() => {
            handle_ctrl_c(ctrl_c);
            ConsoleExit::Quit
        }
    };

    if exit == ConsoleExit::InputClosed {
        info!("console input closed; serving until interrupted");
        handle_ctrl_c(tokio::signal::ctrl_c().await);
    }

    server.close().await;
    Ok(ExitCode::SUCCESS)
}

fn handle_ctrl_c(result: std::io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}
