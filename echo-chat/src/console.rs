//! Display sinks for the server and client consoles.

use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};
use std::thread;

use tokio::sync::mpsc;
use tracing::warn;

/// What a console loop should do after handling a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFlow {
    Continue,
    Quit,
}

/// Where user-visible lines go. Every line is shown with a `> ` prefix.
pub trait Console: Send + Sync {
    fn display(&self, message: &str);
}

/// Writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn display(&self, message: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout leaves nothing useful to report to.
        let _ = writeln!(stdout, "> {message}");
        let _ = stdout.flush();
    }
}

/// Forwards each displayed line, prefix included, to a channel.
///
/// Used to embed a console in another task or to observe it from tests.
#[derive(Debug)]
pub struct ChannelConsole {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConsole {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Console for ChannelConsole {
    fn display(&self, message: &str) {
        let _ = self.tx.send(format!("> {message}"));
    }
}

/// Keeps every displayed line in memory.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<String>>,
}

impl MemoryConsole {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for MemoryConsole {
    fn display(&self, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("> {message}"));
    }
}

/// Reads stdin line by line on a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so it lives on a detached
/// thread that never holds up runtime shutdown. The channel closes at end
/// of input.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "failed to read console input");
                    break;
                }
            }
        }
    });
    rx
}
