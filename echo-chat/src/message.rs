use std::io;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
};

/// First token a client must send after connecting.
pub const LOGIN_COMMAND: &str = "#login";

/// Reply sent to a connection that talks before logging in.
pub const LOGIN_REQUIRED: &str = "You must login first using '#login <loginId>'";

/// Reply sent to a connection that tries to log in a second time.
pub const LOGIN_ONLY_ONCE: &str = "#login only allowed at initial connection";

/// Prefix applied to messages typed at the server console.
pub const SERVER_MSG_PREFIX: &str = "SERVER MSG> ";

/// Inbound half of a connection, split into newline-delimited frames.
///
/// `Lines::next_line` is cancel safe, so a pending read can sit in a
/// `select!` next to a close signal without losing half a frame.
pub type FrameReader<R> = Lines<R>;

pub fn frame_reader<R>(reader: R) -> FrameReader<BufReader<R>>
where
    R: AsyncRead + Unpin,
{
    BufReader::new(reader).lines()
}

/// Builds the `#login <id>` handshake a client sends on connect.
pub fn login_message(login_id: &str) -> String {
    format!("{LOGIN_COMMAND} {login_id}")
}

/// Builds the fan-out line for a chat message from an authenticated sender.
pub fn chat_line(login_id: &str, text: &str) -> String {
    format!("{login_id}: {text}")
}

pub fn server_line(text: &str) -> String {
    format!("{SERVER_MSG_PREFIX}{text}")
}

/// Returns the first whitespace-delimited token, or `""` for blank input.
pub fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

pub async fn read_message<R, T>(reader: &mut FrameReader<R>) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    // Every frame is one JSON value on its own line; JSON escaping keeps
    // embedded newlines from splitting a message.
    loop {
        let Some(line) = reader.next_line().await? else {
            return Ok(None);
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    // Encode to JSON once, append a newline delimiter, and flush so peers get timely updates.
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
