//! Console command parsing for the server and client operators.
//!
//! A line is a command when it starts with `#`. The first whitespace token
//! selects the command (case-sensitive); arguments are kept raw so the
//! interpreter can check its preconditions before it complains about them.

use crate::message::first_token;

/// Commands typed at the server console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Quit,
    Stop,
    Close,
    SetPort(Option<String>),
    Start,
    GetPort,
    Unknown,
}

impl ServerCommand {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        match parts.next().unwrap_or("") {
            "#quit" => ServerCommand::Quit,
            "#stop" => ServerCommand::Stop,
            "#close" => ServerCommand::Close,
            "#setport" => ServerCommand::SetPort(parts.next().map(str::to_string)),
            "#start" => ServerCommand::Start,
            "#getport" => ServerCommand::GetPort,
            _ => ServerCommand::Unknown,
        }
    }
}

/// Commands typed at the client console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    SetHost(Option<String>),
    SetPort(Option<String>),
    Login,
    GetHost,
    GetPort,
    Unknown,
}

impl ClientCommand {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        match parts.next().unwrap_or("") {
            "#quit" => ClientCommand::Quit,
            "#logoff" => ClientCommand::Logoff,
            "#sethost" => ClientCommand::SetHost(parts.next().map(str::to_string)),
            "#setport" => ClientCommand::SetPort(parts.next().map(str::to_string)),
            "#login" => ClientCommand::Login,
            "#gethost" => ClientCommand::GetHost,
            "#getport" => ClientCommand::GetPort,
            _ => ClientCommand::Unknown,
        }
    }
}

pub fn is_command(line: &str) -> bool {
    line.starts_with('#')
}

/// Why a `#setport` argument was refused. `Display` is the usage hint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortArgError {
    #[error("Usage: #setport <port>")]
    Missing,
    #[error("Port must be a number. Usage: #setport <port>")]
    NotANumber,
}

pub fn parse_port_arg(arg: Option<&str>) -> Result<u16, PortArgError> {
    let arg = arg.ok_or(PortArgError::Missing)?;
    arg.parse().map_err(|_| PortArgError::NotANumber)
}

pub const SETHOST_USAGE: &str = "Usage: #sethost <host>";

pub fn unknown_command(line: &str) -> String {
    format!("Unknown command: {line}")
}

/// Name of the command on `line`, for logging.
pub fn command_name(line: &str) -> &str {
    first_token(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_commands() {
        assert_eq!(ServerCommand::parse("#quit"), ServerCommand::Quit);
        assert_eq!(ServerCommand::parse("  #stop  "), ServerCommand::Stop);
        assert_eq!(ServerCommand::parse("#close"), ServerCommand::Close);
        assert_eq!(ServerCommand::parse("#start"), ServerCommand::Start);
        assert_eq!(ServerCommand::parse("#getport"), ServerCommand::GetPort);
        assert_eq!(
            ServerCommand::parse("#setport 6000"),
            ServerCommand::SetPort(Some("6000".into()))
        );
        assert_eq!(ServerCommand::parse("#setport"), ServerCommand::SetPort(None));
    }

    #[test]
    fn commands_are_case_sensitive() {
        assert_eq!(ServerCommand::parse("#QUIT"), ServerCommand::Unknown);
        assert_eq!(ClientCommand::parse("#Logoff"), ClientCommand::Unknown);
        assert_eq!(ServerCommand::parse("#"), ServerCommand::Unknown);
    }

    #[test]
    fn client_commands() {
        assert_eq!(ClientCommand::parse("#quit"), ClientCommand::Quit);
        assert_eq!(ClientCommand::parse("#logoff"), ClientCommand::Logoff);
        assert_eq!(ClientCommand::parse("#login again"), ClientCommand::Login);
        assert_eq!(ClientCommand::parse("#gethost"), ClientCommand::GetHost);
        assert_eq!(ClientCommand::parse("#getport"), ClientCommand::GetPort);
        assert_eq!(
            ClientCommand::parse("#sethost example.org"),
            ClientCommand::SetHost(Some("example.org".into()))
        );
        assert_eq!(ClientCommand::parse("#sethost"), ClientCommand::SetHost(None));
        assert_eq!(
            ClientCommand::parse("#setport 7000"),
            ClientCommand::SetPort(Some("7000".into()))
        );
        assert_eq!(ClientCommand::parse("#whisper bob"), ClientCommand::Unknown);
    }

    #[test]
    fn port_arguments() {
        assert_eq!(parse_port_arg(Some("6000")), Ok(6000));
        assert_eq!(parse_port_arg(None), Err(PortArgError::Missing));
        assert_eq!(parse_port_arg(Some("abc")), Err(PortArgError::NotANumber));
        assert_eq!(parse_port_arg(Some("70000")), Err(PortArgError::NotANumber));
        assert_eq!(
            PortArgError::NotANumber.to_string(),
            "Port must be a number. Usage: #setport <port>"
        );
    }

    #[test]
    fn command_detection() {
        assert!(is_command("#getport"));
        assert!(!is_command(" #getport"));
        assert!(!is_command("hello #world"));
        assert_eq!(unknown_command("#foo bar"), "Unknown command: #foo bar");
        assert_eq!(command_name("#setport 1"), "#setport");
    }
}
