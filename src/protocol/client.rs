//! Request/response client for the backend's line protocol.
//!
//! [`ProtocolClient`] wraps any async byte stream (the per-session proxy
//! socket in production, an in-memory duplex in tests) and provides typed
//! methods for the handful of commands the front-end issues. The protocol is
//! strictly request-then-response; no call is pipelined.
//!
//! ## Command summary
//!
//! | Method          | Wire command        | Reply handling                  |
//! |-----------------|---------------------|---------------------------------|
//! | `iden`          | `IDEN a|b|c|d|e`    | 2xx expected                    |
//! | `login`         | `USER x` / `PASS y` | 3xx after USER, 2xx after PASS  |
//! | `goto_room`     | `GOTO room`         | 2xx = entered                   |
//! | `server_info`   | `INFO`              | 1xx + listing                   |
//! | `who`           | `RWHO`              | 1xx + listing                   |
//! | `quit`          | `QUIT` + padding    | one line read and discarded     |

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};

use super::reply::{Reply, LISTING_END};

/// Wire name of the default/home room every connection can navigate to.
pub const BASE_ROOM: &str = "_BASEROOM_";

/// Client identity announced with `IDEN` before any other command.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub developer_id: u16,
    pub client_id: u16,
    pub version: String,
    pub name: String,
    pub hostname: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            developer_id: 0,
            client_id: 8,
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: "parlor".to_string(),
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
        }
    }
}

/// Server identity returned by `INFO`.
///
/// The listing is positional; only the first few fields are interesting here:
/// line 0 is the caller's session number, line 1 the node name, line 2 the
/// human-readable server name, line 4 the software identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub node_name: String,
    pub display_name: String,
    pub software: String,
}

impl ServerInfo {
    fn from_lines(lines: &[String]) -> Self {
        let field = |i: usize| lines.get(i).cloned().unwrap_or_default();
        Self {
            node_name: field(1),
            display_name: field(2),
            software: field(4),
        }
    }
}

/// One connected user, as reported by `RWHO`.
///
/// Listing lines are `session|user|room|host`; trailing fields may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoEntry {
    pub session: String,
    pub user: String,
    pub room: String,
    pub host: String,
}

impl WhoEntry {
    fn from_line(line: &str) -> Self {
        let mut fields = line.split('|');
        let mut next = || fields.next().unwrap_or_default().to_string();
        Self {
            session: next(),
            user: next(),
            room: next(),
            host: next(),
        }
    }
}

/// Errors produced by protocol calls.
#[derive(Debug)]
pub enum ProtocolError {
    /// Underlying stream error.
    Io(std::io::Error),
    /// The peer closed the stream mid-conversation.
    Closed,
    /// A reply line did not start with a 3-digit code.
    Malformed(String),
    /// The server answered a command with an unexpected reply class
    /// (e.g. an error where a listing was required).
    Rejected(Reply),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Io(e) => write!(f, "stream error: {e}"),
            ProtocolError::Closed => write!(f, "connection closed by peer"),
            ProtocolError::Malformed(line) => write!(f, "malformed reply line: {line:?}"),
            ProtocolError::Rejected(reply) => write!(f, "server rejected command: {reply}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

/// Line-protocol client over an arbitrary async stream.
pub struct ProtocolClient<S> {
    io: BufStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ProtocolClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            io: BufStream::new(stream),
        }
    }

    /// Send one command line and read the reply line for it.
    async fn send(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        self.io.write_all(command.as_bytes()).await?;
        self.io.write_all(b"\n").await?;
        self.io.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        let line = self.read_line().await?;
        Reply::parse(&line).ok_or(ProtocolError::Malformed(line))
    }

    async fn read_line(&mut self) -> Result<String, ProtocolError> {
        let mut line = String::new();
        let n = self.io.read_line(&mut line).await?;
        if n == 0 {
            return Err(ProtocolError::Closed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Read listing lines up to and excluding the terminator.
    async fn read_listing(&mut self) -> Result<Vec<String>, ProtocolError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == LISTING_END {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Announce client identity. Must be the first command on a fresh
    /// connection; the server refuses most other commands before it.
    pub async fn iden(&mut self, identity: &ClientIdentity) -> Result<(), ProtocolError> {
        let reply = self
            .send(&format!(
                "IDEN {}|{}|{}|{}|{}",
                identity.developer_id,
                identity.client_id,
                identity.version,
                identity.name,
                identity.hostname
            ))
            .await?;
        if reply.is_error() {
            return Err(ProtocolError::Rejected(reply));
        }
        Ok(())
    }

    /// Authenticate with the two-step `USER`/`PASS` exchange.
    ///
    /// Returns `Ok(false)` when the server turns the credentials down at
    /// either step — an unknown username skips the `PASS` step entirely.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<bool, ProtocolError> {
        let reply = self.send(&format!("USER {username}")).await?;
        if !reply.is_more_data() {
            return Ok(false);
        }
        let reply = self.send(&format!("PASS {password}")).await?;
        Ok(reply.is_ok())
    }

    /// Navigate to a room. Returns whether the server accepted the move.
    pub async fn goto_room(&mut self, room: &str) -> Result<bool, ProtocolError> {
        let reply = self.send(&format!("GOTO {room}")).await?;
        Ok(reply.is_ok())
    }

    /// Fetch the server's identity listing.
    pub async fn server_info(&mut self) -> Result<ServerInfo, ProtocolError> {
        let reply = self.send("INFO").await?;
        if !reply.is_listing() {
            return Err(ProtocolError::Rejected(reply));
        }
        let lines = self.read_listing().await?;
        Ok(ServerInfo::from_lines(&lines))
    }

    /// List connected users.
    pub async fn who(&mut self) -> Result<Vec<WhoEntry>, ProtocolError> {
        let reply = self.send("RWHO").await?;
        if !reply.is_listing() {
            return Err(ProtocolError::Rejected(reply));
        }
        let lines = self.read_listing().await?;
        Ok(lines.iter().map(|l| WhoEntry::from_line(l)).collect())
    }

    /// Terminate the backend session.
    ///
    /// The command is padded with a run of newlines and flushed in one go so
    /// the proxy observes an unambiguous end-of-session rather than a
    /// transient idle gap. The acknowledgement is read and discarded; the
    /// server closing the stream first is also a valid outcome.
    pub async fn quit(&mut self) -> Result<(), ProtocolError> {
        self.io.write_all(b"QUIT\n\n\n\n\n\n\n\n\n\n").await?;
        self.io.flush().await?;
        match self.read_reply().await {
            Ok(_) | Err(ProtocolError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
