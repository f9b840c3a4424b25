//! Per-session backend connection proxy.
//!
//! One proxy process runs per active web session. It owns the single TCP
//! connection to the backend and exposes it locally through a Unix socket
//! whose path encodes the session id. Web requests connect to the socket,
//! hold a conversation, and disconnect; the backend connection persists
//! across them.
//!
//! ## Serialization
//!
//! The accept loop serves **one client at a time** — a second request from
//! the same session (e.g. another browser tab) queues on the socket until
//! the current conversation ends. This is what keeps the backend's strictly
//! ordered request/response stream free of interleaved commands.
//!
//! ## Lifetime
//!
//! The proxy exits when:
//! - the backend closes the connection (it observed the terminate command),
//! - no client has been connected for `idle_timeout`, or
//! - the initial backend connect or socket bind fails.
//!
//! It never authenticates or navigates on its own; the web tier replays all
//! session state after reconnecting.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixListener};
use tracing::{info, warn};

/// Runtime settings for one proxy process.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Unix socket path to bind (the session rendezvous point).
    pub socket_path: PathBuf,
    /// Backend `host:port`.
    pub backend_addr: String,
    /// Timeout for the initial backend TCP connect.
    pub connect_timeout: Duration,
    /// Exit after this long with no client connected.
    pub idle_timeout: Duration,
}

/// How a relayed client conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client hung up; the backend connection is still good.
    ClientClosed,
    /// The backend closed the stream — the session is over.
    BackendClosed,
}

/// Run the proxy to completion. Returns once the session is over.
pub async fn run(settings: &ProxySettings) -> io::Result<()> {
    let backend = tokio::time::timeout(
        settings.connect_timeout,
        TcpStream::connect(&settings.backend_addr),
    )
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "backend connect timed out"))??;

    let (read_half, mut write_half) = backend.into_split();
    let mut backend_read = BufReader::new(read_half);

    // The backend greets every new connection with one reply line. Consume it
    // here so relayed conversations start at the client's first command.
    let mut greeting = String::new();
    backend_read.read_line(&mut greeting).await?;
    if greeting.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "backend closed before greeting",
        ));
    }
    info!("backend greeting: {}", greeting.trim_end());

    let listener = bind_endpoint(&settings.socket_path)?;
    info!(
        "session endpoint ready at {}",
        settings.socket_path.display()
    );

    let result = accept_loop(
        &listener,
        &mut backend_read,
        &mut write_half,
        settings.idle_timeout,
    )
    .await;

    if let Err(e) = std::fs::remove_file(&settings.socket_path) {
        warn!("failed to remove socket file: {e}");
    }
    result
}

/// Bind the rendezvous socket, replacing any stale file left behind by a
/// previous proxy that died uncleanly.
fn bind_endpoint(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(listener)
}

async fn accept_loop(
    listener: &UnixListener,
    backend_read: &mut (impl AsyncRead + Unpin),
    backend_write: &mut (impl AsyncWrite + Unpin),
    idle_timeout: Duration,
) -> io::Result<()> {
    loop {
        let client = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            },
            () = tokio::time::sleep(idle_timeout) => {
                info!("no client for {}s, exiting", idle_timeout.as_secs());
                return Ok(());
            }
        };

        match relay_client(client, backend_read, backend_write).await {
            Ok(RelayEnd::ClientClosed) => {}
            Ok(RelayEnd::BackendClosed) => {
                info!("backend closed connection, session over");
                return Ok(());
            }
            Err(e) => {
                info!("backend relay error, session over: {e}");
                return Ok(());
            }
        }
    }
}

/// Relay bytes between one client and the backend until either side closes.
///
/// Client-side errors end the conversation but keep the backend connection;
/// backend-side errors propagate to the caller.
pub async fn relay_client(
    client: impl AsyncRead + AsyncWrite + Unpin,
    backend_read: &mut (impl AsyncRead + Unpin),
    backend_write: &mut (impl AsyncWrite + Unpin),
) -> io::Result<RelayEnd> {
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let mut to_backend = [0u8; 4096];
    let mut to_client = [0u8; 4096];

    loop {
        tokio::select! {
            n = client_read.read(&mut to_backend) => match n {
                Ok(0) | Err(_) => return Ok(RelayEnd::ClientClosed),
                Ok(n) => {
                    backend_write.write_all(&to_backend[..n]).await?;
                    backend_write.flush().await?;
                }
            },
            n = backend_read.read(&mut to_client) => match n? {
                0 => {
                    let _ = client_write.shutdown().await;
                    return Ok(RelayEnd::BackendClosed);
                }
                n => {
                    if client_write.write_all(&to_client[..n]).await.is_err() {
                        return Ok(RelayEnd::ClientClosed);
                    }
                    let _ = client_write.flush().await;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relay_forwards_both_directions() {
        let (client_ours, client_theirs) = tokio::io::duplex(4096);
        let (mut backend_ours, backend_theirs) = tokio::io::duplex(4096);
        let (mut backend_read, mut backend_write) = tokio::io::split(backend_theirs);

        let relay = tokio::spawn(async move {
            relay_client(client_theirs, &mut backend_read, &mut backend_write).await
        });

        let mut client = tokio::io::BufStream::new(client_ours);
        client.write_all(b"GOTO Lobby\n").await.unwrap();
        client.flush().await.unwrap();

        let mut line = vec![0u8; 11];
        backend_ours.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"GOTO Lobby\n");

        backend_ours.write_all(b"200 Lobby\n").await.unwrap();
        let mut reply = String::new();
        client.read_line(&mut reply).await.unwrap();
        assert_eq!(reply, "200 Lobby\n");

        // Client hangs up; backend connection must survive
        drop(client);
        assert_eq!(relay.await.unwrap().unwrap(), RelayEnd::ClientClosed);
    }

    #[tokio::test]
    async fn test_relay_reports_backend_close() {
        let (client_ours, client_theirs) = tokio::io::duplex(4096);
        let (backend_ours, backend_theirs) = tokio::io::duplex(4096);
        let (mut backend_read, mut backend_write) = tokio::io::split(backend_theirs);

        drop(backend_ours);
        let end = relay_client(client_theirs, &mut backend_read, &mut backend_write)
            .await
            .unwrap();
        assert_eq!(end, RelayEnd::BackendClosed);
        drop(client_ours);
    }

    #[tokio::test]
    async fn test_relay_client_error_keeps_backend() {
        let (client_ours, client_theirs) = tokio::io::duplex(4096);
        let (mut backend_ours, backend_theirs) = tokio::io::duplex(4096);
        let (mut backend_read, mut backend_write) = tokio::io::split(backend_theirs);

        drop(client_ours);
        let end = relay_client(client_theirs, &mut backend_read, &mut backend_write)
            .await
            .unwrap();
        assert_eq!(end, RelayEnd::ClientClosed);

        // Backend stream still usable afterwards
        backend_ours.write_all(b"ping\n").await.unwrap();
        let mut buf = [0u8; 5];
        backend_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping\n");
    }
}
