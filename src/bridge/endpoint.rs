//! Endpoint naming and the two seams the bridge reaches the world through:
//! connecting to a session's rendezvous socket and launching a proxy for it.
//!
//! Both seams are traits so the connection-resolution algorithm is testable
//! with in-memory streams and a recording launcher; production uses
//! [`UnixConnector`] and [`ProcessLauncher`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;

/// Rendezvous socket path for a backend session id.
pub fn endpoint_path(socket_dir: &Path, session_id: &str) -> PathBuf {
    socket_dir.join(format!("{session_id}.socket"))
}

/// Opens a channel to a session endpoint. Absence, refusal, and timeout all
/// surface as `Err` — the bridge treats them identically.
#[allow(async_fn_in_trait)]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, path: &Path, timeout: Duration) -> io::Result<Self::Stream>;
}

/// Connects to the proxy's Unix socket.
#[derive(Debug, Clone, Default)]
pub struct UnixConnector;

impl Connector for UnixConnector {
    type Stream = UnixStream;

    async fn connect(&self, path: &Path, timeout: Duration) -> io::Result<UnixStream> {
        match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "endpoint connect timed out",
            )),
        }
    }
}

/// Starts the proxy that will bind a session endpoint. The endpoint path is
/// the only session state passed at spawn time — credentials and room are
/// replayed over the connection afterwards.
pub trait Launcher: Send + Sync {
    fn launch(&self, endpoint: &Path) -> io::Result<()>;
}

/// Spawns the `parlor-proxy` binary, detached into its own session so it
/// outlives this server process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub binary: PathBuf,
    pub backend_addr: String,
    pub idle_timeout_secs: u64,
}

impl Launcher for ProcessLauncher {
    fn launch(&self, endpoint: &Path) -> io::Result<()> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg(endpoint)
            .arg("--backend")
            .arg(&self.backend_addr)
            .arg("--idle-timeout-secs")
            .arg(self.idle_timeout_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // SAFETY: setsid is async-signal-safe per POSIX.
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        // The child is not waited on here; the runtime reaps it when it exits.
        cmd.spawn().map(|_child| ())
    }
}

/// Locate the proxy binary: an explicit configured path wins, otherwise look
/// next to the current executable, falling back to a `$PATH` lookup.
pub fn resolve_proxy_binary(configured: &str) -> PathBuf {
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("parlor-proxy");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("parlor-proxy")
}
