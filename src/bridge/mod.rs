//! The session bridge: one live backend connection per web session.
//!
//! HTTP requests are transient; the backend wants a persistent, ordered,
//! single-client connection per logged-in user. The bridge closes that gap.
//! Given a web session, [`SessionBridge::ensure`] locates the session's
//! proxy endpoint, connects to it, and — when the proxy had to be respawned
//! — replays the cached login and navigation state so the rebuilt backend
//! connection matches what the browser believes. It then gates access:
//! unauthenticated sessions only reach the login pages.
//!
//! Every page handler calls `ensure()` before any page logic and always gets
//! exactly one of three outcomes: a connection, a redirect, or a fatal
//! backend-unreachable verdict. No error escapes in any other shape.

pub mod endpoint;
pub mod gate;
pub mod replay;

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use uuid::Uuid;

use crate::protocol::{ClientIdentity, ProtocolClient, ProtocolError};
use crate::websession::WebSession;
use endpoint::{endpoint_path, Connector, Launcher};
use gate::{Page, LOGIN_LOCATION};

/// The live handle a request works with. Dropping it closes this request's
/// channel to the proxy; the proxy and its backend connection live on.
pub struct BridgeConnection<S> {
    client: ProtocolClient<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BridgeConnection<S> {
    fn new(stream: S) -> Self {
        Self {
            client: ProtocolClient::new(stream),
        }
    }

    pub fn client(&mut self) -> &mut ProtocolClient<S> {
        &mut self.client
    }
}

/// Outcome of [`SessionBridge::ensure`].
pub enum Resolution<S> {
    /// A working channel to this session's backend connection.
    Connection(BridgeConnection<S>),
    /// The request must be answered with a redirect to this location and no
    /// page logic may run.
    Redirect(&'static str),
    /// No backend connection could be established; render an error and stop.
    Fatal(String),
}

/// Timing knobs for connection resolution.
#[derive(Debug, Clone)]
pub struct BridgeTiming {
    /// Per-attempt endpoint connect timeout.
    pub connect_timeout: Duration,
    /// Total time allowed for a freshly spawned proxy to come up.
    pub spawn_wait: Duration,
    /// Interval between connect attempts while waiting for the spawn.
    pub spawn_poll: Duration,
}

impl Default for BridgeTiming {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            spawn_wait: Duration::from_secs(3),
            spawn_poll: Duration::from_millis(250),
        }
    }
}

/// Bridges web sessions to their per-session proxy processes.
pub struct SessionBridge<C, L> {
    connector: C,
    launcher: L,
    socket_dir: PathBuf,
    timing: BridgeTiming,
    identity: ClientIdentity,
}

impl<C: Connector, L: Launcher> SessionBridge<C, L> {
    pub fn new(
        connector: C,
        launcher: L,
        socket_dir: PathBuf,
        timing: BridgeTiming,
        identity: ClientIdentity,
    ) -> Self {
        Self {
            connector,
            launcher,
            socket_dir,
            timing,
            identity,
        }
    }

    /// Resolve a working backend connection for this session, then apply the
    /// access gate for the named page.
    ///
    /// The proxy is spawned at most once per request. When the spawn path
    /// ran, cached state is replayed onto the fresh connection before the
    /// gate is evaluated. The server display name is fetched and cached the
    /// first time a connection is available after it was lost or never set.
    pub async fn ensure(&self, session: &mut WebSession, page: Page) -> Resolution<C::Stream> {
        let session_id = session
            .backend_session_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let path = endpoint_path(&self.socket_dir, &session_id);

        let mut conn = match self
            .connector
            .connect(&path, self.timing.connect_timeout)
            .await
        {
            Ok(stream) => BridgeConnection::new(stream),
            Err(probe_err) => {
                info!("no proxy at {}: {probe_err}; spawning", path.display());
                match self.spawn_and_replay(session, &path).await {
                    Ok(conn) => conn,
                    Err(reason) => {
                        warn!("session {session_id} unreachable: {reason}");
                        return Resolution::Fatal(reason);
                    }
                }
            }
        };

        if session.server_name.is_none() {
            match conn.client().server_info().await {
                Ok(server) => {
                    info!("connected to {}", server.display_name);
                    session.server_name = Some(server.display_name);
                }
                Err(e) => warn!("server info unavailable: {e}"),
            }
        }

        if !session.authenticated && !page.is_public() {
            return Resolution::Redirect(LOGIN_LOCATION);
        }

        Resolution::Connection(conn)
    }

    /// Spawn the proxy once, poll-connect until the deadline, and replay
    /// cached state onto the fresh connection.
    async fn spawn_and_replay(
        &self,
        session: &mut WebSession,
        path: &std::path::Path,
    ) -> Result<BridgeConnection<C::Stream>, String> {
        self.launcher
            .launch(path)
            .map_err(|e| format!("failed to spawn session proxy: {e}"))?;

        let deadline = tokio::time::Instant::now() + self.timing.spawn_wait;
        let stream = loop {
            tokio::time::sleep(self.timing.spawn_poll).await;
            match self
                .connector
                .connect(path, self.timing.connect_timeout)
                .await
            {
                Ok(stream) => break stream,
                Err(e) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(format!("session proxy did not come up: {e}"));
                    }
                }
            }
        };

        let mut conn = BridgeConnection::new(stream);
        replay::run(conn.client(), &self.identity, session)
            .await
            .map_err(|e| format!("state replay failed: {e}"))?;
        Ok(conn)
    }

    /// Log in over an established connection, caching the credentials for
    /// future replay on success.
    pub async fn login(
        &self,
        session: &mut WebSession,
        conn: &mut BridgeConnection<C::Stream>,
        username: &str,
        password: &str,
    ) -> Result<bool, ProtocolError> {
        if conn.client().login(username, password).await? {
            session.authenticated = true;
            session.username = Some(username.to_string());
            session.password = Some(password.to_string());
            info!("{username} logged in");
            Ok(true)
        } else {
            info!("login rejected for {username}");
            Ok(false)
        }
    }

    /// Navigate to a room, caching it as the session's current room on
    /// success.
    pub async fn navigate(
        &self,
        session: &mut WebSession,
        conn: &mut BridgeConnection<C::Stream>,
        room: &str,
    ) -> Result<bool, ProtocolError> {
        if conn.client().goto_room(room).await? {
            session.room = Some(room.to_string());
            Ok(true)
        } else {
            warn!("navigation to {room} rejected");
            Ok(false)
        }
    }

    /// Terminate the backend session and reset the web session to its
    /// initial state. The proxy exits on its own after observing the
    /// terminate command; only our end of the channel is closed here.
    pub async fn end_session(
        &self,
        session: &mut WebSession,
        mut conn: BridgeConnection<C::Stream>,
    ) {
        if let Err(e) = conn.client().quit().await {
            warn!("terminate failed (proxy already gone?): {e}");
        }
        drop(conn);
        let id = session.backend_session_id.take();
        session.clear();
        info!("session {} ended", id.unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream, DuplexStream};

    /// One prepared answer for a connect attempt.
    enum Attempt {
        Refuse,
        Accept(DuplexStream),
    }

    /// Connect seam fed from a queue of prepared outcomes, plus a recording
    /// launcher. Every line any scripted peer receives is appended to
    /// `received`, so tests can assert exact command order across the
    /// session's lifetime.
    #[derive(Clone, Default)]
    struct FakeEndpoint {
        attempts: Arc<Mutex<VecDeque<Attempt>>>,
        launches: Arc<Mutex<Vec<PathBuf>>>,
        received: Arc<Mutex<Vec<String>>>,
    }

    impl FakeEndpoint {
        /// Queue a refused connect attempt.
        fn refuse(&self) {
            self.attempts.lock().unwrap().push_back(Attempt::Refuse);
        }

        /// Queue an accepted connect whose peer answers per `exchanges`:
        /// each entry maps a command prefix to a scripted response.
        fn accept(&self, exchanges: Vec<(&'static str, &'static str)>) {
            let (ours, theirs) = tokio::io::duplex(8192);
            let received = Arc::clone(&self.received);
            tokio::spawn(async move {
                let mut io = BufStream::new(theirs);
                for (expect, response) in exchanges {
                    let mut line = String::new();
                    if io.read_line(&mut line).await.unwrap() == 0 {
                        panic!("peer closed before sending expected {expect:?}");
                    }
                    let line = line.trim_end().to_string();
                    assert!(
                        line.starts_with(expect),
                        "expected command starting with {expect:?}, got {line:?}"
                    );
                    received.lock().unwrap().push(line);
                    io.write_all(response.as_bytes()).await.unwrap();
                    io.write_all(b"\n").await.unwrap();
                    io.flush().await.unwrap();
                }
                // Drain anything sent after the script (e.g. quit padding)
                let mut rest = String::new();
                use tokio::io::AsyncReadExt;
                let _ = io.read_to_string(&mut rest).await;
            });
            self.attempts
                .lock()
                .unwrap()
                .push_back(Attempt::Accept(ours));
        }

        fn launch_count(&self) -> usize {
            self.launches.lock().unwrap().len()
        }

        fn commands(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }
    }

    impl Connector for FakeEndpoint {
        type Stream = DuplexStream;

        async fn connect(&self, _path: &Path, _timeout: Duration) -> io::Result<DuplexStream> {
            match self.attempts.lock().unwrap().pop_front() {
                Some(Attempt::Accept(stream)) => Ok(stream),
                Some(Attempt::Refuse) | None => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "no proxy bound",
                )),
            }
        }
    }

    impl Launcher for FakeEndpoint {
        fn launch(&self, endpoint: &Path) -> io::Result<()> {
            self.launches.lock().unwrap().push(endpoint.to_path_buf());
            Ok(())
        }
    }

    fn bridge(fake: &FakeEndpoint) -> SessionBridge<FakeEndpoint, FakeEndpoint> {
        let identity = ClientIdentity {
            developer_id: 0,
            client_id: 8,
            version: "test".into(),
            name: "parlor".into(),
            hostname: "testhost".into(),
        };
        SessionBridge::new(
            fake.clone(),
            fake.clone(),
            PathBuf::from("/tmp/parlor-test"),
            BridgeTiming::default(),
            identity,
        )
    }

    fn established_session() -> WebSession {
        WebSession {
            backend_session_id: Some("abc123".into()),
            authenticated: true,
            username: Some("alice".into()),
            password: Some("secret".into()),
            room: Some("Lobby".into()),
            server_name: Some("Mountain View BBS".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotent_resolution() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![]);
        fake.accept(vec![]);
        let bridge = bridge(&fake);
        let mut session = established_session();

        for _ in 0..2 {
            match bridge.ensure(&mut session, Page::Front).await {
                Resolution::Connection(_) => {}
                _ => panic!("expected a connection"),
            }
        }

        tokio::task::yield_now().await;
        assert_eq!(fake.launch_count(), 0);
        assert!(fake.commands().is_empty(), "no replay calls expected");
        assert_eq!(session.backend_session_id.as_deref(), Some("abc123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_completeness() {
        let fake = FakeEndpoint::default();
        fake.refuse(); // probe: proxy is gone
        fake.accept(vec![
            ("IDEN ", "200 ok"),
            ("USER alice", "300 password required"),
            ("PASS secret", "200 welcome"),
            ("GOTO Lobby", "200 Lobby"),
        ]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        session.authenticated = false;

        match bridge.ensure(&mut session, Page::Front).await {
            Resolution::Connection(_) => {}
            _ => panic!("expected a connection"),
        }

        assert_eq!(fake.launch_count(), 1);
        assert!(session.authenticated);
        let commands = fake.commands();
        assert!(commands[0].starts_with("IDEN "));
        assert_eq!(commands[1], "USER alice");
        assert_eq!(commands[2], "PASS secret");
        assert_eq!(commands[3], "GOTO Lobby");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_login_failure_still_navigates() {
        let fake = FakeEndpoint::default();
        fake.refuse();
        fake.accept(vec![
            ("IDEN ", "200 ok"),
            ("USER alice", "500 no such user"),
            ("GOTO Lobby", "200 Lobby"),
        ]);
        let bridge = bridge(&fake);
        let mut session = established_session();

        // Gate fires because the replayed login failed
        match bridge.ensure(&mut session, Page::Front).await {
            Resolution::Redirect(location) => assert_eq!(location, LOGIN_LOCATION),
            _ => panic!("expected a redirect"),
        }

        assert!(!session.authenticated);
        let commands = fake.commands();
        assert_eq!(
            commands[1..],
            ["USER alice".to_string(), "GOTO Lobby".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_enforcement_leaves_session_unmodified() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        session.authenticated = false;
        let snapshot = session.clone();

        match bridge.ensure(&mut session, Page::Who).await {
            Resolution::Redirect(location) => assert_eq!(location, LOGIN_LOCATION),
            _ => panic!("expected a redirect"),
        }
        assert_eq!(session, snapshot);
        tokio::task::yield_now().await;
        assert!(fake.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_list_exemption() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        session.authenticated = false;

        match bridge.ensure(&mut session, Page::Login).await {
            Resolution::Connection(_) => {}
            _ => panic!("login page must not redirect"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_when_spawn_never_comes_up() {
        let fake = FakeEndpoint::default();
        let bridge = bridge(&fake);
        let mut session = established_session();

        match bridge.ensure(&mut session, Page::Front).await {
            Resolution::Fatal(reason) => {
                assert!(reason.contains("did not come up"), "got: {reason}");
            }
            _ => panic!("expected fatal"),
        }
        assert_eq!(fake.launch_count(), 1);
        assert!(fake.commands().is_empty(), "no backend calls on fatal path");
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_resets_identity() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![("QUIT", "200 goodbye")]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        let old_id = session.backend_session_id.clone().unwrap();

        let conn = match bridge.ensure(&mut session, Page::Logout).await {
            Resolution::Connection(conn) => conn,
            _ => panic!("expected a connection"),
        };
        bridge.end_session(&mut session, conn).await;
        assert_eq!(session, WebSession::default());

        // Next ensure builds a brand-new identity from scratch
        fake.refuse();
        fake.accept(vec![
            ("IDEN ", "200 ok"),
            ("GOTO _BASEROOM_", "200 base"),
            ("INFO", "100 info\n7\nnode1\nFresh BBS\nfqdn\nsoftware\n000"),
        ]);
        match bridge.ensure(&mut session, Page::Login).await {
            Resolution::Connection(_) => {}
            _ => panic!("expected a connection"),
        }
        let new_id = session.backend_session_id.clone().unwrap();
        assert_ne!(new_id, old_id);
        assert_eq!(session.server_name.as_deref(), Some("Fresh BBS"));
        assert!(session.username.is_none());
        assert!(session.room.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_info_cached_once() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![(
            "INFO",
            "100 info\n7\nnode1\nMountain View BBS\nfqdn\nsoftware\n000",
        )]);
        fake.accept(vec![]);
        fake.accept(vec![]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        session.server_name = None;

        for _ in 0..3 {
            match bridge.ensure(&mut session, Page::Front).await {
                Resolution::Connection(_) => {}
                _ => panic!("expected a connection"),
            }
        }

        tokio::task::yield_now().await;
        let info_calls = fake
            .commands()
            .iter()
            .filter(|c| c.as_str() == "INFO")
            .count();
        assert_eq!(info_calls, 1);
        assert_eq!(session.server_name.as_deref(), Some("Mountain View BBS"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_caches_credentials() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![
            ("USER bob", "300 password required"),
            ("PASS hunter2", "200 welcome"),
        ]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        session.authenticated = false;
        session.username = None;
        session.password = None;

        let mut conn = match bridge.ensure(&mut session, Page::PerformLogin).await {
            Resolution::Connection(conn) => conn,
            _ => panic!("expected a connection"),
        };
        assert!(bridge
            .login(&mut session, &mut conn, "bob", "hunter2")
            .await
            .unwrap());
        assert!(session.authenticated);
        assert_eq!(session.username.as_deref(), Some("bob"));
        assert_eq!(session.password.as_deref(), Some("hunter2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_login_caches_nothing() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![("USER bob", "500 no such user")]);
        let bridge = bridge(&fake);
        let mut session = established_session();
        session.authenticated = false;
        session.username = None;
        session.password = None;

        let mut conn = match bridge.ensure(&mut session, Page::PerformLogin).await {
            Resolution::Connection(conn) => conn,
            _ => panic!("expected a connection"),
        };
        assert!(!bridge
            .login(&mut session, &mut conn, "bob", "hunter2")
            .await
            .unwrap());
        assert!(!session.authenticated);
        assert!(session.username.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_caches_room() {
        let fake = FakeEndpoint::default();
        fake.accept(vec![("GOTO Kitchen", "200 Kitchen")]);
        let bridge = bridge(&fake);
        let mut session = established_session();

        let mut conn = match bridge.ensure(&mut session, Page::GotoRoom).await {
            Resolution::Connection(conn) => conn,
            _ => panic!("expected a connection"),
        };
        assert!(bridge
            .navigate(&mut session, &mut conn, "Kitchen")
            .await
            .unwrap());
        assert_eq!(session.room.as_deref(), Some("Kitchen"));
    }
}
