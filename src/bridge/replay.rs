//! State replay for freshly rebuilt backend connections.
//!
//! A new proxy connection knows nothing: the backend expects the identify
//! command first, then (optionally) login, then navigation. The order is
//! enforced by [`ReplayState`] transition guards rather than by convention —
//! [`run`] is the only code path that issues these commands on a fresh
//! connection.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::protocol::{ClientIdentity, ProtocolClient, ProtocolError, BASE_ROOM};
use crate::websession::WebSession;

/// Where a fresh connection stands in the replay sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Fresh,
    Identified,
    Authenticated,
    Navigated,
}

impl ReplayState {
    /// Login is only legal immediately after identification.
    pub fn may_login(self) -> bool {
        self == ReplayState::Identified
    }

    /// Navigation is legal any time after identification.
    pub fn may_navigate(self) -> bool {
        self != ReplayState::Fresh
    }
}

/// Replay cached session state onto a fresh connection: identify, log back
/// in if credentials are cached, and return to the last known room (or the
/// base room).
///
/// A rejected login is not an error — it leaves `authenticated` false,
/// matching the backend's real state. Navigation failure is only logged;
/// recovering from a vanished room is the page logic's concern. I/O errors
/// propagate: a connection that dies mid-replay is unusable.
pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(
    conn: &mut ProtocolClient<S>,
    identity: &ClientIdentity,
    session: &mut WebSession,
) -> Result<(), ProtocolError> {
    let mut state = ReplayState::Fresh;

    conn.iden(identity).await?;
    state = ReplayState::Identified;

    if let (Some(username), Some(password)) = (session.username.clone(), session.password.clone())
    {
        debug_assert!(state.may_login());
        if conn.login(&username, &password).await? {
            session.authenticated = true;
            state = ReplayState::Authenticated;
            info!("replayed login for {username}");
        } else {
            session.authenticated = false;
            warn!("cached credentials rejected for {username}");
        }
    }

    let room = session.room.clone();
    let target = room.as_deref().unwrap_or(BASE_ROOM);
    debug_assert!(state.may_navigate());
    if conn.goto_room(target).await? {
        state = ReplayState::Navigated;
        info!("replayed navigation to {target}");
    } else {
        warn!("navigation to {target} rejected during replay");
    }
    debug_assert!(state != ReplayState::Fresh);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_guards() {
        assert!(!ReplayState::Fresh.may_login());
        assert!(!ReplayState::Fresh.may_navigate());
        assert!(ReplayState::Identified.may_login());
        assert!(ReplayState::Identified.may_navigate());
        assert!(!ReplayState::Authenticated.may_login());
        assert!(ReplayState::Authenticated.may_navigate());
        assert!(!ReplayState::Navigated.may_login());
        assert!(ReplayState::Navigated.may_navigate());
    }
}
