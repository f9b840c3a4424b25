//! Protected pages: the front page, room navigation, and who-is-online.
//!
//! These consume bridge state and the connection handle; the heavier room
//! and message machinery lives behind the same pattern.

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::{escape_html, fatal_page, page_shell, resolve_session};
use crate::bridge::gate::Page;
use crate::bridge::Resolution;
use crate::protocol::BASE_ROOM;
use crate::state::AppState;

/// `GET /` — the front page: server identity, current user and room, and
/// navigation links.
pub async fn front(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session) = resolve_session(&state, jar).await;
    let mut session = session.lock().await;

    match state.bridge.ensure(&mut session, Page::Front).await {
        Resolution::Redirect(location) => (jar, Redirect::to(location)).into_response(),
        Resolution::Fatal(reason) => (jar, fatal_page(&reason)).into_response(),
        Resolution::Connection(_conn) => {
            let server = session.server_name.as_deref().unwrap_or("parlor");
            let user = session.username.as_deref().unwrap_or("");
            let room = session.room.as_deref().unwrap_or(BASE_ROOM);
            let body = format!(
                "<h1>{server}</h1>\n\
                 <p>Logged in as <b>{user}</b>, currently in <b>{room}</b>.</p>\n\
                 <p><a href=\"/who\">Who is online?</a> | <a href=\"/logout\">Log out</a></p>",
                server = escape_html(server),
                user = escape_html(user),
                room = escape_html(room),
            );
            (jar, Html(page_shell(server, &body))).into_response()
        }
    }
}

/// `GET /goto/{room}` — enter a room and return to the front page.
///
/// A rejected move (room vanished server-side) is not an error here; the
/// session simply stays in its previous room.
pub async fn goto_room(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(room): Path<String>,
) -> Response {
    let (jar, session) = resolve_session(&state, jar).await;
    let mut session = session.lock().await;

    match state.bridge.ensure(&mut session, Page::GotoRoom).await {
        Resolution::Redirect(location) => (jar, Redirect::to(location)).into_response(),
        Resolution::Fatal(reason) => (jar, fatal_page(&reason)).into_response(),
        Resolution::Connection(mut conn) => {
            match state.bridge.navigate(&mut session, &mut conn, &room).await {
                Ok(true) => {}
                Ok(false) => warn!("room {room} refused"),
                Err(e) => {
                    warn!("navigation conversation failed: {e}");
                    return (jar, fatal_page(&e.to_string())).into_response();
                }
            }
            (jar, Redirect::to("/")).into_response()
        }
    }
}

/// `GET /who` — list connected users.
pub async fn who(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session) = resolve_session(&state, jar).await;
    let mut session = session.lock().await;

    match state.bridge.ensure(&mut session, Page::Who).await {
        Resolution::Redirect(location) => (jar, Redirect::to(location)).into_response(),
        Resolution::Fatal(reason) => (jar, fatal_page(&reason)).into_response(),
        Resolution::Connection(mut conn) => match conn.client().who().await {
            Ok(entries) => {
                let mut rows = String::new();
                for entry in &entries {
                    rows.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                        escape_html(&entry.user),
                        escape_html(&entry.room),
                        escape_html(&entry.host),
                    ));
                }
                let body = format!(
                    "<h1>Who is online?</h1>\n\
                     <table border=\"1\">\n\
                     <tr><th>User</th><th>Room</th><th>Host</th></tr>\n{rows}</table>\n\
                     <p><a href=\"/\">Back</a></p>"
                );
                (jar, Html(page_shell("Who is online?", &body))).into_response()
            }
            Err(e) => {
                warn!("who listing failed: {e}");
                (jar, fatal_page(&e.to_string())).into_response()
            }
        },
    }
}
