//! Login, perform-login, and logout — the pages reachable without an
//! authenticated session.

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;

use super::{escape_html, fatal_page, page_shell, resolve_session};
use crate::bridge::gate::Page;
use crate::bridge::Resolution;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginQuery {
    /// Set when a previous attempt was rejected.
    pub failed: Option<u8>,
}

/// `GET /login` — the login form.
pub async fn login_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    let (jar, session) = resolve_session(&state, jar).await;
    let mut session = session.lock().await;

    match state.bridge.ensure(&mut session, Page::Login).await {
        Resolution::Redirect(location) => (jar, Redirect::to(location)).into_response(),
        Resolution::Fatal(reason) => (jar, fatal_page(&reason)).into_response(),
        Resolution::Connection(_) => {
            let server = session.server_name.as_deref().unwrap_or("parlor");
            let notice = if query.failed.is_some() {
                "<p>Login incorrect. Please try again.</p>"
            } else {
                ""
            };
            let body = format!(
                "<h1>Welcome to {server}</h1>\n{notice}\n\
                 <form method=\"post\" action=\"/login\">\n\
                 <label>Name <input name=\"username\" autofocus></label><br>\n\
                 <label>Password <input name=\"password\" type=\"password\"></label><br>\n\
                 <button type=\"submit\">Log in</button>\n\
                 </form>",
                server = escape_html(server),
            );
            (jar, Html(page_shell("Log in", &body))).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// `POST /login` — perform-login.
///
/// Runs the bridge's login over the session's connection; success lands on
/// the front page, rejection returns to the form.
pub async fn perform_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let (jar, session) = resolve_session(&state, jar).await;
    let mut session = session.lock().await;

    match state.bridge.ensure(&mut session, Page::PerformLogin).await {
        Resolution::Redirect(location) => (jar, Redirect::to(location)).into_response(),
        Resolution::Fatal(reason) => (jar, fatal_page(&reason)).into_response(),
        Resolution::Connection(mut conn) => {
            match state
                .bridge
                .login(&mut session, &mut conn, &form.username, &form.password)
                .await
            {
                Ok(true) => (jar, Redirect::to("/")).into_response(),
                Ok(false) => (jar, Redirect::to("/login?failed=1")).into_response(),
                Err(e) => {
                    warn!("login conversation failed: {e}");
                    (jar, fatal_page(&e.to_string())).into_response()
                }
            }
        }
    }
}

/// `GET /logout` — terminate the backend session and forget everything.
///
/// When the backend is already unreachable the web-session state is cleared
/// anyway; the next request starts from scratch either way.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session) = resolve_session(&state, jar).await;
    let mut session = session.lock().await;

    match state.bridge.ensure(&mut session, Page::Logout).await {
        Resolution::Connection(conn) => {
            state.bridge.end_session(&mut session, conn).await;
        }
        Resolution::Fatal(reason) => {
            warn!("logout with unreachable backend: {reason}");
            session.clear();
        }
        Resolution::Redirect(_) => {
            session.clear();
        }
    }
    (jar, Redirect::to("/login")).into_response()
}
