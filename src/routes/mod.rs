//! Page handlers and the helpers they share.
//!
//! Every page handler follows the same shape: resolve the web session from
//! the cookie, hold its lock, ask the bridge for a connection, and only then
//! run page logic. The bridge's three outcomes map 1:1 onto HTTP: a
//! connection proceeds, a redirect becomes `303 See Other`, and a fatal
//! verdict renders a minimal `502` page with no page content after it.

pub mod health;
pub mod login;
pub mod pages;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tokio::sync::Mutex;

use crate::state::AppState;
use crate::websession::WebSession;

/// Name of the cookie carrying the opaque web-session token.
pub const SESSION_COOKIE: &str = "parlor_session";

/// Resolve the request's web session from the cookie jar, issuing a fresh
/// cookie when the browser presented none (or a stale one).
pub(crate) async fn resolve_session(
    state: &AppState,
    jar: CookieJar,
) -> (CookieJar, Arc<Mutex<WebSession>>) {
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (token, session, created) = state.store.resolve(token.as_deref()).await;
    let jar = if created {
        jar.add(
            Cookie::build((SESSION_COOKIE, token))
                .path("/")
                .http_only(true)
                .build(),
        )
    } else {
        jar
    };
    (jar, session)
}

/// Minimal error page for the backend-unreachable case.
pub(crate) fn fatal_page(reason: &str) -> Response {
    let body = page_shell(
        "Backend unreachable",
        &format!(
            "<p>The server could not reach its backend: {}</p>\
             <p>Please try again in a moment.</p>",
            escape_html(reason)
        ),
    );
    (StatusCode::BAD_GATEWAY, Html(body)).into_response()
}

/// Wrap page body markup in the common document shell.
pub(crate) fn page_shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
         <body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Escape text for interpolation into HTML.
pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>&"fish"</b>"#),
            "&lt;b&gt;&amp;&quot;fish&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain room"), "plain room");
    }

    #[test]
    fn test_page_shell_escapes_title() {
        let html = page_shell("a<b", "<p>ok</p>");
        assert!(html.contains("<title>a&lt;b</title>"));
        assert!(html.contains("<p>ok</p>"));
    }
}
