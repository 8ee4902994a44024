//! Downstream applications and how each one receives its session token.

use std::fmt;
use std::str::FromStr;

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::token::SessionToken;

/// Application which initiated a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientKind {
    #[serde(rename = "CLI")]
    Cli,
    #[serde(rename = "Web")]
    Web,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Cli => "CLI",
            ClientKind::Web => "Web",
        }
    }
}

impl FromStr for ClientKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLI" => Ok(ClientKind::Cli),
            "Web" => Ok(ClientKind::Web),
            _ => Err(ServerError::UnknownClient),
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a freshly minted token into what the client expects.
pub trait ClientResponder: Send + Sync {
    fn respond(&self, token: &SessionToken) -> Response;
}

/// Shows the token on a page so it can be pasted into the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliResponder;

impl ClientResponder for CliResponder {
    fn respond(&self, token: &SessionToken) -> Response {
        Html(format!(
            r#"<html>
    <body>
        <h1>CLI JWT</h1>
        <p>Copy this token into your CLI:</p>
        <textarea style="width:100%;height:200px;">{}</textarea>
    </body>
</html>
"#,
            token.as_str()
        ))
        .into_response()
    }
}

/// Stores the token in an `HttpOnly` cookie and sends the browser back to
/// the front end.
#[derive(Debug, Clone)]
pub struct WebResponder {
    frontend_url: String,
    cookie_name: String,
    secure: bool,
}

impl WebResponder {
    pub fn new(
        frontend_url: impl Into<String>,
        cookie_name: impl Into<String>,
        secure: bool,
    ) -> Self {
        Self {
            frontend_url: frontend_url.into(),
            cookie_name: cookie_name.into(),
            secure,
        }
    }

    /// Response dropping the session cookie.
    pub fn logout(&self) -> Response {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .build();
        cookie.make_removal();

        self.redirect(CookieJar::new().add(cookie))
    }

    fn redirect(&self, jar: CookieJar) -> Response {
        (
            StatusCode::FOUND,
            [(header::LOCATION, self.frontend_url.clone())],
            jar,
        )
            .into_response()
    }
}

impl ClientResponder for WebResponder {
    fn respond(&self, token: &SessionToken) -> Response {
        let cookie = Cookie::build((self.cookie_name.clone(), token.as_str().to_owned()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax);

        self.redirect(CookieJar::new().add(cookie))
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_parse_client_kind() {
        assert_eq!("CLI".parse::<ClientKind>().unwrap(), ClientKind::Cli);
        assert_eq!("Web".parse::<ClientKind>().unwrap(), ClientKind::Web);

        for tag in ["", "cli", "web", "Flask", "invalid_entry"] {
            assert!(matches!(
                tag.parse::<ClientKind>(),
                Err(ServerError::UnknownClient)
            ));
        }
    }

    #[test]
    fn test_display_round_trip() {
        for kind in [ClientKind::Cli, ClientKind::Web] {
            assert_eq!(kind.to_string().parse::<ClientKind>().unwrap(), kind);
        }
    }

    #[tokio::test]
    async fn test_cli_page_embeds_token() {
        let response = CliResponder.respond(&SessionToken::from("a.b.c"));

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(r#"<textarea style="width:100%;height:200px;">a.b.c</textarea>"#));
    }

    #[test]
    fn test_web_sets_cookie_and_redirects() {
        let responder = WebResponder::new("http://localhost:8000/home", "session", false);
        let response = responder.respond(&SessionToken::from("a.b.c"));

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://localhost:8000/home"
        );
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session=a.b.c"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_web_logout_clears_cookie() {
        let responder = WebResponder::new("http://localhost:8000/", "session", true);
        let response = responder.logout();

        assert_eq!(response.status(), StatusCode::FOUND);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Secure"));
    }
}
