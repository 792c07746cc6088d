//! Thin HTTP adapter over `AdminHandler`: `POST /<endpoint>` maps JSON to an
//! `AdminRequest` variant, dispatches, and serializes the `AdminResponse`.
//! Session handling mirrors the original's `flask_login` shape: a
//! `POST /login` form exchange sets a session cookie, an auth layer
//! redirects unauthenticated requests to `/login`, and `GET /logout` clears
//! the session — re-expressed over `axum` rather than a WSGI app.

use std::sync::{Arc, Mutex};

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::handler::AdminHandler;
use super::request::AdminRequest;

const SESSION_COOKIE: &str = "squeaknode_session";

struct SessionStore {
    tokens: Mutex<std::collections::HashSet<String>>,
}

impl SessionStore {
    fn new() -> Self {
        Self {
            tokens: Mutex::new(std::collections::HashSet::new()),
        }
    }

    fn issue(&self) -> String {
        let token = hex::encode(crate::crypto::generate_tweak());
        self.tokens.lock().unwrap().insert(token.clone());
        token
    }

    fn is_valid(&self, token: &str) -> bool {
        self.tokens.lock().unwrap().contains(token)
    }

    fn revoke(&self, token: &str) {
        self.tokens.lock().unwrap().remove(token);
    }
}

pub struct AdminServer {
    handler: Arc<AdminHandler>,
    sessions: Arc<SessionStore>,
    admin_username: String,
    admin_password_sha256: [u8; 32],
    login_disabled: bool,
}

impl AdminServer {
    pub fn new(
        handler: Arc<AdminHandler>,
        admin_username: impl Into<String>,
        admin_password: &str,
        login_disabled: bool,
    ) -> Self {
        Self {
            handler,
            sessions: Arc::new(SessionStore::new()),
            admin_username: admin_username.into(),
            admin_password_sha256: sha256_password(admin_password),
            login_disabled,
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        let protected = Router::new()
            .route("/:endpoint", post(dispatch))
            .route_layer(middleware::from_fn_with_state(self.clone(), require_session));

        Router::new()
            .route("/login", post(login))
            .route("/logout", get(logout))
            .merge(protected)
            .with_state(self)
    }
}

fn sha256_password(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(server): State<Arc<AdminServer>>, Form(form): Form<LoginForm>) -> Response {
    if form.username != server.admin_username || sha256_password(&form.password) != server.admin_password_sha256 {
        return (StatusCode::UNAUTHORIZED, "invalid username or password").into_response();
    }
    let token = server.sessions.issue();
    (
        [(header::SET_COOKIE, format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/"))],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response()
}

async fn logout(State(server): State<Arc<AdminServer>>, request: Request) -> Response {
    if let Some(token) = session_token(&request) {
        server.sessions.revoke(&token);
    }
    Redirect::to("/login").into_response()
}

fn session_token(request: &Request) -> Option<String> {
    let cookie_header = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').map(str::trim).find_map(|kv| {
        let (name, value) = kv.split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Mirrors `flask_login`'s `unauthorized_handler`: any request without a
/// valid session is redirected to `/login`, unless `login_disabled`.
async fn require_session(
    State(server): State<Arc<AdminServer>>,
    request: Request,
    next: Next,
) -> Response {
    if server.login_disabled {
        return next.run(request).await;
    }
    match session_token(&request) {
        Some(token) if server.sessions.is_valid(&token) => next.run(request).await,
        _ => Redirect::to("/login").into_response(),
    }
}

/// The `:endpoint` path segment exists for wire-route readability (and to
/// match the original `POST /<endpoint>` shape); the JSON body's `endpoint`
/// tag is what actually selects the `AdminRequest` variant via serde.
async fn dispatch(State(server): State<Arc<AdminServer>>, Json(req): Json<AdminRequest>) -> Response {
    match server.handler.handle(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_deterministic() {
        assert_eq!(sha256_password("hunter2"), sha256_password("hunter2"));
        assert_ne!(sha256_password("hunter2"), sha256_password("hunter3"));
    }

    #[test]
    fn session_store_issue_and_revoke() {
        let store = SessionStore::new();
        let token = store.issue();
        assert!(store.is_valid(&token));
        store.revoke(&token);
        assert!(!store.is_valid(&token));
    }
}
