//! Server-side sessions and the admin gate.
//!
//! Session records live in memory and are addressed by a random token. The
//! browser only holds `token.signature`, where the signature is a hex
//! HMAC-SHA256 of the token under the configured secret, so a cookie cannot be
//! forged or pointed at someone else's session without the key. Session
//! records carry the admin flag and pending flash notices.
//!
//! A record is only created once a request has something to keep: a flash
//! notice or an admin login. Anonymous page views never touch the table.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "inventory_session";

/// Notice shown when a gated page is requested without an admin session.
pub const ACCESS_DENIED: &str = "Se requiere acceso de administrador";

/// Minimum seconds between two sweeps of expired records.
const PURGE_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct SessionRecord {
    is_admin: bool,
    flashes: Vec<String>,
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// In-memory session table shared by all requests.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionRecord>>,
    last_purge: Arc<AtomicI64>,
    secret: Arc<[u8]>,
    ttl: chrono::Duration,
    secure_cookie: bool,
}

impl SessionStore {
    /// Creates an empty store signing cookies with `secret`.
    pub fn new(secret: &[u8], ttl: chrono::Duration, secure_cookie: bool) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            last_purge: Arc::new(AtomicI64::new(Utc::now().timestamp())),
            secret: Arc::from(secret),
            ttl,
            secure_cookie,
        }
    }

    /// Starts a new session and returns its token.
    pub fn create(&self, is_admin: bool) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        self.purge_expired(now);
        self.sessions.insert(
            token.clone(),
            SessionRecord {
                is_admin,
                flashes: Vec::new(),
                expires_at: now + self.ttl,
            },
        );
        debug!(active = self.sessions.len(), is_admin, "Session created");
        token
    }

    /// Sweeps expired records, at most once per [`PURGE_INTERVAL_SECS`].
    fn purge_expired(&self, now: DateTime<Utc>) {
        let last = self.last_purge.load(Ordering::Relaxed);
        if now.timestamp() - last < PURGE_INTERVAL_SECS {
            return;
        }
        // Another request won the race and is sweeping.
        if self
            .last_purge
            .compare_exchange(last, now.timestamp(), Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let before = self.sessions.len();
        self.sessions.retain(|_, record| record.is_live(now));
        debug!(
            purged = before.saturating_sub(self.sessions.len()),
            "Expired sessions swept"
        );
    }

    /// Number of records currently held.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `token` names a live session. An expired one is removed.
    pub fn contains(&self, token: &str) -> bool {
        let now = Utc::now();
        let live = self.sessions.get(token).map(|record| record.is_live(now));
        match live {
            Some(true) => true,
            Some(false) => {
                self.sessions.remove(token);
                debug!("Session expired");
                false
            }
            None => false,
        }
    }

    /// Whether `token` names a live admin session.
    pub fn is_admin(&self, token: &str) -> bool {
        let now = Utc::now();
        self.sessions
            .get(token)
            .is_some_and(|record| record.is_admin && record.is_live(now))
    }

    /// Drops the admin flag from a session, keeping its flashes.
    pub fn revoke_admin(&self, token: &str) {
        if let Some(mut record) = self.sessions.get_mut(token) {
            record.is_admin = false;
        }
    }

    /// Ends a session.
    pub fn destroy(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Queues a notice for the next page render of this session.
    pub fn push_flash(&self, token: &str, message: impl Into<String>) {
        if let Some(mut record) = self.sessions.get_mut(token) {
            record.flashes.push(message.into());
        }
    }

    /// Returns and clears the queued notices.
    pub fn take_flashes(&self, token: &str) -> Vec<String> {
        self.sessions
            .get_mut(token)
            .map(|mut record| std::mem::take(&mut record.flashes))
            .unwrap_or_default()
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }

    /// The cookie value for `token`: `token.signature`.
    pub fn sign(&self, token: &str) -> String {
        let mut mac = self.mac();
        mac.update(token.as_bytes());
        format!("{token}.{}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Extracts the token from a signed cookie value, or `None` if the
    /// signature does not match.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (token, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        let mut mac = self.mac();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token.to_string())
    }

    /// A complete `Set-Cookie` header value carrying `token`.
    pub fn cookie_header(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.sign(token),
            self.ttl.num_seconds()
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Reads cookie `name` from the request headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find_map(|(key, value)| (key == name).then_some(value))
}

/// Compares two secrets without leaking where they differ.
pub fn password_matches(candidate: &str, expected: &str) -> bool {
    let lengths_equal = candidate.len().ct_eq(&expected.len());
    let max_len = candidate.len().max(expected.len());
    let mut a = vec![0u8; max_len];
    let mut b = vec![0xFFu8; max_len];
    a[..candidate.len()].copy_from_slice(candidate.as_bytes());
    b[..expected.len()].copy_from_slice(expected.as_bytes());
    (lengths_equal & a.ct_eq(&b)).into()
}

#[derive(Debug, Default)]
struct SessionSlot {
    token: Option<String>,
    /// Set when this request created the record the token points at.
    issued: bool,
}

/// Handle on the current request's session, installed by [`track_session`].
///
/// The record behind it is created lazily by [`CurrentSession::flash`] or
/// [`CurrentSession::promote`]; reads on an absent session see no admin flag
/// and no notices.
#[derive(Clone)]
pub struct CurrentSession {
    slot: Arc<Mutex<SessionSlot>>,
    store: SessionStore,
}

impl CurrentSession {
    fn new(store: SessionStore, token: Option<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(SessionSlot {
                token,
                issued: false,
            })),
            store,
        }
    }

    /// Token of a live record for this request, creating one if needed.
    fn ensure_token(&self, slot: &mut SessionSlot) -> String {
        if let Some(token) = slot.token.as_deref().filter(|t| self.store.contains(t)) {
            return token.to_string();
        }
        let token = self.store.create(false);
        slot.token = Some(token.clone());
        slot.issued = true;
        token
    }

    /// Whether this session is authenticated as admin.
    pub async fn is_admin(&self) -> bool {
        self.slot
            .lock()
            .await
            .token
            .as_deref()
            .is_some_and(|token| self.store.is_admin(token))
    }

    /// Queues a notice for the next page.
    pub async fn flash(&self, message: impl Into<String>) {
        let mut slot = self.slot.lock().await;
        let token = self.ensure_token(&mut slot);
        self.store.push_flash(&token, message);
    }

    /// Returns and clears the queued notices.
    pub async fn take_flashes(&self) -> Vec<String> {
        self.slot
            .lock()
            .await
            .token
            .as_deref()
            .map(|token| self.store.take_flashes(token))
            .unwrap_or_default()
    }

    /// Replaces this session with a fresh admin session. Pending notices
    /// carry over; the new cookie goes out with the response.
    pub async fn promote(&self) {
        let mut slot = self.slot.lock().await;
        let mut pending = Vec::new();
        if let Some(old) = slot.token.take() {
            pending = self.store.take_flashes(&old);
            self.store.destroy(&old);
        }
        let token = self.store.create(true);
        for message in pending {
            self.store.push_flash(&token, message);
        }
        slot.token = Some(token);
        slot.issued = true;
        info!("Admin session started");
    }

    /// Drops admin rights from this session.
    pub async fn logout(&self) {
        if let Some(token) = self.slot.lock().await.token.as_deref() {
            self.store.revoke_admin(token);
        }
        info!("Admin session ended");
    }

    /// The token to hand to the browser, if this request created one.
    async fn issued_token(&self) -> Option<String> {
        let slot = self.slot.lock().await;
        if slot.issued { slot.token.clone() } else { None }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| Error::Config {
                message: "session middleware is not installed".to_string(),
            })
    }
}

/// Extractor that only succeeds for admin sessions. Anyone else is sent back
/// to `/` with [`ACCESS_DENIED`] queued.
pub struct AdminSession(pub CurrentSession);

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let session = CurrentSession::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if session.is_admin().await {
            return Ok(Self(session));
        }
        debug!(path = %parts.uri.path(), "Rejected non-admin request");
        session.flash(ACCESS_DENIED).await;
        Err(Redirect::to("/").into_response())
    }
}

/// Middleware attaching a [`CurrentSession`] to every request. A cookie that
/// is absent, forged or expired leaves the session empty; if the handler then
/// creates one, its cookie is set on the response.
pub async fn track_session(
    State(store): State<SessionStore>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = cookie_value(request.headers(), SESSION_COOKIE)
        .and_then(|value| store.verify(value))
        .filter(|token| store.contains(token));

    let session = CurrentSession::new(store.clone(), existing);
    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    if let Some(token) = session.issued_token().await {
        if let Ok(value) = HeaderValue::from_str(&store.cookie_header(&token)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(&[7u8; 32], chrono::Duration::minutes(5), false)
    }

    #[test]
    fn test_sign_and_verify() {
        let store = store();
        let signed = store.sign("abc123");
        assert_eq!(store.verify(&signed).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_tampered_cookie_is_rejected() {
        let store = store();
        let signed = store.sign("abc123");
        let forged = signed.replacen("abc123", "abc124", 1);
        assert_eq!(store.verify(&forged), None);
        assert_eq!(store.verify("abc123"), None);
        assert_eq!(store.verify("abc123.nothex"), None);

        let other = SessionStore::new(&[8u8; 32], chrono::Duration::minutes(5), false);
        assert_eq!(other.verify(&signed), None);
    }

    #[test]
    fn test_password_matches() {
        assert!(password_matches("hunter2", "hunter2"));
        assert!(!password_matches("hunter", "hunter2"));
        assert!(!password_matches("hunter2x", "hunter2"));
        assert!(!password_matches("", "hunter2"));
    }

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; inventory_session=tok.sig"),
        );
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), Some("tok.sig"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_flashes_are_taken_once() {
        let store = store();
        let token = store.create(false);
        store.push_flash(&token, "hello");

        assert_eq!(store.take_flashes(&token), vec!["hello".to_string()]);
        assert!(store.take_flashes(&token).is_empty());
    }

    #[test]
    fn test_expired_session_is_absent() {
        let store = SessionStore::new(&[7u8; 32], chrono::Duration::seconds(-1), false);
        let token = store.create(true);

        assert!(!store.is_admin(&token));
        assert!(!store.contains(&token));
        assert_eq!(store.active_sessions(), 0);
    }

    #[test]
    fn test_expired_sessions_are_swept_periodically() {
        let store = SessionStore::new(&[7u8; 32], chrono::Duration::seconds(-1), false);
        for _ in 0..5 {
            store.create(false);
        }
        // Within the interval nothing is swept.
        assert_eq!(store.active_sessions(), 5);

        store.last_purge.store(0, Ordering::Relaxed);
        store.create(false);
        assert_eq!(store.active_sessions(), 1);
        assert!(store.last_purge.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_revoke_admin() {
        let store = store();
        let token = store.create(true);
        assert!(store.is_admin(&token));

        store.revoke_admin(&token);
        assert!(!store.is_admin(&token));
        assert!(store.contains(&token));
    }

    #[test]
    fn test_secure_flag() {
        let secure = SessionStore::new(&[7u8; 32], chrono::Duration::minutes(5), true);
        assert!(secure.cookie_header("t").ends_with("; Secure"));
        assert!(!store().cookie_header("t").contains("Secure"));
    }

    #[tokio::test]
    async fn test_reads_do_not_create_sessions() {
        let store = store();
        let session = CurrentSession::new(store.clone(), None);

        assert!(!session.is_admin().await);
        assert!(session.take_flashes().await.is_empty());
        session.logout().await;
        assert_eq!(store.active_sessions(), 0);
        assert_eq!(session.issued_token().await, None);
    }

    #[tokio::test]
    async fn test_flash_creates_session_on_demand() {
        let store = store();
        let session = CurrentSession::new(store.clone(), None);

        session.flash("hola").await;
        session.flash("adios").await;
        assert_eq!(store.active_sessions(), 1);

        let token = session.issued_token().await.unwrap();
        assert_eq!(store.take_flashes(&token), vec!["hola", "adios"]);
    }

    #[tokio::test]
    async fn test_existing_session_is_not_reissued() {
        let store = store();
        let token = store.create(false);
        let session = CurrentSession::new(store.clone(), Some(token.clone()));

        session.flash("hola").await;
        assert_eq!(session.issued_token().await, None);
        assert_eq!(store.take_flashes(&token), vec!["hola"]);
    }

    #[tokio::test]
    async fn test_promote_rotates_token_and_keeps_flashes() {
        let store = store();
        let old = store.create(false);
        store.push_flash(&old, "pendiente");
        let session = CurrentSession::new(store.clone(), Some(old.clone()));

        session.promote().await;
        let new = session.issued_token().await.unwrap();
        assert_ne!(new, old);
        assert!(!store.contains(&old));
        assert!(store.is_admin(&new));
        assert_eq!(session.take_flashes().await, vec!["pendiente"]);
        assert_eq!(store.active_sessions(), 1);
    }
}
