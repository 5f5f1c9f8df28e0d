//! Supabase identity backend.
//!
//! Sign-in uses the PKCE authorization code flow: the authorize page is opened
//! in the system browser and the provider redirects back to a loopback listener
//! with `?code=`, which is exchanged for a session. The session is kept in a
//! small JSON file so a restart does not require signing in again. Login
//! tracking goes through the PostgREST `user_tracking` table.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AuthChange, AuthChangeEvent, AuthListener, AuthSession, AuthUser, IdentityBackend,
    IdentityError, OAuthProvider, TrackingRecord,
};

const TRACKING_TABLE: &str = "rest/v1/user_tracking";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
const VERIFIER_LEN: usize = 64;

const CALLBACK_OK_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h2>Signed in!</h2><p>You can close this tab and return to the terminal.</p></body></html>";
const CALLBACK_ERR_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h2>Sign-in failed</h2><p>Return to the terminal for details.</p></body></html>";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub redirect_port: u16,
    /// where the signed-in session is kept between runs
    pub session_path: Option<PathBuf>,
}

impl SupabaseConfig {
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|ei| Utc::now().timestamp() + ei));

        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Deserialize)]
struct TrackingRow {
    login_cnt: i64,
}

pub struct SupabaseBackend {
    config: SupabaseConfig,
    http: Client,
    session: Mutex<Option<AuthSession>>,
    listeners: Mutex<Vec<AuthListener>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SupabaseBackend {
    pub fn new(config: SupabaseConfig) -> Result<Self, IdentityError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            config,
            http,
            session: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn with_keys(&self, request: RequestBuilder, bearer: &str) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        challenge: &str,
    ) -> Result<Url, IdentityError> {
        let url = Url::parse_with_params(
            &self.endpoint("auth/v1/authorize"),
            &[
                ("provider", provider.to_string()),
                ("redirect_to", self.config.redirect_uri()),
                ("code_challenge", challenge.to_string()),
                ("code_challenge_method", "s256".to_string()),
            ],
        )?;
        Ok(url)
    }

    pub fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession, IdentityError> {
        let request = self
            .http
            .post(self.endpoint("auth/v1/token"))
            .query(&[("grant_type", "pkce")])
            .json(&json!({ "auth_code": code, "code_verifier": verifier }));

        let response = check_status(self.with_keys(request, &self.config.anon_key).send()?)?;
        let token: TokenResponse = response.json()?;
        Ok(token.into_session())
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<AuthSession, IdentityError> {
        let request = self
            .http
            .post(self.endpoint("auth/v1/token"))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));

        let response = check_status(self.with_keys(request, &self.config.anon_key).send()?)?;
        let token: TokenResponse = response.json()?;
        Ok(token.into_session())
    }

    fn load_stored(&self) -> Option<AuthSession> {
        let path = self.config.session_path.as_ref()?;
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable stored session");
                None
            }
        }
    }

    fn store(&self, session: Option<AuthSession>) {
        if let Some(path) = &self.config.session_path {
            let result = match &session {
                Some(s) => write_session(path, s),
                None if path.exists() => std::fs::remove_file(path).map_err(IdentityError::from),
                None => Ok(()),
            };
            if let Err(e) = result {
                warn!(error = %e, path = %path.display(), "failed to update stored session");
            }
        }
        *lock(&self.session) = session;
    }

    fn emit(&self, change: AuthChange) {
        for listener in lock(&self.listeners).iter() {
            listener(change.clone());
        }
    }

    fn bearer(&self) -> String {
        lock(&self.session)
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone())
    }
}

impl IdentityBackend for SupabaseBackend {
    fn get_session(&self) -> Result<Option<AuthSession>, IdentityError> {
        let cached = lock(&self.session).clone();
        let Some(session) = cached.or_else(|| self.load_stored()) else {
            return Ok(None);
        };

        if !session.is_expired(Utc::now()) {
            *lock(&self.session) = Some(session.clone());
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            debug!("stored session expired without refresh token");
            self.store(None);
            return Ok(None);
        };

        match self.refresh(refresh_token) {
            Ok(fresh) => {
                self.store(Some(fresh.clone()));
                self.emit(AuthChange {
                    event: AuthChangeEvent::TokenRefreshed,
                    session: Some(fresh.clone()),
                });
                Ok(Some(fresh))
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, signing out locally");
                self.store(None);
                Ok(None)
            }
        }
    }

    fn on_auth_state_change(&self, listener: AuthListener) {
        lock(&self.listeners).push(listener);
    }

    fn sign_in_with_oauth(&self, provider: OAuthProvider) -> Result<(), IdentityError> {
        let verifier = generate_verifier(&mut rand::thread_rng());
        let challenge = code_challenge(&verifier);

        let listener = TcpListener::bind(("127.0.0.1", self.config.redirect_port))?;
        let url = self.authorize_url(provider, &challenge)?;

        webbrowser::open(url.as_str()).map_err(|e| IdentityError::Browser(e.to_string()))?;
        info!(%provider, "opened browser for sign-in");

        let code = wait_for_callback(&listener, CALLBACK_TIMEOUT)?;
        let session = self.exchange_code(&code, &verifier)?;

        self.store(Some(session.clone()));
        self.emit(AuthChange {
            event: AuthChangeEvent::SignedIn,
            session: Some(session),
        });
        Ok(())
    }

    fn sign_out(&self) -> Result<(), IdentityError> {
        let session = lock(&self.session).clone().ok_or(IdentityError::NotSignedIn)?;

        let request = self.http.post(self.endpoint("auth/v1/logout"));
        match self
            .with_keys(request, &session.access_token)
            .send()
            .map_err(IdentityError::from)
            .and_then(check_status)
        {
            Ok(_) => debug!("provider session revoked"),
            // the local session is dropped regardless
            Err(e) => warn!(error = %e, "provider logout failed"),
        }

        self.store(None);
        self.emit(AuthChange {
            event: AuthChangeEvent::SignedOut,
            session: None,
        });
        Ok(())
    }

    fn upsert_tracking_record(
        &self,
        email: &str,
        app: &str,
    ) -> Result<TrackingRecord, IdentityError> {
        let bearer = self.bearer();
        let table = self.endpoint(TRACKING_TABLE);
        let key = [
            ("email", format!("eq.{email}")),
            ("app", format!("eq.{app}")),
        ];

        let request = self
            .http
            .get(&table)
            .query(&key)
            .query(&[("select", "login_cnt")]);
        let existing: Vec<TrackingRow> = check_status(self.with_keys(request, &bearer).send()?)?.json()?;

        let now = Utc::now();
        let record = match existing.first() {
            Some(row) => {
                let record = TrackingRecord {
                    email: email.to_string(),
                    app: app.to_string(),
                    login_cnt: row.login_cnt + 1,
                    last_login_ts: now,
                };
                let request = self.http.patch(&table).query(&key).json(&json!({
                    "login_cnt": record.login_cnt,
                    "last_login_ts": record.last_login_ts,
                }));
                check_status(self.with_keys(request, &bearer).send()?)?;
                record
            }
            None => {
                let record = TrackingRecord {
                    email: email.to_string(),
                    app: app.to_string(),
                    login_cnt: 1,
                    last_login_ts: now,
                };
                let request = self.http.post(&table).json(&record);
                check_status(self.with_keys(request, &bearer).send()?)?;
                record
            }
        };

        Ok(record)
    }
}

/// Serialize before touching the file so a failure never leaves it truncated
fn write_session(path: &Path, session: &AuthSession) -> Result<(), IdentityError> {
    let bytes = serde_json::to_vec(session)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn check_status(response: Response) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().unwrap_or_default();
    Err(IdentityError::Provider {
        status: status.as_u16(),
        message,
    })
}

pub fn generate_verifier<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// S256 PKCE challenge for `verifier`
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Accept the provider redirect on `listener` and return the authorization code
pub fn wait_for_callback(listener: &TcpListener, timeout: Duration) -> Result<String, IdentityError> {
    let mut stream = accept_with_timeout(listener, timeout)?;

    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf)?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let result = parse_callback(&request);
    let page = if result.is_ok() {
        CALLBACK_OK_PAGE
    } else {
        CALLBACK_ERR_PAGE
    };
    stream.write_all(page.as_bytes())?;

    result
}

fn accept_with_timeout(listener: &TcpListener, timeout: Duration) -> Result<TcpStream, IdentityError> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;

    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(IdentityError::Callback(
                        "timed out waiting for the browser".to_string(),
                    ));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Pull `code` (or the provider's error) out of `GET /callback?... HTTP/1.1`
fn parse_callback(request: &str) -> Result<String, IdentityError> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| IdentityError::Callback("malformed request".to_string()))?;

    let url = Url::parse("http://127.0.0.1")?.join(target)?;

    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error_description" => error = Some(value.into_owned()),
            "error" if error.is_none() => error = Some(value.into_owned()),
            _ => {}
        }
    }

    match (code, error) {
        (Some(code), _) if !code.is_empty() => Ok(code),
        (_, Some(error)) => Err(IdentityError::Callback(error)),
        _ => Err(IdentityError::Callback("no code in callback".to_string())),
    }
}
