//! Sign-in widget shown in the header.
//!
//! The widget talks to an [`IdentityBackend`] from worker threads and reports
//! back through a notification callback, so provider latency never reaches the
//! UI thread. It has no access to the training session.

pub mod supabase;
pub mod test_backend;

use std::fmt;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use supabase::{SupabaseBackend, SupabaseConfig};
pub use test_backend::TestIdentityBackend;

pub const DEFAULT_APP_SLUG: &str = "micro-decision-trainer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// unix timestamp (seconds)
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Expired, or about to within a minute
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now.timestamp() > exp - 60,
            None => false,
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthChangeEvent,
    pub session: Option<AuthSession>,
}

pub type AuthListener = Box<dyn Fn(AuthChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OAuthProvider {
    Google,
}

/// Per-identity, per-application login counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub email: String,
    pub app: String,
    pub login_cnt: i64,
    pub last_login_ts: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Could not open browser: {0}")]
    Browser(String),

    #[error("OAuth callback error: {0}")]
    Callback(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Not signed in")]
    NotSignedIn,
}

/// Capabilities the widget needs from an identity provider and tracking store
pub trait IdentityBackend: Send + Sync + 'static {
    /// Current session, if any (restoring or refreshing a stored one)
    fn get_session(&self) -> Result<Option<AuthSession>, IdentityError>;

    /// Register a listener invoked on every sign-in, sign-out, and refresh
    fn on_auth_state_change(&self, listener: AuthListener);

    /// Run the provider's OAuth flow; listeners get `SignedIn` on success
    fn sign_in_with_oauth(&self, provider: OAuthProvider) -> Result<(), IdentityError>;

    /// End the session; listeners get `SignedOut`
    fn sign_out(&self) -> Result<(), IdentityError>;

    /// Increment the login counter for (email, app), inserting it at 1 when absent
    fn upsert_tracking_record(&self, email: &str, app: &str)
        -> Result<TrackingRecord, IdentityError>;
}

/// Notifications delivered back to the UI thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SessionResolved(Option<AuthUser>),
    AuthChanged(AuthChange),
    ActionFailed(String),
}

pub type Notify = Arc<dyn Fn(IdentityEvent) + Send + Sync>;

/// Record a login for `email`; failures are logged and dropped
pub fn track_login(backend: &dyn IdentityBackend, email: &str, app: &str) {
    match backend.upsert_tracking_record(email, app) {
        Ok(record) => info!(app, login_cnt = record.login_cnt, "login tracked"),
        Err(e) => warn!(error = %e, app, "error tracking user login"),
    }
}

pub struct IdentityWidget {
    backend: Option<Arc<dyn IdentityBackend>>,
    app_slug: String,
    user: Option<AuthUser>,
    loading: bool,
    signing_in: bool,
    status: Option<String>,
    notify: Option<Notify>,
}

impl fmt::Debug for IdentityWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityWidget")
            .field("enabled", &self.is_enabled())
            .field("app_slug", &self.app_slug)
            .field("user", &self.user)
            .field("loading", &self.loading)
            .field("signing_in", &self.signing_in)
            .field("status", &self.status)
            .finish()
    }
}

impl IdentityWidget {
    pub fn new(backend: Arc<dyn IdentityBackend>, app_slug: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            app_slug: app_slug.into(),
            user: None,
            loading: true,
            signing_in: false,
            status: None,
            notify: None,
        }
    }

    /// A widget with no provider; renders nothing and ignores actions
    pub fn disabled() -> Self {
        Self {
            backend: None,
            app_slug: DEFAULT_APP_SLUG.to_string(),
            user: None,
            loading: false,
            signing_in: false,
            status: None,
            notify: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// A browser sign-in is in flight
    pub fn is_signing_in(&self) -> bool {
        self.signing_in
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn app_slug(&self) -> &str {
        &self.app_slug
    }

    /// Subscribe to auth changes and resolve the initial session in the background
    pub fn start(&mut self, notify: Notify) {
        let Some(backend) = self.backend.clone() else {
            return;
        };

        self.loading = true;
        self.notify = Some(notify.clone());

        let listener_notify = notify.clone();
        backend.on_auth_state_change(Box::new(move |change| {
            listener_notify(IdentityEvent::AuthChanged(change));
        }));

        thread::spawn(move || {
            let user = match backend.get_session() {
                Ok(session) => session.map(|s| s.user),
                Err(e) => {
                    warn!(error = %e, "failed to resolve identity session");
                    None
                }
            };
            notify(IdentityEvent::SessionResolved(user));
        });
    }

    pub fn sign_in(&mut self) {
        if self.user.is_some() || self.loading || self.signing_in {
            return;
        }
        if self.run_action("sign in", |backend| {
            backend.sign_in_with_oauth(OAuthProvider::Google)
        }) {
            self.signing_in = true;
            self.status = Some("Waiting for browser sign-in...".to_string());
        }
    }

    pub fn sign_out(&mut self) {
        if self.user.is_none() {
            return;
        }
        self.run_action("sign out", |backend| backend.sign_out());
    }

    /// Run `action` on a worker thread; false when the widget was never started
    fn run_action<F>(&self, name: &'static str, action: F) -> bool
    where
        F: FnOnce(&dyn IdentityBackend) -> Result<(), IdentityError> + Send + 'static,
    {
        let (Some(backend), Some(notify)) = (self.backend.clone(), self.notify.clone()) else {
            return false;
        };

        thread::spawn(move || {
            if let Err(e) = action(backend.as_ref()) {
                warn!(error = %e, action = name, "identity action failed");
                notify(IdentityEvent::ActionFailed(format!("Could not {name}: {e}")));
            }
        });
        true
    }

    /// Apply a notification on the UI thread
    pub fn handle(&mut self, event: IdentityEvent) {
        match event {
            IdentityEvent::SessionResolved(user) => {
                self.user = user;
                self.loading = false;
            }
            IdentityEvent::AuthChanged(change) => {
                self.user = change.session.as_ref().map(|s| s.user.clone());
                self.loading = false;
                self.signing_in = false;
                self.status = None;
                info!(event = %change.event, signed_in = self.user.is_some(), "auth state changed");

                if change.event == AuthChangeEvent::SignedIn {
                    self.spawn_tracking();
                }
            }
            IdentityEvent::ActionFailed(message) => {
                self.signing_in = false;
                self.status = Some(message);
            }
        }
    }

    fn spawn_tracking(&self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let Some(email) = self.user.as_ref().and_then(|u| u.email.clone()) else {
            return;
        };
        let app = self.app_slug.clone();

        thread::spawn(move || track_login(backend.as_ref(), &email, &app));
    }
}
