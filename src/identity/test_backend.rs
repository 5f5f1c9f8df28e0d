use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::{
    AuthChange, AuthChangeEvent, AuthListener, AuthSession, IdentityBackend, IdentityError,
    OAuthProvider, TrackingRecord,
};

/// In-memory identity backend for tests and headless runs
#[derive(Default)]
pub struct TestIdentityBackend {
    session: Mutex<Option<AuthSession>>,
    next_sign_in: Mutex<Option<AuthSession>>,
    listeners: Mutex<Vec<AuthListener>>,
    records: Mutex<HashMap<(String, String), TrackingRecord>>,
    tracking_attempts: Mutex<usize>,
    sign_in_attempts: Mutex<usize>,
    fail_get_session: Mutex<bool>,
    fail_tracking: Mutex<bool>,
}

impl TestIdentityBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: AuthSession) -> Self {
        let backend = Self::default();
        *lock(&backend.session) = Some(session);
        backend
    }

    /// Session handed out by the next `sign_in_with_oauth`; without one the flow fails
    pub fn set_next_sign_in(&self, session: AuthSession) {
        *lock(&self.next_sign_in) = Some(session);
    }

    pub fn fail_get_session(&self, fail: bool) {
        *lock(&self.fail_get_session) = fail;
    }

    pub fn fail_tracking(&self, fail: bool) {
        *lock(&self.fail_tracking) = fail;
    }

    pub fn login_count(&self, email: &str, app: &str) -> Option<i64> {
        lock(&self.records)
            .get(&(email.to_string(), app.to_string()))
            .map(|r| r.login_cnt)
    }

    pub fn tracking_attempts(&self) -> usize {
        *lock(&self.tracking_attempts)
    }

    pub fn sign_in_attempts(&self) -> usize {
        *lock(&self.sign_in_attempts)
    }

    fn emit(&self, change: AuthChange) {
        for listener in lock(&self.listeners).iter() {
            listener(change.clone());
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl IdentityBackend for TestIdentityBackend {
    fn get_session(&self) -> Result<Option<AuthSession>, IdentityError> {
        if *lock(&self.fail_get_session) {
            return Err(IdentityError::Provider {
                status: 500,
                message: "session lookup failed".to_string(),
            });
        }
        Ok(lock(&self.session).clone())
    }

    fn on_auth_state_change(&self, listener: AuthListener) {
        lock(&self.listeners).push(listener);
    }

    fn sign_in_with_oauth(&self, _provider: OAuthProvider) -> Result<(), IdentityError> {
        *lock(&self.sign_in_attempts) += 1;
        let session = lock(&self.next_sign_in)
            .take()
            .ok_or_else(|| IdentityError::Callback("sign-in was cancelled".to_string()))?;

        *lock(&self.session) = Some(session.clone());
        self.emit(AuthChange {
            event: AuthChangeEvent::SignedIn,
            session: Some(session),
        });
        Ok(())
    }

    fn sign_out(&self) -> Result<(), IdentityError> {
        lock(&self.session).take().ok_or(IdentityError::NotSignedIn)?;
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
        *lock(&self.tracking_attempts) += 1;

        if *lock(&self.fail_tracking) {
            return Err(IdentityError::Provider {
                status: 503,
                message: "tracking store unavailable".to_string(),
            });
        }

        let mut records = lock(&self.records);
        let record = records
            .entry((email.to_string(), app.to_string()))
            .and_modify(|r| {
                r.login_cnt += 1;
                r.last_login_ts = Utc::now();
            })
            .or_insert_with(|| TrackingRecord {
                email: email.to_string(),
                app: app.to_string(),
                login_cnt: 1,
                last_login_ts: Utc::now(),
            });

        Ok(record.clone())
    }
}
