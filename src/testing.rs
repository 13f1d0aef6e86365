//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::broker::Broker;
use crate::error::{AuthError, BrokerError, FetchError};
use crate::fetch::{CredentialExchange, DeviceApi};
use crate::session::IdentityProvider;
use crate::signal::Signals;
use crate::types::{BridgeSignal, Credentials, Session, TemporaryCredentials};

pub fn session(id_token: &str) -> Session {
    Session {
        id_token: id_token.to_string(),
        access_token: format!("{id_token}-access"),
        refresh_token: format!("{id_token}-refresh"),
        expires_at: None,
    }
}

/// Counts attempts; session tokens are named after the attempt number.
#[derive(Default)]
pub struct FakeIdentity {
    logins: AtomicUsize,
    refreshes: AtomicUsize,
    fail_login: AtomicBool,
    fail_refresh: AtomicBool,
}

impl FakeIdentity {
    pub fn credentials() -> Credentials {
        Credentials {
            username: "owner@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fail_login(&self, fail: bool) {
        self.fail_login.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_login.load(Ordering::SeqCst) || credentials != &Self::credentials() {
            return Err(AuthError::InvalidCredentials("rejected".into()));
        }
        Ok(Session {
            id_token: format!("login-{n}-id"),
            access_token: format!("login-{n}-access"),
            refresh_token: format!("login-{n}-refresh"),
            expires_at: None,
        })
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::InvalidCredentials("refresh token expired".into()));
        }
        Ok(Session {
            id_token: format!("refreshed-{n}-id"),
            access_token: format!("refreshed-{n}-access"),
            refresh_token: session.refresh_token.clone(),
            expires_at: None,
        })
    }
}

#[derive(Default)]
pub struct FakeExchange {
    seen: Mutex<Vec<String>>,
    rejections: AtomicUsize,
}

impl FakeExchange {
    /// The next `count` exchanges fail with `NotAuthorized`.
    pub fn reject_next(&self, count: usize) {
        self.rejections.store(count, Ordering::SeqCst);
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialExchange for FakeExchange {
    async fn credentials_for_identity(&self, id_token: &str) -> Result<TemporaryCredentials, FetchError> {
        self.seen.lock().unwrap().push(id_token.to_string());
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(FetchError::NotAuthorized("Invalid login token".into()));
        }
        Ok(TemporaryCredentials {
            access_key_id: format!("AKID-{id_token}"),
            secret_key: "secret".to_string(),
            session_token: "session".to_string(),
        })
    }
}

/// Serves queued results first, then the default body.
pub struct FakeDeviceApi {
    default_body: Mutex<Vec<u8>>,
    queued: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
    calls: AtomicUsize,
    on_fetch: Mutex<Option<(Arc<Signals>, BridgeSignal, usize)>>,
}

impl FakeDeviceApi {
    pub fn with_body(body: &[u8]) -> Self {
        FakeDeviceApi {
            default_body: Mutex::new(body.to_vec()),
            queued: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            on_fetch: Mutex::new(None),
        }
    }

    pub fn set_body(&self, body: &[u8]) {
        *self.default_body.lock().unwrap() = body.to_vec();
    }

    pub fn push_result(&self, result: Result<Vec<u8>, FetchError>) {
        self.queued.lock().unwrap().push_back(result);
    }

    /// Raises `signal` `times` times from inside the next fetch.
    pub fn signal_during_next_fetch(&self, signals: Arc<Signals>, signal: BridgeSignal, times: usize) {
        *self.on_fetch.lock().unwrap() = Some((signals, signal, times));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceApi for FakeDeviceApi {
    async fn fetch_devices(&self, _credentials: &TemporaryCredentials) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.on_fetch.lock().unwrap().take();
        if let Some((signals, signal, times)) = hook {
            for _ in 0..times {
                signals.raise(signal.clone());
            }
        }
        let queued = self.queued.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => Ok(self.default_body.lock().unwrap().clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    failing_topics: Mutex<Vec<String>>,
}

impl RecordingBroker {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|p| p.topic).collect()
    }

    pub fn last(&self) -> Option<Published> {
        self.published.lock().unwrap().last().cloned()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().push(topic.to_string());
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BrokerError> {
        if self.failing_topics.lock().unwrap().iter().any(|t| t == topic) {
            return Err(BrokerError("request channel closed".into()));
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), BrokerError> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }
}
