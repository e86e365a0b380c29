/*
[INPUT]:  REST collaborator, session key endpoint, validity/renewal timings
[OUTPUT]: Cached session key plus a background renewal task
[POS]:    Auth layer - listenKey minting, caching and keepalive
[UPDATE]: When changing renewal cadence or key storage strategy
*/

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::rest::RestCollaborator;

/// Session key lifetimes
#[derive(Debug, Clone)]
pub struct SessionKeyConfig {
    /// How long a freshly minted or renewed key stays usable
    pub validity: Duration,
    /// Keepalive cadence, shorter than `validity`
    pub renewal_interval: Duration,
}

impl Default for SessionKeyConfig {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(30 * 60),
            renewal_interval: Duration::from_secs(25 * 60),
        }
    }
}

/// REST endpoint that mints (POST) and renews (PUT) session keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeyEndpoint {
    pub path: &'static str,
    /// Spot renewals name the key in the query; futures renew the caller's key implicitly.
    pub renew_with_key_param: bool,
}

impl SessionKeyEndpoint {
    pub const SPOT: SessionKeyEndpoint = SessionKeyEndpoint {
        path: "/api/v3/userDataStream",
        renew_with_key_param: true,
    };

    pub const FUTURES: SessionKeyEndpoint = SessionKeyEndpoint {
        path: "/fapi/v1/listenKey",
        renew_with_key_param: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKeyState {
    NoKey,
    Valid,
    Expired,
}

/// Stored session key with its expiry
#[derive(Debug, Clone)]
pub struct SessionKey {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Instant,
}

impl SessionKey {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

#[derive(Debug)]
struct RenewalTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Thread-safe session key manager.
///
/// At most one renewal task runs at a time. The task exits on its own once the
/// supplied predicate reports no private subscriptions remain.
#[derive(Debug)]
pub struct SessionKeyManager {
    rest: Arc<dyn RestCollaborator>,
    endpoint: SessionKeyEndpoint,
    config: SessionKeyConfig,
    key: RwLock<Option<SessionKey>>,
    renewal: Mutex<Option<RenewalTask>>,
}

impl SessionKeyManager {
    pub fn new(
        rest: Arc<dyn RestCollaborator>,
        endpoint: SessionKeyEndpoint,
        config: SessionKeyConfig,
    ) -> Self {
        Self {
            rest,
            endpoint,
            config,
            key: RwLock::new(None),
            renewal: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionKeyState {
        let guard = self.key.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            None => SessionKeyState::NoKey,
            Some(key) if key.is_expired() => SessionKeyState::Expired,
            Some(_) => SessionKeyState::Valid,
        }
    }

    /// Current token, valid or not
    pub fn current(&self) -> Option<String> {
        let guard = self.key.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|key| key.token.clone())
    }

    /// Return the cached token while valid, otherwise mint a new one.
    pub async fn acquire(&self) -> Result<String> {
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }
        if !self.rest.has_credentials() {
            return Err(StreamError::AuthRequired);
        }

        let body = self
            .rest
            .authenticated_request(Method::POST, self.endpoint.path, &[], &[])
            .await
            .map_err(|err| match err {
                StreamError::AuthRequired => StreamError::AuthRequired,
                other => StreamError::SessionKey(format!("mint failed: {other}")),
            })?;
        let response: ListenKeyResponse = serde_json::from_slice(&body)
            .map_err(|err| StreamError::SessionKey(format!("unexpected mint response: {err}")))?;

        let key = SessionKey {
            token: response.listen_key,
            issued_at: Utc::now(),
            expires_at: Instant::now() + self.config.validity,
        };
        let token = key.token.clone();
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = Some(key);

        info!(endpoint = self.endpoint.path, "session key minted");
        Ok(token)
    }

    /// Extend the current key by one validity window.
    pub async fn renew(&self) -> Result<()> {
        let token = self
            .current()
            .ok_or_else(|| StreamError::SessionKey("no session key to renew".to_string()))?;

        let params: Vec<(&str, &str)> = if self.endpoint.renew_with_key_param {
            vec![("listenKey", token.as_str())]
        } else {
            Vec::new()
        };
        self.rest
            .authenticated_request(Method::PUT, self.endpoint.path, &params, &[])
            .await
            .map_err(|err| StreamError::SessionKey(format!("renewal failed: {err}")))?;

        let mut guard = self.key.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = guard.as_mut().filter(|key| key.token == token) {
            key.expires_at = Instant::now() + self.config.validity;
        }
        debug!(endpoint = self.endpoint.path, "session key renewed");
        Ok(())
    }

    /// Forget the cached key; the next `acquire` mints a fresh one.
    pub fn invalidate(&self) {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Spawn the renewal task unless one is already running.
    ///
    /// Returns `true` when a new task was started.
    pub fn start_renewal<F>(self: &Arc<Self>, has_private: F) -> bool
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let mut guard = self.renewal.lock().unwrap_or_else(PoisonError::into_inner);
        if guard
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished() && !task.cancel.is_cancelled())
        {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(renewal_loop(
            Arc::downgrade(self),
            self.config.renewal_interval,
            cancel.clone(),
            has_private,
        ));
        *guard = Some(RenewalTask { cancel, handle });
        debug!(
            interval_secs = self.config.renewal_interval.as_secs(),
            "session key renewal started"
        );
        true
    }

    /// Stop the renewal task if one is running.
    pub fn stop_renewal(&self) {
        let task = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.cancel.cancel();
            debug!("session key renewal stopped");
        }
    }

    pub fn is_renewing(&self) -> bool {
        let guard = self.renewal.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished() && !task.cancel.is_cancelled())
    }

    fn valid_token(&self) -> Option<String> {
        let guard = self.key.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|key| !key.is_expired())
            .map(|key| key.token.clone())
    }
}

impl Drop for SessionKeyManager {
    fn drop(&mut self) {
        self.stop_renewal();
    }
}

async fn renewal_loop<F>(
    manager: Weak<SessionKeyManager>,
    period: Duration,
    cancel: CancellationToken,
    has_private: F,
) where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !has_private() {
                    debug!("no private subscriptions left, renewal exiting");
                    break;
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                // Failures are retried on the next tick.
                if let Err(err) = manager.renew().await {
                    warn!(error = %err, "session key renewal failed");
                }
            }
        }
    }
}
