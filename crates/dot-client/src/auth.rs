//! Session management for the Dot API.
//!
//! A session is either the static API key used as a bearer, or a short-lived
//! bearer obtained by exchanging the API key at a token endpoint. Refreshes
//! are single-flight: concurrent callers that find the session missing or
//! expired wait for one exchange and share its outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::DotError;
use crate::clock::Clock;

/// Sessions are treated as expired this long before their stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// How the client proves its identity.
#[derive(Clone)]
pub enum Credentials {
    /// Send the API key itself as the bearer. Never expires locally.
    ApiKey(String),
    /// Exchange the API key for a short-lived bearer at `url`.
    Exchange { url: Url, api_key: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.write_str("ApiKey(***)"),
            Credentials::Exchange { url, .. } => f
                .debug_struct("Exchange")
                .field("url", &url.as_str())
                .field("api_key", &"***")
                .finish(),
        }
    }
}

/// Observable state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct Session {
    bearer: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| past_deadline(at, now))
    }
}

fn past_deadline(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at
        .checked_sub_signed(TimeDelta::seconds(EXPIRY_MARGIN_SECS))
        .is_none_or(|deadline| now >= deadline)
}

/// Absolute expiry for a token valid `secs` from `now`.
fn expiry_after(now: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>, DotError> {
    if secs < 0 {
        return Err(DotError::Auth(format!("invalid expiresIn {secs}: negative")));
    }
    TimeDelta::try_seconds(secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| DotError::Auth(format!("invalid expiresIn {secs}: out of range")))
}

/// A bearer handed to one request, tagged with the session it came from.
#[derive(Debug, Clone)]
pub(crate) struct Lease {
    pub(crate) bearer: String,
    pub(crate) generation: u64,
    /// Set when this lease came from replacing an expired or rejected session.
    pub(crate) reauthenticated: bool,
}

struct Slot {
    session: Option<Session>,
    /// Bumped every time a new session is installed.
    generation: u64,
    last_error: Option<DotError>,
}

impl Slot {
    fn valid_lease(&self, now: DateTime<Utc>) -> Option<Lease> {
        self.session
            .as_ref()
            .filter(|s| !s.is_expired(now))
            .map(|s| Lease {
                bearer: s.bearer.clone(),
                generation: self.generation,
                reauthenticated: false,
            })
    }
}

/// Phase and expiry, readable while an exchange holds the session lock.
#[derive(Debug, Clone, Copy)]
struct Observed {
    phase: AuthPhase,
    expires_at: Option<DateTime<Utc>>,
}

pub(crate) struct SessionManager {
    credentials: Credentials,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    slot: Mutex<Slot>,
    observed: std::sync::Mutex<Observed>,
    /// Completed exchange attempts, readable without the lock.
    attempts: AtomicU64,
}

impl SessionManager {
    pub(crate) fn new(
        credentials: Credentials,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            http,
            clock,
            slot: Mutex::new(Slot {
                session: None,
                generation: 0,
                last_error: None,
            }),
            observed: std::sync::Mutex::new(Observed {
                phase: AuthPhase::Unauthenticated,
                expires_at: None,
            }),
            attempts: AtomicU64::new(0),
        }
    }

    /// Current phase. An authenticated session past its expiry reads as `Expired`.
    pub(crate) fn phase(&self) -> AuthPhase {
        let observed = self.observed();
        match observed.phase {
            AuthPhase::Authenticated
                if observed
                    .expires_at
                    .is_some_and(|at| past_deadline(at, self.clock.now())) =>
            {
                AuthPhase::Expired
            }
            phase => phase,
        }
    }

    fn observed(&self) -> Observed {
        *self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, phase: AuthPhase, expires_at: Option<DateTime<Utc>>) {
        *self.observed.lock().unwrap_or_else(PoisonError::into_inner) =
            Observed { phase, expires_at };
    }

    fn set_phase(&self, phase: AuthPhase) {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner).phase = phase;
    }

    /// Bearer for the next request, authenticating first if needed.
    pub(crate) async fn lease(&self) -> Result<Lease, DotError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(lease) = slot.valid_lease(self.clock.now()) {
            return Ok(lease);
        }

        // Replacing an expired session is a re-authentication: its failures
        // are auth errors. A first authentication keeps transport errors.
        let expired = slot.session.is_some() || self.observed().phase == AuthPhase::Expired;
        let classify = |e: DotError| if expired { as_auth_error(e) } else { e };

        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = &slot.last_error {
                return Err(classify(err.clone()));
            }
        }
        if expired {
            tracing::debug!("Session expired, re-authenticating");
            self.set_phase(AuthPhase::Expired);
        }

        self.refresh_locked(&mut slot, expired).await.map_err(classify)
    }

    /// Replace the session that produced a rejected `generation`.
    ///
    /// When another caller already replaced it, the newer session is reused.
    /// Any failure here is reported as [`DotError::Auth`].
    pub(crate) async fn reauthenticate(&self, rejected: u64) -> Result<Lease, DotError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if slot.generation != rejected {
            if let Some(lease) = slot.valid_lease(self.clock.now()) {
                return Ok(lease);
            }
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = &slot.last_error {
                return Err(as_auth_error(err.clone()));
            }
        }

        slot.session = None;
        self.set_phase(AuthPhase::Expired);
        self.refresh_locked(&mut slot, true)
            .await
            .map_err(as_auth_error)
    }

    /// Drop the current session; the next request authenticates again.
    pub(crate) async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        slot.session = None;
        slot.last_error = None;
        self.observe(AuthPhase::Unauthenticated, None);
    }

    async fn refresh_locked(&self, slot: &mut Slot, is_retry: bool) -> Result<Lease, DotError> {
        let previous = self.observed().phase;
        self.set_phase(AuthPhase::Authenticating);

        let result = self.exchange().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(session) => {
                slot.generation += 1;
                let lease = Lease {
                    bearer: session.bearer.clone(),
                    generation: slot.generation,
                    reauthenticated: is_retry,
                };
                self.observe(AuthPhase::Authenticated, session.expires_at);
                slot.session = Some(session);
                slot.last_error = None;
                tracing::info!(generation = slot.generation, is_retry, "Session established");
                Ok(lease)
            }
            Err(e) => {
                tracing::warn!(error = %e, is_retry, "Authentication failed");
                self.set_phase(match previous {
                    AuthPhase::Unauthenticated => AuthPhase::Unauthenticated,
                    _ => AuthPhase::Expired,
                });
                slot.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn exchange(&self) -> Result<Session, DotError> {
        match &self.credentials {
            Credentials::ApiKey(key) => {
                if key.trim().is_empty() {
                    return Err(DotError::Auth("API key is empty".into()));
                }
                Ok(Session {
                    bearer: key.clone(),
                    expires_at: None,
                })
            }
            Credentials::Exchange { url, api_key } => {
                tracing::info!(url = %url, "Exchanging API key for a session token");
                let resp = self
                    .http
                    .post(url.clone())
                    .json(&ExchangeRequest { api_key })
                    .send()
                    .await?;
                let status = resp.status();
                let body = resp.text().await?;

                if !status.is_success() {
                    return Err(DotError::Auth(format!(
                        "credential exchange rejected (status {}): {body}",
                        status.as_u16()
                    )));
                }

                let token: TokenResponse = serde_json::from_str(&body)
                    .map_err(|e| DotError::Auth(format!("malformed token response: {e}")))?;
                if token.access_token.is_empty() {
                    return Err(DotError::Auth("token response has an empty accessToken".into()));
                }

                let expires_at = token
                    .expires_in
                    .map(|secs| expiry_after(self.clock.now(), secs))
                    .transpose()?;

                Ok(Session {
                    bearer: token.access_token,
                    expires_at,
                })
            }
        }
    }
}

fn as_auth_error(e: DotError) -> DotError {
    match e {
        DotError::Auth(_) => e,
        other => DotError::Auth(format!("re-authentication failed: {other}")),
    }
}
