//! Mutual-authentication protocol for agent callbacks.
//!
//! The agent signs every request with
//! `HMAC-SHA256(secret, timestamp ‖ nonce ‖ METHOD ‖ path ‖ hex(sha256(body)))`
//! and sends the parts in `X-Agent-Timestamp`, `X-Agent-Nonce` and
//! `X-Agent-Signature`. Checks run in a fixed order: rate limit, header
//! presence, timestamp window, signature, nonce. The nonce is only spent
//! once the signature has been proven genuine.

use super::rate_limit::RequestLimiter;
use super::replay_cache::{NonceVerdict, ReplayStore};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const TIMESTAMP_HEADER: &str = "X-Agent-Timestamp";
pub const NONCE_HEADER: &str = "X-Agent-Nonce";
pub const SIGNATURE_HEADER: &str = "X-Agent-Signature";

pub const DEFAULT_TIMESTAMP_WINDOW_SECS: u64 = 60;

/// Why an agent request was turned away. Only the status code reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("agent secret not configured")]
    NotConfigured,
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("timestamp is not an integer")]
    InvalidTimestamp,
    #[error("timestamp outside the accepted window")]
    TimestampOutOfWindow,
    #[error("signature length mismatch")]
    SignatureLength,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("nonce already used")]
    Replayed,
    #[error("nonce cache at capacity")]
    NonceCapacity,
}

impl AuthRejection {
    pub fn status_code(self) -> u16 {
        match self {
            Self::RateLimited => 429,
            _ => 401,
        }
    }

    /// Server-side log reason.
    pub fn reason(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::NotConfigured => "agent_secret_not_configured",
            Self::MissingHeader(_) => "missing_header",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::TimestampOutOfWindow => "timestamp_out_of_window",
            Self::SignatureLength => "signature_length_mismatch",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Replayed => "nonce_replayed",
            Self::NonceCapacity => "nonce_capacity_exhausted",
        }
    }
}

/// The parts of an inbound request the protocol looks at.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub method: &'a str,
    /// Request path without query string.
    pub path: &'a str,
    pub body: &'a [u8],
    pub timestamp: Option<&'a str>,
    pub nonce: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Lowercase hex SHA-256 of the exact body bytes (empty body hashes the empty string).
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Lowercase hex HMAC over the canonical message.
pub fn compute_signature(
    secret: &[u8],
    timestamp: &str,
    nonce: &str,
    method: &str,
    path: &str,
    body: &[u8],
) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(timestamp.as_bytes());
    mac.update(nonce.as_bytes());
    mac.update(method.to_ascii_uppercase().as_bytes());
    mac.update(path.as_bytes());
    mac.update(body_digest(body).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Length check first, then a constant-time byte comparison.
fn signatures_match(expected: &str, supplied: &str) -> Result<(), AuthRejection> {
    if expected.len() != supplied.len() {
        return Err(AuthRejection::SignatureLength);
    }
    if bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
        Ok(())
    } else {
        Err(AuthRejection::SignatureMismatch)
    }
}

pub struct AgentAuthenticator {
    secret: Option<Zeroizing<Vec<u8>>>,
    timestamp_window_secs: u64,
    replay: Arc<dyn ReplayStore>,
    limiter: Arc<dyn RequestLimiter>,
}

impl AgentAuthenticator {
    pub fn new(
        secret: Option<&str>,
        timestamp_window_secs: u64,
        replay: Arc<dyn ReplayStore>,
        limiter: Arc<dyn RequestLimiter>,
    ) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| Zeroizing::new(s.as_bytes().to_vec())),
            timestamp_window_secs,
            replay,
            limiter,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Decide accept/reject for `request` from `caller` at `now` (epoch seconds).
    ///
    /// Rejections leave no trace: the nonce is recorded only on full acceptance.
    pub fn verify(
        &self,
        caller: &str,
        request: &AgentRequest<'_>,
        now: i64,
    ) -> Result<(), AuthRejection> {
        self.admit(caller)?;
        self.authenticate(request, now)
    }

    /// Rate-limit step alone. The gateway runs it before reading the body.
    pub fn admit(&self, caller: &str) -> Result<(), AuthRejection> {
        if self.limiter.check_and_record(caller) {
            Ok(())
        } else {
            Err(AuthRejection::RateLimited)
        }
    }

    /// Header, timestamp, signature and nonce checks for an admitted caller.
    pub fn authenticate(&self, request: &AgentRequest<'_>, now: i64) -> Result<(), AuthRejection> {
        let secret = self.secret.as_ref().ok_or(AuthRejection::NotConfigured)?;

        let timestamp = request
            .timestamp
            .ok_or(AuthRejection::MissingHeader(TIMESTAMP_HEADER))?;
        let nonce = request
            .nonce
            .filter(|n| !n.is_empty())
            .ok_or(AuthRejection::MissingHeader(NONCE_HEADER))?;
        let signature = request
            .signature
            .ok_or(AuthRejection::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| AuthRejection::InvalidTimestamp)?;
        if now.abs_diff(sent_at) > self.timestamp_window_secs {
            return Err(AuthRejection::TimestampOutOfWindow);
        }

        let expected = compute_signature(
            secret,
            timestamp,
            nonce,
            request.method,
            request.path,
            request.body,
        );
        signatures_match(&expected, signature)?;

        match self.replay.check_and_record(nonce) {
            NonceVerdict::Fresh => Ok(()),
            NonceVerdict::Replayed => Err(AuthRejection::Replayed),
            NonceVerdict::CapacityExhausted => Err(AuthRejection::NonceCapacity),
        }
    }
}

impl std::fmt::Debug for AgentAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentAuthenticator")
            .field("configured", &self.secret.is_some())
            .field("timestamp_window_secs", &self.timestamp_window_secs)
            .finish_non_exhaustive()
    }
}

/// Header values an agent attaches to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
}

/// Client half of the protocol, used by the `sign` command and tests.
pub struct AgentSigner {
    secret: Zeroizing<Vec<u8>>,
}

impl AgentSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Zeroizing::new(secret.as_bytes().to_vec()),
        }
    }

    pub fn sign(&self, method: &str, path: &str, body: &[u8]) -> SignedHeaders {
        self.sign_at(method, path, body, chrono::Utc::now().timestamp(), &random_nonce())
    }

    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: i64,
        nonce: &str,
    ) -> SignedHeaders {
        let timestamp = timestamp.to_string();
        let signature = compute_signature(&self.secret, &timestamp, nonce, method, path, body);
        SignedHeaders {
            timestamp,
            nonce: nonce.to_string(),
            signature,
        }
    }
}

fn random_nonce() -> String {
    use rand::RngCore;
    let mut buf = [0u8; 16];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
