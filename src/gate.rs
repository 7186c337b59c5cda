//! API key check and per-client rate limiting for preview API requests.
//!
//! The rate-limit table lives in process memory and starts empty on every
//! process start. It is only reachable through [`RequestGate::check`], which
//! performs the increment-and-check under one lock.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the API key directly.
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_PREFIX: &str = "Bearer ";

/// Identity used when a request carries no client address at all.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Table size above which expired entries are dropped when a new client
/// arrives.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    Key(String),
    Disabled,
}

impl AuthPolicy {
    /// A fresh random key, logged so the developer can use it.
    pub fn generated() -> Self {
        let key = Uuid::new_v4().simple().to_string();
        info!("No api_key configured, generated one for this run: {}", key);
        AuthPolicy::Key(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimitSettings {
    #[serde(alias = "maxRequests")]
    pub max_requests: u32,
    #[serde(alias = "windowMs")]
    pub window_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    /// Milliseconds since the epoch at which the window ends.
    pub reset_time: u64,
}

/// The parts of a request the gate looks at.
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    /// Header names are stored lowercased.
    headers: BTreeMap<String, String>,
    remote_addr: Option<String>,
}

impl GateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Key presented by the client, from `x-api-key` or a bearer token.
    pub fn presented_key(&self) -> Option<&str> {
        self.header(API_KEY_HEADER).or_else(|| {
            self.header("authorization")
                .and_then(|value| value.strip_prefix(BEARER_PREFIX))
                .map(str::trim)
        })
    }

    /// First `x-forwarded-for` hop, else the connection address.
    pub fn client_id(&self) -> String {
        self.header("x-forwarded-for")
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or(self.remote_addr.as_deref())
            .unwrap_or(UNKNOWN_CLIENT)
            .to_string()
    }
}

pub struct RequestGate {
    auth: AuthPolicy,
    rate_limit: Option<RateLimitSettings>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RequestGate {
    pub fn new(auth: AuthPolicy, rate_limit: Option<RateLimitSettings>) -> Self {
        Self {
            auth,
            rate_limit,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn auth(&self) -> &AuthPolicy {
        &self.auth
    }

    pub fn check(&self, request: &GateRequest) -> Result<(), ApiError> {
        self.check_at(request, now_ms())
    }

    /// Runs both checks as of `now` (milliseconds since the epoch).
    /// Auth runs first, so a rejected key never consumes quota.
    pub fn check_at(&self, request: &GateRequest, now: u64) -> Result<(), ApiError> {
        self.authenticate(request)?;
        if let Some(limits) = &self.rate_limit {
            self.consume(&request.client_id(), limits, now)?;
        }
        Ok(())
    }

    fn authenticate(&self, request: &GateRequest) -> Result<(), ApiError> {
        match &self.auth {
            AuthPolicy::Disabled => Ok(()),
            AuthPolicy::Key(expected) => match request.presented_key() {
                Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => Ok(()),
                Some(_) => {
                    warn!("Rejected request with an invalid API key");
                    Err(ApiError::Unauthorized)
                }
                None => {
                    debug!("Rejected request without an API key");
                    Err(ApiError::Unauthorized)
                }
            },
        }
    }

    fn consume(&self, client: &str, limits: &RateLimitSettings, now: u64) -> Result<(), ApiError> {
        let mut entries = self.entries.lock();
        let window_end = now.saturating_add(limits.window_ms);

        if entries.len() >= SWEEP_THRESHOLD && !entries.contains_key(client) {
            let before = entries.len();
            entries.retain(|_, e| now <= e.reset_time);
            debug!("Dropped {} expired rate-limit entries", before - entries.len());
        }

        let entry = entries
            .entry(client.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                reset_time: window_end,
            });

        if now > entry.reset_time {
            entry.count = 0;
            entry.reset_time = window_end;
        }

        if entry.count >= limits.max_requests {
            warn!(
                "Rate limit exceeded for {} ({} requests per {} ms)",
                client, limits.max_requests, limits.window_ms
            );
            return Err(ApiError::RateLimited {
                retry_after_ms: entry.reset_time.saturating_sub(now),
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Current entry for `client`, if any.
    pub fn entry(&self, client: &str) -> Option<RateLimitEntry> {
        self.entries.lock().get(client).copied()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn keyed() -> RequestGate {
        RequestGate::new(AuthPolicy::Key("secret".to_string()), None)
    }

    #[test]
    fn test_missing_key_is_unauthorized() {
        let gate = keyed();
        assert_eq!(gate.check(&GateRequest::new()), Err(ApiError::Unauthorized));
    }

    #[test]
    fn test_header_key_accepted() {
        let gate = keyed();
        let request = GateRequest::new().with_header("X-Api-Key", "secret");
        assert_eq!(gate.check(&request), Ok(()));
    }

    #[test]
    fn test_bearer_key_accepted() {
        let gate = keyed();
        let request = GateRequest::new().with_header("Authorization", "Bearer secret");
        assert_eq!(gate.check(&request), Ok(()));
        let wrong = GateRequest::new().with_header("Authorization", "Bearer nope");
        assert_eq!(gate.check(&wrong), Err(ApiError::Unauthorized));
        let not_bearer = GateRequest::new().with_header("Authorization", "secret");
        assert_eq!(gate.check(&not_bearer), Err(ApiError::Unauthorized));
    }

    #[test]
    fn test_disabled_auth() {
        let gate = RequestGate::new(AuthPolicy::Disabled, None);
        assert_eq!(gate.check(&GateRequest::new()), Ok(()));
    }

    #[test]
    fn test_rate_limit_window() {
        let limits = RateLimitSettings {
            max_requests: 3,
            window_ms: 1_000,
        };
        let gate = RequestGate::new(AuthPolicy::Disabled, Some(limits));
        let request = GateRequest::new().with_remote_addr("10.0.0.1");
        let start = 5_000;

        for i in 0..3 {
            assert_eq!(gate.check_at(&request, start + i), Ok(()));
        }
        assert!(matches!(
            gate.check_at(&request, start + 10),
            Err(ApiError::RateLimited { .. })
        ));

        let after = start + 1_001;
        assert_eq!(gate.check_at(&request, after), Ok(()));
        let entry = gate.entry("10.0.0.1").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_time, after + 1_000);
    }

    #[test]
    fn test_huge_window_saturates() {
        let limits = RateLimitSettings {
            max_requests: 1,
            window_ms: u64::MAX,
        };
        let gate = RequestGate::new(AuthPolicy::Disabled, Some(limits));
        let request = GateRequest::new().with_remote_addr("10.0.0.1");
        assert_eq!(gate.check_at(&request, 5_000), Ok(()));
        assert_eq!(gate.entry("10.0.0.1").unwrap().reset_time, u64::MAX);
        assert!(matches!(
            gate.check_at(&request, 6_000),
            Err(ApiError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_expired_entries_are_swept() {
        let limits = RateLimitSettings {
            max_requests: 5,
            window_ms: 100,
        };
        let gate = RequestGate::new(AuthPolicy::Disabled, Some(limits));
        for i in 0..SWEEP_THRESHOLD {
            let request = GateRequest::new().with_remote_addr(format!("10.0.{}.{}", i / 256, i % 256));
            assert_eq!(gate.check_at(&request, 0), Ok(()));
        }
        assert!(gate.entry("10.0.0.0").is_some());

        let late = GateRequest::new().with_remote_addr("192.168.0.1");
        assert_eq!(gate.check_at(&late, 1_000), Ok(()));
        assert!(gate.entry("10.0.0.0").is_none());
        assert_eq!(gate.entries.lock().len(), 1);
    }

    #[test]
    fn test_clients_counted_separately() {
        let limits = RateLimitSettings {
            max_requests: 1,
            window_ms: 1_000,
        };
        let gate = RequestGate::new(AuthPolicy::Disabled, Some(limits));
        let a = GateRequest::new().with_header("X-Forwarded-For", "1.1.1.1, 10.0.0.1");
        let b = GateRequest::new().with_remote_addr("2.2.2.2");
        assert_eq!(gate.check_at(&a, 0), Ok(()));
        assert_eq!(gate.check_at(&b, 0), Ok(()));
        assert!(gate.check_at(&a, 1).is_err());
        assert_eq!(gate.entry("1.1.1.1").unwrap().count, 1);
    }

    #[test]
    fn test_client_id_fallbacks() {
        assert_eq!(GateRequest::new().client_id(), UNKNOWN_CLIENT);
        assert_eq!(
            GateRequest::new().with_remote_addr("9.9.9.9").client_id(),
            "9.9.9.9"
        );
        assert_eq!(
            GateRequest::new()
                .with_remote_addr("9.9.9.9")
                .with_header("x-forwarded-for", " 8.8.8.8 ")
                .client_id(),
            "8.8.8.8"
        );
    }

    #[test]
    fn test_unauthorized_does_not_consume_quota() {
        let limits = RateLimitSettings {
            max_requests: 1,
            window_ms: 1_000,
        };
        let gate = RequestGate::new(AuthPolicy::Key("secret".to_string()), Some(limits));
        let bad = GateRequest::new().with_remote_addr("3.3.3.3");
        assert_eq!(gate.check_at(&bad, 0), Err(ApiError::Unauthorized));
        assert!(gate.entry("3.3.3.3").is_none());
        let good = bad.with_header(API_KEY_HEADER, "secret");
        assert_eq!(gate.check_at(&good, 0), Ok(()));
    }

    #[test]
    fn test_concurrent_requests_not_undercounted() {
        let limits = RateLimitSettings {
            max_requests: 50,
            window_ms: 60_000,
        };
        let gate = Arc::new(RequestGate::new(AuthPolicy::Disabled, Some(limits)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    let request = GateRequest::new().with_remote_addr("4.4.4.4");
                    (0..20)
                        .filter(|_| gate.check_at(&request, 100).is_ok())
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
        assert_eq!(gate.entry("4.4.4.4").unwrap().count, 50);
    }
}
