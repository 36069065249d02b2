//! The per-request admission decision.
//!
//! Checks run in a fixed order and the first denial wins:
//!
//! 1. an active block record for the client
//! 2. bot-like user agents
//! 3. the sliding-window rate limit, which blocks the client on overflow
//! 4. suspicious request patterns, logged but allowed

use std::fmt;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clock::Clock;
use super::store::{AdmissionStore, BlockRecord, Incident, StoreError};
use crate::config::SecurityConfig;

/// User agent substrings that mark automated clients.
pub const BOT_PATTERNS: &[&str] = &[
    "bot", "crawler", "spider", "scraper", "curl", "wget", "python", "java", "go-http", "okhttp",
    "libwww", "httpie", "postman", "insomnia", "scrapy", "requests",
];

/// User agents shorter than this are treated as bots.
pub const MIN_USER_AGENT_LEN: usize = 10;

/// Query parameter names that indicate probing.
pub const SUSPICIOUS_PARAMS: &[&str] = &["cmd", "exec", "system", "eval", "shell", "passwd", "shadow"];

/// Script extensions that have no business in a listing URL.
pub const SUSPICIOUS_EXTENSIONS: &[&str] = &[".php", ".asp", ".jsp", ".py", ".sh", ".exe"];

/// Incident type as written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    BlockedIpAccessAttempt,
    BotDetected,
    RateLimitExceeded,
    SuspiciousRequest,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BlockedIpAccessAttempt => "BLOCKED_IP_ACCESS_ATTEMPT",
            Self::BotDetected => "BOT_DETECTED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousRequest => "SUSPICIOUS_REQUEST",
        };
        f.write_str(s)
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Blocked,
    Bot,
    RateLimited,
}

impl DenyReason {
    /// Message shown to the client.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Blocked => "Access denied",
            Self::Bot => "Bot detected",
            Self::RateLimited => "Rate limit exceeded",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("admission state unavailable: {0}")]
    Store(#[from] StoreError),
}

/// The parts of a request the filter looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub ip: String,
    pub user_agent: String,
    /// Path and query as sent by the client.
    pub uri: String,
    pub referer: String,
}

/// Rate limit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
    pub block_secs: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
            block_secs: 300,
        }
    }
}

impl From<&SecurityConfig> for RateLimit {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            max_requests: config.max_requests_per_minute,
            window_secs: config.rate_window_secs,
            block_secs: config.block_duration_secs,
        }
    }
}

/// Gate run in front of every route.
pub struct AdmissionFilter {
    limit: RateLimit,
    store: Arc<dyn AdmissionStore>,
    clock: Arc<dyn Clock>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl fmt::Debug for AdmissionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionFilter")
            .field("limit", &self.limit)
            .field("clock", &self.clock)
            .field("tracked_clients", &self.locks.len())
            .finish()
    }
}

impl AdmissionFilter {
    pub fn new(limit: RateLimit, store: Arc<dyn AdmissionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            store,
            clock,
            locks: DashMap::new(),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    pub fn store(&self) -> &Arc<dyn AdmissionStore> {
        &self.store
    }

    /// Decide whether `request` may proceed.
    ///
    /// Blocking file IO; call from a blocking context in async code.
    pub fn check(&self, request: &RequestInfo) -> Result<Decision, AdmissionError> {
        let lock = self.lock_for(&request.ip);
        let decision = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.decide(request)
        };
        drop(lock);
        // Only the map's own reference left: nobody is waiting on this client.
        self.locks
            .remove_if(&request.ip, |_, entry| Arc::strong_count(entry) == 1);
        decision
    }

    /// Number of clients with a check in flight.
    pub fn tracked_clients(&self) -> usize {
        self.locks.len()
    }

    fn decide(&self, request: &RequestInfo) -> Result<Decision, AdmissionError> {
        let now = self.clock.now();

        if let Some(record) = self.store.load_block(&request.ip)? {
            if record.is_active(now) {
                self.record(request, IncidentKind::BlockedIpAccessAttempt, now)?;
                return Ok(Decision::Deny(DenyReason::Blocked));
            }
            tracing::debug!("Block on {} expired at {}", request.ip, record.blocked_until);
            self.store.remove_block(&request.ip)?;
        }

        if is_bot(&request.user_agent) {
            self.record(request, IncidentKind::BotDetected, now)?;
            return Ok(Decision::Deny(DenyReason::Bot));
        }

        let mut window = self.store.load_window(&request.ip)?;
        window.prune(now, self.limit.window_secs);
        if window.len() >= self.limit.max_requests as usize {
            self.record(request, IncidentKind::RateLimitExceeded, now)?;
            let record = BlockRecord {
                ip: request.ip.clone(),
                blocked_at: now,
                blocked_until: now + self.limit.block_secs as i64,
                reason: DenyReason::RateLimited.message().to_string(),
            };
            self.store.save_block(&record)?;
            self.store.save_window(&request.ip, &window)?;
            tracing::warn!(
                "Blocked {} until {} after {} requests in {}s",
                request.ip,
                record.blocked_until,
                window.len(),
                self.limit.window_secs
            );
            return Ok(Decision::Deny(DenyReason::RateLimited));
        }
        window.record(now);
        self.store.save_window(&request.ip, &window)?;

        if is_suspicious(&request.uri) {
            self.record(request, IncidentKind::SuspiciousRequest, now)?;
        }

        Ok(Decision::Allow)
    }

    fn lock_for(&self, ip: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(ip.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn record(&self, request: &RequestInfo, kind: IncidentKind, now: i64) -> Result<(), StoreError> {
        tracing::info!("{} from {} ({})", kind, request.ip, request.uri);
        self.store.append_incident(&Incident {
            timestamp: format_local(now),
            ip: request.ip.clone(),
            kind,
            user_agent: request.user_agent.clone(),
            request_uri: request.uri.clone(),
            referer: request.referer.clone(),
        })
    }
}

/// Whether a user agent looks automated.
pub fn is_bot(user_agent: &str) -> bool {
    if user_agent.is_empty() || user_agent.len() < MIN_USER_AGENT_LEN {
        return true;
    }
    let lower = user_agent.to_lowercase();
    BOT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Whether a request URI looks like probing.
pub fn is_suspicious(uri: &str) -> bool {
    if uri.contains("..") || uri.contains("//") {
        return true;
    }

    if let Some((_, query)) = uri.split_once('?') {
        let probing = query
            .split('&')
            .map(|pair| pair.split_once('=').map_or(pair, |(name, _)| name))
            .any(|name| SUSPICIOUS_PARAMS.contains(&name));
        if probing {
            return true;
        }
    }

    let lower = uri.to_lowercase();
    SUSPICIOUS_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

fn format_local(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}
