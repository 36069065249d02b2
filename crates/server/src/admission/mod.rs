//! Request admission: bot detection, rate limiting and temporary blocks.
//!
//! The [`AdmissionFilter`] runs before any path resolution. Its state lives
//! behind the [`AdmissionStore`] trait so tests can swap the on-disk
//! [`FileStore`] for a [`MemoryStore`], and time comes from a [`Clock`].

pub mod client_ip;
pub mod clock;
pub mod filter;
pub mod store;

pub use client_ip::client_ip;
pub use clock::{Clock, ManualClock, SystemClock};
pub use filter::{
    is_bot, is_suspicious, AdmissionError, AdmissionFilter, Decision, DenyReason, IncidentKind,
    RateLimit, RequestInfo,
};
pub use store::{
    AdmissionStore, BlockRecord, FileStore, Incident, IncidentStats, MemoryStore, RateWindow,
    StoreError,
};
