//! Domain library for the URL Shortener.
//!
//! Holds the domain types, ports (traits), and error definitions shared by
//! every app and adapter. Keep adapters and IO concerns out of this crate.

use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

/// Category stored when enrichment is unavailable or returned nothing.
pub const DEFAULT_CATEGORY: &str = "기타";
/// Summary stored when enrichment is unavailable or returned nothing.
pub const DEFAULT_SUMMARY: &str = "분석 없음";

/// Public-facing identifier of a shortened URL, over the base62 alphabet.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    /// Validate untrusted input (a path segment, a CLI argument).
    pub fn parse<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        let val = val.trim();
        if val.is_empty() {
            return Err(CoreError::Validation("short code is required".into()));
        }
        if let Some((position, symbol)) = val
            .chars()
            .enumerate()
            .find(|(_, c)| base62::index_of(*c).is_none())
        {
            return Err(CoreError::InvalidSymbol { symbol, position });
        }
        Ok(Self(val.to_string()))
    }

    /// Derive the code for a freshly allocated identifier.
    pub fn from_id(id: u64) -> Self {
        Self(base62::encode(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored association between a short code and its original URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingRecord {
    pub short_code: ShortCode,
    pub original_url: String,
    pub category: String,
    pub summary: String,
    pub created_at: SystemTime,
}

/// Metadata derived from a URL by the enrichment service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Enrichment {
    pub category: String,
    pub summary: String,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            summary: DEFAULT_SUMMARY.to_string(),
        }
    }
}

/// One redirect served, kept for trend statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickEvent {
    pub short_code: ShortCode,
    pub clicked_at: SystemTime,
    pub category: String,
    pub source_ip: String,
}

/// Request-side facts about a visit, supplied by the HTTP layer.
#[derive(Clone, Debug, Default)]
pub struct Visit {
    pub source_ip: Option<String>,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Persisted counters supporting a single atomic increment.
///
/// Implementations must perform the read-modify-write as one atomic
/// operation against the backing store. The first increment of an unknown
/// key returns 1.
pub trait CounterStore: Send + Sync {
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError>;
}

/// Repository port for mapping records, keyed by the literal short code.
pub trait MappingRepository: Send + Sync {
    /// Insert a new record. An existing code yields `CoreError::AlreadyExists`.
    fn put_record(&self, record: MappingRecord) -> Result<(), CoreError>;
    fn get_record(&self, code: &ShortCode) -> Result<Option<MappingRecord>, CoreError>;
}

/// Repository port for click analytics.
pub trait ClickRepository: Send + Sync {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError>;
    /// Clicks strictly newer than `since`, in no particular order.
    fn clicks_since(&self, since: SystemTime) -> Result<Vec<ClickEvent>, CoreError>;
}

/// Optional, best-effort URL classification.
pub trait Enricher: Send + Sync {
    fn classify(&self, url: &str) -> Result<Enrichment, CoreError>;
}

impl<T: CounterStore + ?Sized> CounterStore for &T {
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError> {
        (**self).atomic_increment(key)
    }
}

impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError> {
        (**self).atomic_increment(key)
    }
}

impl<T: MappingRepository + ?Sized> MappingRepository for Arc<T> {
    fn put_record(&self, record: MappingRecord) -> Result<(), CoreError> {
        (**self).put_record(record)
    }

    fn get_record(&self, code: &ShortCode) -> Result<Option<MappingRecord>, CoreError> {
        (**self).get_record(code)
    }
}

impl<T: ClickRepository + ?Sized> ClickRepository for Arc<T> {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        (**self).record_click(event)
    }

    fn clicks_since(&self, since: SystemTime) -> Result<Vec<ClickEvent>, CoreError> {
        (**self).clicks_since(since)
    }
}

impl<T: Enricher + ?Sized> Enricher for Arc<T> {
    fn classify(&self, url: &str) -> Result<Enrichment, CoreError> {
        (**self).classify(url)
    }
}

/// Core domain errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("resource already exists")]
    AlreadyExists,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("conditional update failed: {0}")]
    ConditionalUpdateFailed(String),
    #[error("invalid symbol {symbol:?} at position {position}")]
    InvalidSymbol { symbol: char, position: usize },
    #[error("code does not fit in 64 bits")]
    CodeOverflow,
    #[error("enrichment failed: {0}")]
    EnrichmentFailed(String),
}

impl CoreError {
    /// Errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::InvalidSymbol { .. } | CoreError::CodeOverflow
        )
    }
}

pub mod adapters;
pub mod allocator;
pub mod base62;
pub mod enrich;
pub mod service;
pub mod trend;
pub mod validate;
