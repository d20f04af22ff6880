use crate::allocator::{SequenceAllocator, DEFAULT_COUNTER};
use crate::enrich::classify_or_default;
use crate::validate::validate_original_url;
use crate::{
    ClickEvent, ClickRepository, Clock, CoreError, CounterStore, Enricher, MappingRecord,
    MappingRepository, ShortCode, Visit,
};

/// Application service orchestrating creation and resolution of short codes.
///
/// Generic over the store, the enricher and the clock; the store is injected
/// so tests can run against the in-memory adapter.
pub struct LinkService<R, E, C>
where
    R: CounterStore + MappingRepository + ClickRepository,
    E: Enricher,
    C: Clock,
{
    repo: R,
    enricher: E,
    clock: C,
    counter: String,
}

impl<R, E, C> LinkService<R, E, C>
where
    R: CounterStore + MappingRepository + ClickRepository,
    E: Enricher,
    C: Clock,
{
    pub fn new(repo: R, enricher: E, clock: C) -> Self {
        Self {
            repo,
            enricher,
            clock,
            counter: DEFAULT_COUNTER.to_string(),
        }
    }

    /// Allocate identifiers from `counter` instead of the default key.
    pub fn with_counter(mut self, counter: impl Into<String>) -> Self {
        self.counter = counter.into();
        self
    }

    /// Create a new short code for `url`.
    ///
    /// The identifier is allocated before encoding and is not returned to the
    /// pool if persisting fails. Enrichment never aborts the creation.
    pub fn create(&self, url: &str) -> Result<MappingRecord, CoreError> {
        let url = validate_original_url(url)?;

        let id = SequenceAllocator::new(&self.repo).next(&self.counter)?;
        let short_code = ShortCode::from_id(id);

        let enrichment = classify_or_default(&self.enricher, url);

        let record = MappingRecord {
            short_code,
            original_url: url.to_string(),
            category: enrichment.category,
            summary: enrichment.summary,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.repo.put_record(record.clone()) {
            tracing::error!(id, short_code = %record.short_code, err = %e, "mapping write failed; identifier left unused");
            return Err(e);
        }
        tracing::info!(id, short_code = %record.short_code, "short code created");
        Ok(record)
    }

    /// Look up the mapping record stored under `code`.
    pub fn resolve(&self, code: &ShortCode) -> Result<MappingRecord, CoreError> {
        self.repo.get_record(code)?.ok_or(CoreError::NotFound)
    }

    /// Resolve `code` and log the click. Logging is best-effort.
    pub fn redirect(&self, code: &ShortCode, visit: &Visit) -> Result<MappingRecord, CoreError> {
        let record = self.resolve(code)?;
        let event = ClickEvent {
            short_code: record.short_code.clone(),
            clicked_at: self.clock.now(),
            category: record.category.clone(),
            source_ip: visit
                .source_ip
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        };
        if let Err(e) = self.repo.record_click(event) {
            tracing::warn!(short_code = %code, err = %e, "click log failed");
        }
        Ok(record)
    }

    /// Access the underlying store, e.g. for trend queries.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
