use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::{
    ClickEvent, ClickRepository, CoreError, CounterStore, MappingRecord, MappingRepository,
    ShortCode,
};

/// In-memory store implementing every port, for tests and the local server.
///
/// Each map sits behind its own mutex; the counter increment holds its lock
/// for the whole read-modify-write.
pub struct InMemoryRepo {
    counters: Mutex<HashMap<String, u64>>,
    records: Mutex<BTreeMap<String, MappingRecord>>,
    clicks: Mutex<Vec<ClickEvent>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            records: Mutex::new(BTreeMap::new()),
            clicks: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every recorded click, oldest first.
    pub fn all_clicks(&self) -> Vec<ClickEvent> {
        self.clicks.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, CoreError> {
    m.lock()
        .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))
}

impl CounterStore for InMemoryRepo {
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError> {
        let mut counters = lock(&self.counters)?;
        let value = counters.entry(key.to_string()).or_insert(0);
        *value = value
            .checked_add(1)
            .ok_or_else(|| CoreError::ConditionalUpdateFailed(format!("counter {key} exhausted")))?;
        Ok(*value)
    }
}

impl MappingRepository for InMemoryRepo {
    fn put_record(&self, record: MappingRecord) -> Result<(), CoreError> {
        let mut map = lock(&self.records)?;
        let key = record.short_code.as_str().to_string();
        if map.contains_key(&key) {
            return Err(CoreError::AlreadyExists);
        }
        map.insert(key, record);
        Ok(())
    }

    fn get_record(&self, code: &ShortCode) -> Result<Option<MappingRecord>, CoreError> {
        let map = lock(&self.records)?;
        Ok(map.get(code.as_str()).cloned())
    }
}

impl ClickRepository for InMemoryRepo {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        lock(&self.clicks)?.push(event);
        Ok(())
    }

    fn clicks_since(&self, since: SystemTime) -> Result<Vec<ClickEvent>, CoreError> {
        let clicks = lock(&self.clicks)?;
        Ok(clicks
            .iter()
            .filter(|c| c.clicked_at > since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mk_record(code: &str) -> MappingRecord {
        MappingRecord {
            short_code: ShortCode::parse(code).unwrap(),
            original_url: "https://example.com".to_string(),
            category: "IT".into(),
            summary: "x".into(),
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let repo = InMemoryRepo::new();
        let rec = mk_record("abc");
        repo.put_record(rec.clone()).unwrap();
        let got = repo.get_record(&rec.short_code).unwrap().unwrap();
        assert_eq!(got, rec);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let repo = InMemoryRepo::new();
        repo.put_record(mk_record("aB")).unwrap();
        assert!(repo
            .get_record(&ShortCode::parse("Ab").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn put_rejects_duplicate() {
        let repo = InMemoryRepo::new();
        repo.put_record(mk_record("dup")).unwrap();
        let err = repo.put_record(mk_record("dup")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn counter_starts_at_one() {
        let repo = InMemoryRepo::new();
        assert_eq!(repo.atomic_increment("k").unwrap(), 1);
        assert_eq!(repo.atomic_increment("k").unwrap(), 2);
    }

    #[test]
    fn clicks_since_is_exclusive() {
        let repo = InMemoryRepo::new();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        for secs in [99, 100, 101] {
            repo.record_click(ClickEvent {
                short_code: ShortCode::from_id(1),
                clicked_at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
                category: "IT".into(),
                source_ip: "unknown".into(),
            })
            .unwrap();
        }
        let got = repo.clicks_since(t0).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(repo.all_clicks().len(), 3);
    }
}
