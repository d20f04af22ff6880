//! DynamoDB adapter implementing the domain storage ports.
//!
//! - Mapping records live in the mapping table with primary key `shortCode`.
//! - Counters live in the counter table, one item per `counter_name`, value
//!   in `last_id`.
//! - Click events go to an optional log table; without one, clicks are
//!   dropped and trend queries see nothing.
//!
//! Notes:
//! - The domain ports are synchronous. We bridge to the async AWS SDK using an
//!   internal `tokio::runtime::Runtime` and `block_on`.
//! - Every call is bounded by a timeout; expiry maps to
//!   `CoreError::StoreUnavailable`.

use aws_sdk_dynamodb::{types::AttributeValue, Client};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use domain::{
    ClickEvent, ClickRepository, CoreError, CounterStore, MappingRecord, MappingRepository,
    ShortCode, DEFAULT_CATEGORY, DEFAULT_SUMMARY,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_MAPPING_TABLE: &str = "SurlMappingTable";
pub const DEFAULT_COUNTER_TABLE: &str = "SurlCounter";
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Configuration for DynamoDB table names.
#[derive(Clone, Debug)]
pub struct DynamoTables {
    pub mapping: String,
    pub counters: String,
    pub clicks: Option<String>,
}

impl DynamoTables {
    /// Create with explicit table names and no click log.
    pub fn new(mapping: impl Into<String>, counters: impl Into<String>) -> Self {
        Self {
            mapping: mapping.into(),
            counters: counters.into(),
            clicks: None,
        }
    }

    pub fn with_clicks(mut self, clicks: impl Into<String>) -> Self {
        self.clicks = Some(clicks.into());
        self
    }

    /// Build from environment variables:
    /// - `MAPPING_TABLE_NAME` (defaults to "SurlMappingTable")
    /// - `COUNTER_TABLE_NAME` (defaults to "SurlCounter")
    /// - `LOG_TABLE_NAME` (optional; unset or empty disables click logging)
    pub fn from_env() -> Self {
        let mapping =
            std::env::var("MAPPING_TABLE_NAME").unwrap_or_else(|_| DEFAULT_MAPPING_TABLE.into());
        let counters =
            std::env::var("COUNTER_TABLE_NAME").unwrap_or_else(|_| DEFAULT_COUNTER_TABLE.into());
        let clicks = std::env::var("LOG_TABLE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Self {
            mapping,
            counters,
            clicks,
        }
    }
}

/// Read `STORE_TIMEOUT_MS`, falling back to [`DEFAULT_STORE_TIMEOUT`].
pub fn store_timeout_from_env() -> Duration {
    std::env::var("STORE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_STORE_TIMEOUT)
}

/// Repository backed by AWS DynamoDB.
///
/// Supports both standalone mode (creates its own Tokio runtime) and Lambda mode
/// (reuses the existing runtime via `Handle::current()`).
#[derive(Clone)]
pub struct DynamoRepo {
    tables: DynamoTables,
    client: Client,
    timeout: Duration,
    // None when running inside Lambda (reuses existing runtime)
    rt: Option<Arc<tokio::runtime::Runtime>>,
}

impl DynamoRepo {
    /// Create a new repo from explicit table names and an AWS SDK client.
    ///
    /// If called from within a Tokio runtime (e.g., Lambda), reuses the existing runtime.
    /// Otherwise creates a new runtime.
    pub fn with_client(tables: DynamoTables, client: Client) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        Ok(Self {
            tables,
            client,
            timeout: DEFAULT_STORE_TIMEOUT,
            rt,
        })
    }

    /// Construct with table names but create a default AWS SDK client using env/IMDS.
    pub fn new(tables: DynamoTables) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        let conf = Self::block_on_with_rt(&rt, aws_config::load_from_env());
        let client = Client::new(&conf);
        Ok(Self {
            tables,
            client,
            timeout: DEFAULT_STORE_TIMEOUT,
            rt,
        })
    }

    /// Construct from environment variables, see [`DynamoTables::from_env`]
    /// and [`store_timeout_from_env`].
    pub fn from_env() -> Result<Self, CoreError> {
        let repo = Self::new(DynamoTables::from_env())?;
        Ok(repo.with_timeout(store_timeout_from_env()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tables(&self) -> &DynamoTables {
        &self.tables
    }

    /// Check if we're inside a Tokio runtime. If yes, return None (reuse existing).
    /// If no, create a new runtime.
    fn maybe_create_runtime() -> Result<Option<Arc<tokio::runtime::Runtime>>, CoreError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            Ok(None)
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| CoreError::StoreUnavailable(format!("tokio runtime init: {e}")))?;
            Ok(Some(Arc::new(rt)))
        }
    }

    fn block_on_with_rt<F: Future>(rt: &Option<Arc<tokio::runtime::Runtime>>, fut: F) -> F::Output {
        match rt {
            Some(rt) => rt.block_on(fut),
            None => {
                // Inside an existing runtime: block_in_place + Handle::current()
                tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
            }
        }
    }

    /// Run one SDK call to completion, bounded by the configured timeout.
    fn run<T, E, F>(&self, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, E>>,
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        let timeout = self.timeout;
        // the timer must be created inside the runtime
        let res = Self::block_on_with_rt(&self.rt, async move {
            tokio::time::timeout(timeout, fut).await
        });
        match res {
            Ok(inner) => inner.map_err(map_sdk_err),
            Err(_) => Err(CoreError::StoreUnavailable(format!(
                "no response within {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

impl CounterStore for DynamoRepo {
    /// Single `UpdateItem` with `if_not_exists`, so the first increment of an
    /// unknown counter returns 1 and concurrent callers never share a value.
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError> {
        use aws_sdk_dynamodb::types::ReturnValue;
        let out = self.run(
            self.client
                .update_item()
                .table_name(self.tables.counters.clone())
                .key("counter_name", AttributeValue::S(key.to_string()))
                .update_expression("SET last_id = if_not_exists(last_id, :zero) + :inc")
                .expression_attribute_values(":zero", AttributeValue::N("0".into()))
                .expression_attribute_values(":inc", AttributeValue::N("1".into()))
                .return_values(ReturnValue::UpdatedNew)
                .send(),
        )?;
        let attrs = out.attributes().ok_or_else(|| {
            CoreError::ConditionalUpdateFailed("update returned no attributes".into())
        })?;
        let v = attrs
            .get("last_id")
            .and_then(|av| av.as_n().ok())
            .ok_or_else(|| CoreError::ConditionalUpdateFailed("counter missing last_id".into()))?;
        v.parse::<u64>()
            .map_err(|e| CoreError::ConditionalUpdateFailed(format!("parse counter: {e}")))
    }
}

impl MappingRepository for DynamoRepo {
    fn put_record(&self, record: MappingRecord) -> Result<(), CoreError> {
        // Conditional put: an allocated code is never overwritten
        let item = record_to_item(&record);
        let res = self.run(
            self.client
                .put_item()
                .table_name(self.tables.mapping.clone())
                .set_item(Some(item))
                .condition_expression("attribute_not_exists(#s)")
                .expression_attribute_names("#s", "shortCode")
                .send(),
        );
        match res {
            Ok(_) => Ok(()),
            Err(CoreError::ConditionalUpdateFailed(_)) => Err(CoreError::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    fn get_record(&self, code: &ShortCode) -> Result<Option<MappingRecord>, CoreError> {
        let out = self.run(
            self.client
                .get_item()
                .table_name(self.tables.mapping.clone())
                .key("shortCode", AttributeValue::S(code.as_str().to_string()))
                .send(),
        )?;
        match out.item() {
            Some(item) => Ok(Some(item_to_record(item)?)),
            None => Ok(None),
        }
    }
}

impl ClickRepository for DynamoRepo {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        let Some(table) = self.tables.clicks.clone() else {
            tracing::debug!(short_code = %event.short_code, "click log table not configured");
            return Ok(());
        };
        let item = click_to_item(&event);
        self.run(
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send(),
        )?;
        Ok(())
    }

    fn clicks_since(&self, since: SystemTime) -> Result<Vec<ClickEvent>, CoreError> {
        let Some(table) = self.tables.clicks.clone() else {
            return Ok(Vec::new());
        };
        let since = to_iso(since);
        let mut res = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let page = self.run(
                self.client
                    .scan()
                    .table_name(table.clone())
                    // "timestamp" is a reserved word
                    .filter_expression("#ts > :since")
                    .expression_attribute_names("#ts", "timestamp")
                    .expression_attribute_values(":since", AttributeValue::S(since.clone()))
                    .set_exclusive_start_key(start_key.take())
                    .send(),
            )?;
            for it in page.items().iter() {
                match item_to_click(it) {
                    Ok(c) => res.push(c),
                    Err(e) => tracing::warn!(err = %e, "skipping malformed click item"),
                }
            }
            match page.last_evaluated_key() {
                Some(k) if !k.is_empty() => start_key = Some(k.clone()),
                _ => break,
            }
        }
        Ok(res)
    }
}

fn map_sdk_err<E: ProvideErrorMetadata + std::fmt::Display>(e: E) -> CoreError {
    classify_code(e.code(), e.to_string())
}

/// Map a DynamoDB error code onto the domain error taxonomy.
fn classify_code(code: Option<&str>, detail: String) -> CoreError {
    match code {
        Some("ConditionalCheckFailedException") => CoreError::ConditionalUpdateFailed(detail),
        Some("ResourceNotFoundException") => {
            CoreError::StoreUnavailable(format!("missing table: {detail}"))
        }
        Some("ProvisionedThroughputExceededException")
        | Some("ThrottlingException")
        | Some("RequestLimitExceeded") => CoreError::StoreUnavailable(format!("throttled: {detail}")),
        _ => CoreError::StoreUnavailable(format!("dynamo error: {detail}")),
    }
}

/// ISO-8601 with microseconds and an explicit offset, e.g.
/// `2024-05-01T12:00:00.123456+00:00`. Click scans compare these as strings.
fn to_iso(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
fn from_iso(s: &str) -> Option<SystemTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).into());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc().into())
}

fn get_s<'a>(item: &'a HashMap<String, AttributeValue>, name: &str) -> Option<&'a str> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.as_str())
}

fn record_to_item(record: &MappingRecord) -> HashMap<String, AttributeValue> {
    let mut m = HashMap::new();
    m.insert(
        "shortCode".into(),
        AttributeValue::S(record.short_code.as_str().to_string()),
    );
    m.insert(
        "originalUrl".into(),
        AttributeValue::S(record.original_url.clone()),
    );
    m.insert("category".into(), AttributeValue::S(record.category.clone()));
    m.insert("summary".into(), AttributeValue::S(record.summary.clone()));
    m.insert("createdAt".into(), AttributeValue::S(to_iso(record.created_at)));
    m
}

fn item_to_record(item: &HashMap<String, AttributeValue>) -> Result<MappingRecord, CoreError> {
    let code = get_s(item, "shortCode")
        .ok_or_else(|| CoreError::StoreUnavailable("item missing shortCode".into()))?;
    let original_url = get_s(item, "originalUrl")
        .ok_or_else(|| CoreError::StoreUnavailable("item missing originalUrl".into()))?
        .to_string();
    let short_code = ShortCode::parse(code)
        .map_err(|e| CoreError::StoreUnavailable(format!("bad stored code: {e}")))?;

    Ok(MappingRecord {
        short_code,
        original_url,
        category: get_s(item, "category")
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        summary: get_s(item, "summary").unwrap_or(DEFAULT_SUMMARY).to_string(),
        created_at: get_s(item, "createdAt")
            .and_then(from_iso)
            .unwrap_or(UNIX_EPOCH),
    })
}

fn click_to_item(event: &ClickEvent) -> HashMap<String, AttributeValue> {
    let mut m = HashMap::new();
    m.insert(
        "shortCode".into(),
        AttributeValue::S(event.short_code.as_str().to_string()),
    );
    m.insert("timestamp".into(), AttributeValue::S(to_iso(event.clicked_at)));
    m.insert("category".into(), AttributeValue::S(event.category.clone()));
    m.insert("ip".into(), AttributeValue::S(event.source_ip.clone()));
    m
}

fn item_to_click(item: &HashMap<String, AttributeValue>) -> Result<ClickEvent, CoreError> {
    let code = get_s(item, "shortCode")
        .ok_or_else(|| CoreError::StoreUnavailable("click missing shortCode".into()))?;
    let clicked_at = get_s(item, "timestamp")
        .and_then(from_iso)
        .ok_or_else(|| CoreError::StoreUnavailable("click missing timestamp".into()))?;
    let short_code = ShortCode::parse(code)
        .map_err(|e| CoreError::StoreUnavailable(format!("bad stored code: {e}")))?;

    Ok(ClickEvent {
        short_code,
        clicked_at,
        category: get_s(item, "category")
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        source_ip: get_s(item, "ip").unwrap_or("unknown").to_string(),
    })
}
