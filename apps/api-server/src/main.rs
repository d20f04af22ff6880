//! api-server — Local development HTTP API for the URL Shortener workspace.
//!
//! Serves the same contract as the Lambda functions from one process:
//! - `POST /create` — shorten `{"url": "..."}`, 201 with the new code.
//! - `GET /trend?minutes=N` — click counts per category.
//! - `GET /:code` — 302 to the original URL, logging the click.
//!
//! Storage: SQLite (default, `sqlite` feature), in-memory, or DynamoDB with
//! the `dynamo` feature. CORS: configurable via CORS_ALLOW_ORIGIN.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # against the DynamoDB tables (requires AWS credentials)
//! STORAGE_PROVIDER=dynamo MAPPING_TABLE_NAME=SurlMappingTable \
//!   cargo run -p api-server --features dynamo
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryRepo;
use domain::enrich::NoopEnricher;
use domain::service::LinkService;
use domain::{
    trend, ClickEvent, ClickRepository, CoreError, CounterStore, MappingRecord,
    MappingRepository, ShortCode, SystemClock, Visit,
};
use http_common::{CreateReq, CreateResp};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local repo abstraction over the configured backend (feature-gated).
enum RepoKind {
    Memory(InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
    #[cfg(feature = "dynamo")]
    Dynamo(aws_dynamo::DynamoRepo),
}

#[derive(Clone)]
struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory(InMemoryRepo::new())),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(cfg: &config::Config) -> Result<Self, CoreError> {
        let repo = match &cfg.db_path {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                sqlite_adapter::SqliteRepo::new(path)?
            }
            None => sqlite_adapter::SqliteRepo::from_env()?,
        };
        Ok(Self {
            kind: Arc::new(RepoKind::Sqlite(repo)),
        })
    }

    #[cfg(feature = "dynamo")]
    fn dynamo_from_env() -> Result<Self, CoreError> {
        Ok(Self {
            kind: Arc::new(RepoKind::Dynamo(aws_dynamo::DynamoRepo::from_env()?)),
        })
    }
}

impl CounterStore for AnyRepo {
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.atomic_increment(key),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.atomic_increment(key),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.atomic_increment(key),
        }
    }
}

impl MappingRepository for AnyRepo {
    fn put_record(&self, record: MappingRecord) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.put_record(record),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.put_record(record),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.put_record(record),
        }
    }

    fn get_record(&self, code: &ShortCode) -> Result<Option<MappingRecord>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.get_record(code),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.get_record(code),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.get_record(code),
        }
    }
}

impl ClickRepository for AnyRepo {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.record_click(event),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.record_click(event),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.record_click(event),
        }
    }

    fn clicks_since(&self, since: SystemTime) -> Result<Vec<ClickEvent>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.clicks_since(since),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.clicks_since(since),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.clicks_since(since),
        }
    }
}

type Service = LinkService<AnyRepo, NoopEnricher, SystemClock>;

#[derive(Clone)]
struct AppState {
    svc: Arc<Service>,
    shortlink_domain: Option<String>,
}

impl AppState {
    fn new(repo: AnyRepo, counter_name: &str, shortlink_domain: Option<String>) -> Self {
        Self {
            svc: Arc::new(LinkService::new(repo, NoopEnricher, SystemClock).with_counter(counter_name)),
            shortlink_domain,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = config::Config::from_env()?;

    init_tracing(&cfg);

    let repo = build_repo(&cfg)?;
    let state = AppState::new(repo, &cfg.counter_name, cfg.shortlink_domain.clone());

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, storage = ?cfg.storage_provider, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create).options(preflight))
        .route("/trend", get(get_trend).options(preflight))
        .route("/", get(missing_code))
        .route("/:code", get(redirect))
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo(cfg: &config::Config) -> Result<AnyRepo, CoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => AnyRepo::sqlite(cfg),
        #[cfg(feature = "dynamo")]
        config::StorageProvider::Dynamo => AnyRepo::dynamo_from_env(),
        _ => {
            warn!("using in-memory storage; data is lost on restart");
            Ok(AnyRepo::memory())
        }
    }
}

fn error_response(err: &CoreError) -> Response {
    let (status, body) = http_common::error_parts(err);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn missing_code() -> Response {
    warn!("empty short code in redirect");
    error_response(&CoreError::Validation("short code is required".into()))
}

async fn create(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let payload: CreateReq = if body.trim().is_empty() {
        CreateReq::default()
    } else {
        match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(err = %e, "bad json");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(http_common::json_error_with_message("bad_request", "bad json")),
                )
                    .into_response();
            }
        }
    };

    let record = match state.svc.create(&payload.url) {
        Ok(r) => r,
        Err(e) => {
            if e.is_client_error() {
                warn!(err = %e, "rejected create");
            } else {
                error!(err = %e, "create failed");
            }
            return error_response(&e);
        }
    };

    let short_url = build_short_url(&headers, record.short_code.as_str(), &state.shortlink_domain);
    info!(short_code = %record.short_code, short_url = %short_url, "created");
    (
        StatusCode::CREATED,
        Json(CreateResp::from_record(record, short_url)),
    )
        .into_response()
}

async fn redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response {
    let code = match ShortCode::parse(code) {
        Ok(c) => c,
        Err(e) => {
            warn!(err = %e, "bad short code in path");
            return error_response(&e);
        }
    };
    let visit = Visit {
        source_ip: http_common::first_forwarded_ip(
            headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()),
        ),
    };
    match state.svc.redirect(&code, &visit) {
        Ok(record) => {
            info!(short_code = %code, redirect_to = %record.original_url, "resolve ok");
            (
                StatusCode::FOUND,
                [
                    (header::LOCATION, record.original_url),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
            )
                .into_response()
        }
        Err(CoreError::NotFound) => {
            warn!(short_code = %code, "resolve 404");
            error_response(&CoreError::NotFound)
        }
        Err(e) => {
            error!(short_code = %code, err = %e, "resolve error");
            error_response(&e)
        }
    }
}

async fn get_trend(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let minutes = http_common::parse_minutes(query.as_deref());
    match trend::trend_report(state.svc.repo(), state.svc.clock(), minutes) {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(err = %e, "trend query failed");
            error_response(&e)
        }
    }
}

async fn preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Build short URL using shortlink_domain from config, or Host header as fallback.
fn build_short_url(headers: &HeaderMap, code: &str, shortlink_domain: &Option<String>) -> String {
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    http_common::build_short_url(shortlink_domain.as_deref(), host, None, code)
}
