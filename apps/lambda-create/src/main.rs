//! lambda-create — AWS Lambda entrypoint for short code creation.
//!
//! Purpose
//! - Handle API Gateway events for `POST /create` with body `{"url": "..."}`.
//! - Allocate the next identifier from the DynamoDB counter, encode it, and
//!   persist the mapping via `LinkService`.
//! - Answer `OPTIONS` preflight requests; every response carries CORS headers.
//!
//! Notes
//! - No classification backend is wired in; records get the default category
//!   and summary.

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aws_dynamo::DynamoRepo;
use domain::enrich::NoopEnricher;
use domain::service::LinkService;
use domain::{ClickRepository, Clock, CounterStore, Enricher, MappingRepository, SystemClock};
use http_common::lambda::{body_text, get_host, get_stage, resp, resp_for, resp_with_error, with_cors};
use http_common::{CreateReq, CreateResp};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let repo = DynamoRepo::from_env().map_err(|e| format!("dynamo init error: {e}"))?;
    let counter =
        std::env::var("COUNTER_NAME").unwrap_or_else(|_| domain::allocator::DEFAULT_COUNTER.into());
    info!(tables = ?repo.tables(), counter = %counter, "lambda-create starting");
    let svc = Arc::new(LinkService::new(repo, NoopEnricher, SystemClock).with_counter(counter));

    let handler = service_fn(move |req: Request| {
        let svc = svc.clone();
        async move { Ok::<_, Error>(route(&svc, &req)) }
    });
    run(handler).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .init();
}

fn route<R, E, C>(svc: &LinkService<R, E, C>, req: &Request) -> Response<Body>
where
    R: CounterStore + MappingRepository + ClickRepository,
    E: Enricher,
    C: Clock,
{
    match req.method().as_str() {
        "OPTIONS" => with_cors(resp(204, None, None)),
        "POST" => with_cors(create(svc, req)),
        _ => with_cors(resp(
            405,
            None,
            Some(http_common::json_err("method_not_allowed")),
        )),
    }
}

fn create<R, E, C>(svc: &LinkService<R, E, C>, req: &Request) -> Response<Body>
where
    R: CounterStore + MappingRepository + ClickRepository,
    E: Enricher,
    C: Clock,
{
    let body = body_text(req);
    let payload: CreateReq = if body.trim().is_empty() {
        CreateReq::default()
    } else {
        match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(err = %e, "bad json");
                return resp_with_error(400, "bad_request", "bad json");
            }
        }
    };

    let record = match svc.create(&payload.url) {
        Ok(r) => r,
        Err(e) if e.is_client_error() => {
            warn!(err = %e, "rejected create");
            return resp_for(&e);
        }
        Err(e) => {
            error!(err = %e, "create failed");
            return resp_for(&e);
        }
    };

    let stage = get_stage(req);
    let short_url =
        http_common::build_short_url_from_host(get_host(req), stage.as_deref(), record.short_code.as_str());
    info!(short_code = %record.short_code, short_url = %short_url, "created");

    match serde_json::to_value(CreateResp::from_record(record, short_url)) {
        Ok(v) => resp(201, None, Some(v)),
        Err(e) => {
            error!(err = %e, "serialize response");
            resp(500, None, Some(http_common::json_err("internal")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;

    fn svc() -> LinkService<InMemoryRepo, NoopEnricher, SystemClock> {
        LinkService::new(InMemoryRepo::new(), NoopEnricher, SystemClock)
    }

    fn post(body: &str) -> Request {
        lambda_http::http::Request::builder()
            .method("POST")
            .uri("/create")
            .header("host", "abc.execute-api.aws")
            .body(Body::from(body))
            .unwrap()
    }

    fn json_body(r: &Response<Body>) -> serde_json::Value {
        match r.body() {
            Body::Text(s) => serde_json::from_str(s).unwrap(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn create_returns_201_with_code_and_url() {
        std::env::remove_var("SHORTLINK_DOMAIN");
        let svc = svc();
        let r = route(&svc, &post(r#"{"url":"https://example.com/very/long/path"}"#));
        assert_eq!(r.status(), 201);
        assert_eq!(r.headers()["access-control-allow-origin"], "*");
        let v = json_body(&r);
        assert_eq!(v["shortCode"], "1");
        assert_eq!(v["shortUrl"], "https://abc.execute-api.aws/1");
        assert_eq!(v["originalUrl"], "https://example.com/very/long/path");
        assert_eq!(v["category"], domain::DEFAULT_CATEGORY);
    }

    #[test]
    fn empty_url_is_400() {
        let svc = svc();
        for body in [r#"{"url":"   "}"#, "{}", ""] {
            let r = route(&svc, &post(body));
            assert_eq!(r.status(), 400, "body {body:?}");
        }
    }

    #[test]
    fn bad_json_is_400() {
        let r = route(&svc(), &post("{not json"));
        assert_eq!(r.status(), 400);
        assert_eq!(json_body(&r)["error"]["code"], "bad_request");
    }

    #[test]
    fn preflight_is_204_with_cors() {
        let req = lambda_http::http::Request::builder()
            .method("OPTIONS")
            .uri("/create")
            .body(Body::Empty)
            .unwrap();
        let r = route(&svc(), &req);
        assert_eq!(r.status(), 204);
        assert!(r.headers().contains_key("access-control-allow-methods"));
    }
}
