//! lambda-redirect — AWS Lambda entrypoint for public short code redirects.
//!
//! Purpose
//! - Handle API Gateway events for `GET /{shortCode}`.
//! - Resolve the code via `LinkService` backed by the DynamoDB adapter.
//! - Return `302 Found` with `Location` and `Cache-Control: no-cache` so every
//!   visit reaches the function and gets logged; map domain errors to HTTP codes.
//!
//! Notes
//! - Click logging is best-effort: a failed write is logged and the redirect
//!   still goes out.
//! - It initializes minimal `tracing` logging compatible with Lambda CloudWatch.

use std::sync::Arc;

use aws_dynamo::DynamoRepo;
use domain::enrich::NoopEnricher;
use domain::service::LinkService;
use domain::{
    ClickRepository, Clock, CounterStore, Enricher, MappingRepository, ShortCode, SystemClock,
    Visit,
};
use http_common::lambda::{get_source_ip, resp, resp_for};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    // Build repo from env; if it fails, crash early to surface misconfiguration.
    let repo = DynamoRepo::from_env().map_err(|e| format!("dynamo init error: {e}"))?;
    if repo.tables().clicks.is_none() {
        warn!("LOG_TABLE_NAME not set; clicks will not be recorded");
    }
    let svc = Arc::new(LinkService::new(repo, NoopEnricher, SystemClock));

    let handler = service_fn(move |req: Request| {
        let svc = svc.clone();
        async move { Ok::<_, Error>(handle_request(&svc, &req)) }
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

fn handle_request<R, E, C>(svc: &LinkService<R, E, C>, req: &Request) -> Response<Body>
where
    R: CounterStore + MappingRepository + ClickRepository,
    E: Enricher,
    C: Clock,
{
    let raw_path = req.uri().path();
    // API Gateway may include the stage prefix in the raw path (e.g., /Prod/1Z)
    let code_str = http_common::code_segment(raw_path);

    if code_str.is_empty() {
        warn!(path = %raw_path, "empty short code in redirect");
        return resp(400, None, Some(http_common::json_err("bad_request")));
    }

    let code = match ShortCode::parse(code_str) {
        Ok(c) => c,
        Err(e) => {
            warn!(code = %code_str, err = %e, "invalid short code");
            return resp_for(&e);
        }
    };

    let visit = Visit {
        source_ip: get_source_ip(req),
    };
    match svc.redirect(&code, &visit) {
        Ok(record) => {
            info!(short_code = %code, redirect_to = %record.original_url, "resolve ok");
            let mut r = resp(302, Some(("Location", record.original_url)), None);
            r.headers_mut().insert(
                "cache-control",
                lambda_http::http::HeaderValue::from_static("no-cache"),
            );
            r
        }
        Err(domain::CoreError::NotFound) => {
            warn!(short_code = %code, "not found");
            resp(404, None, Some(http_common::json_err("not_found")))
        }
        Err(e) => {
            error!(short_code = %code, err = %e, "resolve error");
            resp_for(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;

    fn get(path: &str) -> Request {
        lambda_http::http::Request::builder()
            .method("GET")
            .uri(path)
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::Empty)
            .unwrap()
    }

    #[test]
    fn redirects_known_code_and_logs_click() {
        let repo = Arc::new(InMemoryRepo::new());
        let svc = LinkService::new(repo.clone(), NoopEnricher, SystemClock);
        let rec = svc.create("https://example.com/very/long/path").unwrap();

        let r = handle_request(&svc, &get(&format!("/Prod/{}", rec.short_code)));
        assert_eq!(r.status(), 302);
        assert_eq!(r.headers()["location"], "https://example.com/very/long/path");
        assert_eq!(r.headers()["cache-control"], "no-cache");

        let clicks = repo.all_clicks();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].source_ip, "203.0.113.9");
    }

    #[test]
    fn unknown_code_is_404() {
        let svc = LinkService::new(InMemoryRepo::new(), NoopEnricher, SystemClock);
        let r = handle_request(&svc, &get("/nope"));
        assert_eq!(r.status(), 404);
    }

    #[test]
    fn malformed_or_missing_code_is_400() {
        let svc = LinkService::new(InMemoryRepo::new(), NoopEnricher, SystemClock);
        assert_eq!(handle_request(&svc, &get("/ab-c")).status(), 400);
        assert_eq!(handle_request(&svc, &get("/")).status(), 400);
    }
}
