//! lambda-trend — AWS Lambda entrypoint for click trend statistics.
//!
//! Handles `GET /trend?minutes=N`: counts clicks per category over the last
//! `N` minutes (default one day, clamped to one week) from the click log table.

use aws_dynamo::DynamoRepo;
use domain::{trend, ClickRepository, Clock, SystemClock};
use http_common::lambda::{resp, resp_for, with_cors};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    let repo = Arc::new(DynamoRepo::from_env().map_err(|e| format!("dynamo init error: {e}"))?);

    let handler = service_fn(move |req: Request| {
        let repo = repo.clone();
        async move { Ok::<_, Error>(handle_request(repo.as_ref(), &SystemClock, &req)) }
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

fn handle_request<R, C>(repo: &R, clock: &C, req: &Request) -> Response<Body>
where
    R: ClickRepository,
    C: Clock,
{
    if req.method().as_str() == "OPTIONS" {
        return with_cors(resp(204, None, None));
    }
    let minutes = http_common::parse_minutes(req.uri().query());
    let report = match trend::trend_report(repo, clock, minutes) {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, "trend query failed");
            return with_cors(resp_for(&e));
        }
    };
    info!(window_minutes = report.window_minutes, categories = report.stats.len(), "trend ok");
    match serde_json::to_value(&report) {
        Ok(v) => with_cors(resp(200, None, Some(v))),
        Err(e) => {
            error!(err = %e, "serialize trend");
            with_cors(resp(500, None, Some(http_common::json_err("internal"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;
    use domain::{ClickEvent, ShortCode};
    use std::time::{Duration, SystemTime};

    fn get(uri: &str) -> Request {
        lambda_http::http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::Empty)
            .unwrap()
    }

    fn json_body(r: &Response<Body>) -> serde_json::Value {
        match r.body() {
            Body::Text(s) => serde_json::from_str(s).unwrap(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn counts_recent_clicks_by_category() {
        let repo = InMemoryRepo::new();
        let now = SystemTime::now();
        for (cat, ago) in [("IT", 60), ("IT", 120), ("News", 7200)] {
            repo.record_click(ClickEvent {
                short_code: ShortCode::from_id(1),
                clicked_at: now - Duration::from_secs(ago),
                category: cat.into(),
                source_ip: "unknown".into(),
            })
            .unwrap();
        }

        let r = handle_request(&repo, &SystemClock, &get("/trend?minutes=60"));
        assert_eq!(r.status(), 200);
        let v = json_body(&r);
        assert_eq!(v["stats"]["IT"], 2);
        assert!(v["stats"].get("News").is_none());
        assert!(v["ai_analysis"].is_null());
    }

    #[test]
    fn empty_window_has_message() {
        let r = handle_request(&InMemoryRepo::new(), &SystemClock, &get("/trend"));
        assert_eq!(r.status(), 200);
        let v = json_body(&r);
        assert_eq!(v["window_minutes"], trend::DEFAULT_WINDOW_MINUTES);
        assert_eq!(v["message"], trend::NO_DATA_MESSAGE);
    }
}
