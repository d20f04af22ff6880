//! Shared HTTP utilities for the URL shortener workspace.
//!
//! Provides common response builders, error mapping, and request parsing
//! used across api-server, lambda-create, lambda-redirect and lambda-trend.

use domain::{CoreError, MappingRecord};
use serde::{Deserialize, Serialize};

// ============================================================================
// Payloads
// ============================================================================

/// Body of `POST /create`. A missing `url` is treated like an empty one.
#[derive(Debug, Default, Deserialize)]
pub struct CreateReq {
    #[serde(default)]
    pub url: String,
}

/// Body returned by a successful creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResp {
    pub short_code: String,
    pub short_url: String,
    pub original_url: String,
    pub category: String,
    pub summary: String,
}

impl CreateResp {
    pub fn from_record(record: MappingRecord, short_url: String) -> Self {
        Self {
            short_code: record.short_code.as_str().to_string(),
            short_url,
            original_url: record.original_url,
            category: record.category,
            summary: record.summary,
        }
    }
}

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "URL not found",
        "bad_request" => "Bad request",
        "invalid_code" => "Invalid short code",
        "method_not_allowed" => "Method not allowed",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Map a domain error to an HTTP status and error body.
///
/// Store and internal failures get a generic body; their detail only goes
/// to the logs.
pub fn error_parts(err: &CoreError) -> (u16, serde_json::Value) {
    match err {
        CoreError::Validation(msg) => (400, json_error_with_message("bad_request", msg)),
        CoreError::InvalidSymbol { .. } | CoreError::CodeOverflow => {
            (400, json_error_with_message("invalid_code", &err.to_string()))
        }
        CoreError::NotFound => (404, json_err("not_found")),
        _ => (500, json_err("internal")),
    }
}

// ============================================================================
// URL Building
// ============================================================================

/// Build the public short URL for `code`.
///
/// `base` (usually `SHORTLINK_DOMAIN`) wins when non-empty. Otherwise the URL
/// is `https://{host}/{stage}/{code}`, the stage segment omitted when absent,
/// or `/{code}` when the host is unknown.
pub fn build_short_url(base: Option<&str>, host: &str, stage: Option<&str>, code: &str) -> String {
    if let Some(dom) = base.map(str::trim).filter(|d| !d.is_empty()) {
        return format!("{}/{}", dom.trim_end_matches('/'), code);
    }
    if host.is_empty() {
        return format!("/{}", code);
    }
    match stage.filter(|s| !s.is_empty()) {
        Some(stage) => format!("https://{}/{}/{}", host, stage, code),
        None => format!("https://{}/{}", host, code),
    }
}

/// [`build_short_url`] with the base taken from `SHORTLINK_DOMAIN`.
pub fn build_short_url_from_host(host: &str, stage: Option<&str>, code: &str) -> String {
    let base = std::env::var("SHORTLINK_DOMAIN").ok();
    build_short_url(base.as_deref(), host, stage, code)
}

// ============================================================================
// Request Parsing
// ============================================================================

/// Parse a named query parameter from a query string.
///
/// Returns `Some(value)` if the parameter is found, `None` otherwise.
pub fn parse_query_param(query: Option<&str>, name: &str) -> Option<String> {
    let q = query?;
    for pair in q.split('&') {
        let mut it = pair.splitn(2, '=');
        let key = it.next()?;
        if key == name {
            if let Some(val) = it.next() {
                // Basic URL decoding for common cases
                let decoded = val.replace("%20", " ").replace('+', " ");
                return Some(decoded);
            }
        }
    }
    None
}

/// Parse the `minutes` query parameter. Non-numeric values count as absent.
pub fn parse_minutes(query: Option<&str>) -> Option<i64> {
    parse_query_param(query, "minutes").and_then(|v| v.trim().parse::<i64>().ok())
}

/// First hop of an `X-Forwarded-For` header, i.e. the original client.
pub fn first_forwarded_ip(header: Option<&str>) -> Option<String> {
    header?
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Last path segment, which carries the short code. API Gateway may prefix
/// the raw path with the stage name.
pub fn code_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

// ============================================================================
// Lambda HTTP Helpers (feature-gated)
// ============================================================================

#[cfg(feature = "lambda")]
pub mod lambda {
    //! Lambda-specific HTTP response builders using `lambda_http` types.

    use lambda_http::request::RequestContext;
    use lambda_http::{Body, RequestExt, Response};

    /// Build an HTTP response with optional header and JSON body.
    pub fn resp(
        status: u16,
        header: Option<(&str, String)>,
        body_json: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut rb = Response::builder().status(status);
        if let Some((k, v)) = header {
            rb = rb.header(k, v);
        }
        let built = match body_json {
            Some(val) => rb
                .header("content-type", "application/json")
                .body(Body::Text(val.to_string())),
            None => rb.body(Body::Empty),
        };
        built.unwrap_or_else(|e| {
            tracing::error!(err = %e, "response construction failed");
            let mut r = Response::new(Body::Empty);
            *r.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            r
        })
    }

    /// Build an error response with status code and structured error body.
    pub fn resp_with_error(status: u16, code: &str, message: &str) -> Response<Body> {
        let body = crate::json_error_with_message(code, message);
        resp(status, None, Some(body))
    }

    /// Build the error response for a domain error, see [`crate::error_parts`].
    pub fn resp_for(err: &domain::CoreError) -> Response<Body> {
        let (status, body) = crate::error_parts(err);
        resp(status, None, Some(body))
    }

    /// Add CORS headers to a response.
    ///
    /// Uses `CORS_ALLOW_ORIGIN` env var, defaulting to `*`.
    pub fn with_cors(mut resp: Response<Body>) -> Response<Body> {
        use http::header::{HeaderName, HeaderValue};
        let headers = resp.headers_mut();
        let allow_origin =
            std::env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());
        headers.insert(
            HeaderName::from_static("access-control-allow-origin"),
            HeaderValue::from_str(&allow_origin).unwrap_or(HeaderValue::from_static("*")),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static("content-type"),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static("OPTIONS, GET, POST"),
        );
        resp
    }

    /// Extract the Host header value from a Lambda request.
    pub fn get_host(req: &lambda_http::Request) -> &str {
        req.headers()
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// API Gateway stage name, if the request went through a named stage.
    pub fn get_stage(req: &lambda_http::Request) -> Option<String> {
        let stage = match req.request_context_ref()? {
            RequestContext::ApiGatewayV1(ctx) => ctx.stage.clone(),
            RequestContext::ApiGatewayV2(ctx) => ctx.stage.clone(),
            _ => None,
        };
        stage.filter(|s| !s.is_empty() && s != "$default")
    }

    /// Original client address from `X-Forwarded-For`.
    pub fn get_source_ip(req: &lambda_http::Request) -> Option<String> {
        crate::first_forwarded_ip(
            req.headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok()),
        )
    }

    /// Request body as UTF-8 text; empty when absent.
    pub fn body_text(req: &lambda_http::Request) -> String {
        match req.body() {
            Body::Text(s) => s.clone(),
            Body::Binary(b) => String::from_utf8(b.clone()).unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ShortCode;
    use std::time::SystemTime;

    #[test]
    fn test_json_err() {
        let err = json_err("not_found");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "not_found", "message": "URL not found"}})
        );

        // Unknown code falls back to code as message
        let err = json_err("custom_error");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "custom_error", "message": "custom_error"}})
        );
    }

    #[test]
    fn test_json_error_with_message() {
        let err = json_error_with_message("bad_request", "Invalid input");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "bad_request", "message": "Invalid input"}})
        );
    }

    #[test]
    fn test_error_parts() {
        assert_eq!(error_parts(&CoreError::Validation("url is required".into())).0, 400);
        assert_eq!(error_parts(&CoreError::CodeOverflow).0, 400);
        let (status, body) = error_parts(&CoreError::InvalidSymbol {
            symbol: '-',
            position: 1,
        });
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "invalid_code");
        assert_eq!(error_parts(&CoreError::NotFound).0, 404);

        // internals never reach the client
        let (status, body) = error_parts(&CoreError::StoreUnavailable("table Foo gone".into()));
        assert_eq!(status, 500);
        assert!(!body.to_string().contains("Foo"));
        assert_eq!(error_parts(&CoreError::ConditionalUpdateFailed("x".into())).0, 500);
    }

    #[test]
    fn test_build_short_url() {
        assert_eq!(
            build_short_url(None, "abc.execute-api.aws", Some("Prod"), "1Z"),
            "https://abc.execute-api.aws/Prod/1Z"
        );
        assert_eq!(build_short_url(None, "example.com", None, "abc"), "https://example.com/abc");
        assert_eq!(build_short_url(Some(""), "", None, "abc"), "/abc");
        assert_eq!(
            build_short_url(Some("https://s.io/"), "example.com", Some("Prod"), "abc"),
            "https://s.io/abc"
        );
    }

    #[test]
    fn test_parse_query_param() {
        assert_eq!(parse_query_param(Some("foo=bar"), "foo"), Some("bar".to_string()));
        assert_eq!(parse_query_param(Some("a=1&foo=x%20y"), "foo"), Some("x y".to_string()));
        assert_eq!(parse_query_param(Some("foo=bar"), "missing"), None);
        assert_eq!(parse_query_param(None, "foo"), None);
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_minutes(Some("minutes=60")), Some(60));
        assert_eq!(parse_minutes(Some("minutes=-5")), Some(-5));
        assert_eq!(parse_minutes(Some("minutes=abc")), None);
        assert_eq!(parse_minutes(None), None);
    }

    #[test]
    fn test_first_forwarded_ip() {
        assert_eq!(
            first_forwarded_ip(Some("203.0.113.9, 10.0.0.1")),
            Some("203.0.113.9".to_string())
        );
        assert_eq!(first_forwarded_ip(Some("  ")), None);
        assert_eq!(first_forwarded_ip(None), None);
    }

    #[test]
    fn test_code_segment() {
        assert_eq!(code_segment("/Prod/1Z"), "1Z");
        assert_eq!(code_segment("/abc/"), "abc");
        assert_eq!(code_segment("/"), "");
    }

    #[test]
    fn test_create_resp_shape() {
        let rec = MappingRecord {
            short_code: ShortCode::from_id(1),
            original_url: "https://e.com".into(),
            category: "IT".into(),
            summary: "docs".into(),
            created_at: SystemTime::UNIX_EPOCH,
        };
        let v = serde_json::to_value(CreateResp::from_record(rec, "https://h/1".into())).unwrap();
        assert_eq!(v["shortCode"], "1");
        assert_eq!(v["shortUrl"], "https://h/1");
        assert_eq!(v["originalUrl"], "https://e.com");
        assert_eq!(v["category"], "IT");
    }

    #[test]
    fn test_create_req_missing_url_is_empty() {
        let req: CreateReq = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_empty());
    }
}
