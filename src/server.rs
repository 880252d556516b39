//! HTTP query surface
//!
//! Thin hand-rolled HTTP/1.1 responder over the engine and the holiday
//! cache. Bad caller input maps to a client-error class, iteration-bound
//! faults to a server-error class; holiday retrieval degradation is
//! invisible here except through the cache-status endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{BusinessTimeEngine, EngineError};
use crate::holidays::{CacheStatus, HolidayCache};

/// Timeout for reading an HTTP request (prevents slow-loris stalls)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted days/hours value. Bigger offsets are almost
/// certainly caller bugs and would only burn CPU.
pub const MAX_OFFSET: u64 = 100_000;

/// Run the query HTTP server until cancelled.
pub async fn run_server(
    port: u16,
    engine: Arc<BusinessTimeEngine>,
    cache: Arc<HolidayCache>,
    cancel_token: CancellationToken,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind query server on port {}: {}", port, e);
            return;
        }
    };

    info!("Query server listening on http://0.0.0.0:{}/calculate", port);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((mut socket, peer_addr)) => {
                        let engine = engine.clone();
                        let cache = cache.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_request(&mut socket, &engine, &cache).await {
                                debug!("Error handling request from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Query server shutting down");
                break;
            }
        }
    }
}

async fn handle_request(
    socket: &mut tokio::net::TcpStream,
    engine: &BusinessTimeEngine,
    cache: &HolidayCache,
) -> std::io::Result<()> {
    let mut buf = [0u8; 2048];

    let n = match timeout(REQUEST_TIMEOUT, socket.read(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!("Request timeout after {:?}", REQUEST_TIMEOUT);
            return Ok(());
        }
    };

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);

    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let response = match path {
        "/calculate" | "/calculate/" => respond_calculate(query, engine).await,
        "/cache/status" | "/cache/status/" => build_status_response(&cache.status()),
        "/health" | "/healthz" | "/health/" => build_health_response(),
        _ => build_error_response(404, "NotFound", "Unknown path"),
    };

    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;

    Ok(())
}

async fn respond_calculate(query: &str, engine: &BusinessTimeEngine) -> String {
    let params = parse_query(query);

    let days = match parse_offset("days", params.get("days")) {
        Ok(v) => v,
        Err(message) => return build_error_response(400, "InvalidParameters", &message),
    };
    let hours = match parse_offset("hours", params.get("hours")) {
        Ok(v) => v,
        Err(message) => return build_error_response(400, "InvalidParameters", &message),
    };
    if days == 0 && hours == 0 {
        return build_error_response(
            400,
            "InvalidParameters",
            "At least one of days or hours must be provided and greater than 0",
        );
    }

    let base = match params.get("date") {
        Some(raw) => match BusinessTimeEngine::parse_base(raw) {
            Ok(instant) => instant,
            Err(e) => return build_error_response(400, "InvalidParameters", &e.to_string()),
        },
        None => Utc::now(),
    };

    match engine.resolve(base, days, hours).await {
        Ok(instant) => build_date_response(instant),
        Err(EngineError::InvalidInput(message)) => {
            build_error_response(400, "InvalidParameters", &message)
        }
        Err(e @ EngineError::InternalConsistency(_)) => {
            error!("Resolution failed: {}", e);
            build_error_response(500, "InternalError", "An internal server error occurred")
        }
    }
}

/// Decode `k=v&k=v` query pairs. Pairs that fail percent-decoding are
/// dropped rather than guessed at.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = urlencoding::decode(key).ok()?;
            let value = urlencoding::decode(value).ok()?;
            Some((key.into_owned(), value.into_owned()))
        })
        .collect()
}

fn parse_offset(name: &str, value: Option<&String>) -> Result<u64, String> {
    let raw = match value {
        None => return Ok(0),
        Some(raw) => raw,
    };
    let parsed: u64 = raw
        .parse()
        .map_err(|_| format!("{} must be a non-negative integer", name))?;
    if parsed > MAX_OFFSET {
        return Err(format!(
            "{} value too large. Maximum allowed: {}",
            name, MAX_OFFSET
        ));
    }
    Ok(parsed)
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn http_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
}

fn build_date_response(instant: DateTime<Utc>) -> String {
    let body = format!(r#"{{"date":"{}"}}"#, format_instant(instant));
    http_response(200, &body)
}

fn build_error_response(status: u16, error: &str, message: &str) -> String {
    let body = serde_json::json!({
        "error": error,
        "message": message,
    })
    .to_string();
    http_response(status, &body)
}

fn build_status_response(status: &CacheStatus) -> String {
    let body = serde_json::json!({
        "status": "OK",
        "cache": {
            "count": status.count,
            "last_refresh": status.last_refresh.map(format_instant),
            "source": status.source.as_str(),
        }
    })
    .to_string();
    http_response(200, &body)
}

fn build_health_response() -> String {
    http_response(200, r#"{"status":"healthy"}"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::{HolidayRecord, HolidaySource, SnapshotSource};
    use crate::policy::CalendarPolicy;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};

    struct StaticSource(Vec<HolidayRecord>);

    #[async_trait]
    impl HolidaySource for StaticSource {
        async fn fetch(&self) -> AnyResult<Vec<HolidayRecord>> {
            Ok(self.0.clone())
        }
    }

    fn test_engine() -> BusinessTimeEngine {
        let records = vec![HolidayRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            name: "Festivo".to_string(),
        }];
        let cache = Arc::new(HolidayCache::new(Box::new(StaticSource(records))));
        BusinessTimeEngine::new(CalendarPolicy::bogota(), cache)
    }

    fn body_of(response: &str) -> &str {
        response.split("\r\n\r\n").nth(1).unwrap_or("")
    }

    // === parse_query ===

    #[test]
    fn test_parse_query_basic() {
        let params = parse_query("days=1&hours=2&date=2025-01-14T20:00:00Z");
        assert_eq!(params.get("days"), Some(&"1".to_string()));
        assert_eq!(params.get("hours"), Some(&"2".to_string()));
        assert_eq!(params.get("date"), Some(&"2025-01-14T20:00:00Z".to_string()));
    }

    #[test]
    fn test_parse_query_percent_decoding() {
        let params = parse_query("date=2025-01-14T20%3A00%3A00Z");
        assert_eq!(params.get("date"), Some(&"2025-01-14T20:00:00Z".to_string()));
    }

    #[test]
    fn test_parse_query_empty_and_valueless() {
        assert!(parse_query("").is_empty());
        // a key with no '=' carries no value and is dropped
        let params = parse_query("days&hours=2");
        assert!(!params.contains_key("days"));
        assert_eq!(params.get("hours"), Some(&"2".to_string()));
    }

    // === parse_offset ===

    #[test]
    fn test_parse_offset_absent_is_zero() {
        assert_eq!(parse_offset("days", None), Ok(0));
    }

    #[test]
    fn test_parse_offset_valid() {
        assert_eq!(parse_offset("days", Some(&"17".to_string())), Ok(17));
        assert_eq!(parse_offset("days", Some(&"0".to_string())), Ok(0));
        assert_eq!(
            parse_offset("days", Some(&MAX_OFFSET.to_string())),
            Ok(MAX_OFFSET)
        );
    }

    #[test]
    fn test_parse_offset_rejects_garbage() {
        for raw in ["-1", "1.5", "abc", "", "1e3", " 5"] {
            let result = parse_offset("hours", Some(&raw.to_string()));
            assert!(result.is_err(), "{:?} must be rejected", raw);
            assert!(result.unwrap_err().contains("hours"));
        }
    }

    #[test]
    fn test_parse_offset_rejects_oversized() {
        let result = parse_offset("days", Some(&(MAX_OFFSET + 1).to_string()));
        assert!(result.unwrap_err().contains("too large"));
    }

    // === response builders ===

    #[test]
    fn test_date_response_shape() {
        let instant = Utc.with_ymd_and_hms(2025, 1, 16, 15, 0, 0).unwrap();
        let response = build_date_response(instant);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body_of(&response), r#"{"date":"2025-01-16T15:00:00Z"}"#);
    }

    #[test]
    fn test_error_response_shape() {
        let response = build_error_response(400, "InvalidParameters", "bad \"days\"");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        assert_eq!(body["error"], "InvalidParameters");
        assert_eq!(body["message"], "bad \"days\"");
    }

    #[test]
    fn test_status_response_shape() {
        let status = CacheStatus {
            count: 18,
            last_refresh: Some(Utc.with_ymd_and_hms(2025, 1, 14, 13, 0, 0).unwrap()),
            source: SnapshotSource::Remote,
        };
        let response = build_status_response(&status);
        let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        assert_eq!(body["cache"]["count"], 18);
        assert_eq!(body["cache"]["source"], "remote");
        assert_eq!(body["cache"]["last_refresh"], "2025-01-14T13:00:00Z");
    }

    #[test]
    fn test_status_response_before_first_refresh() {
        let status = CacheStatus {
            count: 0,
            last_refresh: None,
            source: SnapshotSource::Empty,
        };
        let response = build_status_response(&status);
        let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        assert_eq!(body["cache"]["source"], "empty");
        assert!(body["cache"]["last_refresh"].is_null());
    }

    // === /calculate ===

    #[tokio::test]
    async fn test_calculate_resolves() {
        let engine = test_engine();
        // Tuesday 2025-01-14 15:00 local = 20:00Z, one hour -> 16:00 local
        let response =
            respond_calculate("hours=1&date=2025-01-14T20%3A00%3A00Z", &engine).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert_eq!(body_of(&response), r#"{"date":"2025-01-14T21:00:00Z"}"#);
    }

    #[tokio::test]
    async fn test_calculate_rejects_both_zero() {
        let engine = test_engine();
        for query in ["", "days=0&hours=0", "days=0"] {
            let response = respond_calculate(query, &engine).await;
            assert!(
                response.starts_with("HTTP/1.1 400"),
                "query {:?} must be rejected",
                query
            );
        }
    }

    #[tokio::test]
    async fn test_calculate_rejects_bad_date() {
        let engine = test_engine();
        let response = respond_calculate("hours=1&date=yesterday", &engine).await;
        assert!(response.starts_with("HTTP/1.1 400"));
        let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        assert_eq!(body["error"], "InvalidParameters");
    }

    #[tokio::test]
    async fn test_calculate_rejects_negative_days() {
        let engine = test_engine();
        let response = respond_calculate("days=-1", &engine).await;
        assert!(response.starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn test_calculate_rejects_oversized_offset() {
        let engine = test_engine();
        let query = format!("days={}", MAX_OFFSET + 1);
        let response = respond_calculate(&query, &engine).await;
        assert!(response.starts_with("HTTP/1.1 400"));
        let body: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        assert!(body["message"].as_str().unwrap().contains("too large"));
    }

    #[tokio::test]
    async fn test_calculate_defaults_date_to_now() {
        let engine = test_engine();
        let response = respond_calculate("hours=1", &engine).await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }
}
