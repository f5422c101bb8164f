//! Debug service route handlers.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::control::parse_flag;
use crate::http::server::AppState;
use crate::net::teardown::ResetDirective;
use crate::stress::{self, StressError};

const HTML_CONTENT: &str = r#"<!DOCTYPE html>
<html>
<body>
<h1>Hello, World!</h1>
</body>
</html>"#;

const XML_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
    <message>Hello, World!</message>
</root>"#;

/// `seconds` / `status_code` knobs shared by the slow endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DelayParams {
    pub seconds: Option<u64>,
    pub status_code: Option<u16>,
}

impl DelayParams {
    async fn sleep(&self) {
        if let Some(seconds) = self.seconds.filter(|s| *s > 0) {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
    }

    fn status(&self) -> Result<StatusCode, Response> {
        match self.status_code {
            None => Ok(StatusCode::OK),
            Some(code) => StatusCode::from_u16(code)
                .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid status_code").into_response()),
        }
    }
}

fn peer_addr(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default()
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

/// Fails once a shutdown is under way so load balancers stop routing here.
pub async fn readiness(State(state): State<AppState>) -> Response {
    if state.coordinator.is_running() {
        Json(json!({ "status": "OK" })).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response()
    }
}

/// Describe the request back to the caller.
pub async fn debug(
    Query(params): Query<DelayParams>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    params.sleep().await;
    let status = match params.status() {
        Ok(status) => status,
        Err(response) => return response,
    };

    let info = json!({
        "headers": header_map(&headers),
        "method": method.as_str(),
        "url": uri.to_string(),
        "remote_addr": peer_addr(&extensions),
    });
    (status, Json(info)).into_response()
}

/// Echo the JSON body; an empty body echoes `{"status":"OK"}`.
pub async fn echo(Query(params): Query<DelayParams>, body: Bytes) -> Response {
    let payload: Value = if body.is_empty() {
        json!({ "status": "OK" })
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response(),
        }
    };

    params.sleep().await;
    match params.status() {
        Ok(status) => (status, Json(payload)).into_response(),
        Err(response) => response,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: String,
}

/// Emit a log line at the requested level.
pub async fn log(Query(params): Query<LogParams>) -> Json<Value> {
    let message = params.message.as_str();
    match params.level.as_str() {
        "info" => tracing::info!(target: "fault_harness::client_log", "{message}"),
        "warning" => tracing::warn!(target: "fault_harness::client_log", "{message}"),
        "error" => tracing::error!(target: "fault_harness::client_log", "{message}"),
        _ => tracing::debug!(target: "fault_harness::client_log", "{message}"),
    }
    Json(json!({ "message": params.message, "level": params.level }))
}

/// Answer with the headers given in the JSON body.
pub async fn custom_headers(Json(requested): Json<HashMap<String, String>>) -> Response {
    let mut headers = HeaderMap::with_capacity(requested.len());
    for (name, value) in &requested {
        let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) else {
            return (StatusCode::BAD_REQUEST, format!("Invalid header: {name}")).into_response();
        };
        headers.insert(name, value);
    }
    (StatusCode::OK, headers).into_response()
}

pub async fn html() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], HTML_CONTENT)
}

pub async fn xml() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/xml")], XML_CONTENT)
}

/// Like `/healthz`, but the connection is closed after the response.
pub async fn stateless(Query(params): Query<DelayParams>) -> impl IntoResponse {
    params.sleep().await;
    ([(header::CONNECTION, "close")], Json(json!({ "status": "OK" })))
}

pub async fn sse() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let ticker = tokio::time::interval(Duration::from_secs(1));
    let events = stream::unfold(ticker, |mut ticker| async move {
        ticker.tick().await;
        let now = chrono::Local::now().format("%H:%M:%S");
        let event = Event::default().data(format!("The server time is {now}"));
        Some((Ok(event), ticker))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetParams {
    #[serde(rename = "do")]
    pub do_reset: Option<String>,
}

/// Tag this request's connection for reset once the response is delivered.
pub async fn reset(Query(params): Query<ResetParams>, extensions: Extensions) -> Response {
    let requested = params
        .do_reset
        .as_deref()
        .and_then(parse_flag)
        .unwrap_or(false);

    if !requested {
        return Json(json!({ "message": "Reset not performed" })).into_response();
    }

    match extensions.get::<ResetDirective>() {
        Some(directive) => {
            if directive.request_reset() {
                tracing::info!(peer_addr = %peer_addr(&extensions), "Connection tagged for reset");
            }
        }
        None => tracing::warn!("Reset requested on a connection without a reset directive"),
    }

    (
        StatusCode::OK,
        [(header::CONNECTION, "close")],
        "Connection will be reset",
    )
        .into_response()
}

/// Terminate the process abnormally.
pub async fn crash() -> Response {
    tracing::error!("Crash requested, exiting with status 1");
    std::process::exit(1);
}

/// Start the same graceful drain a SIGTERM would.
pub async fn shutdown(State(state): State<AppState>) -> Response {
    let message = if state.coordinator.request_shutdown() {
        "Shutdown initiated"
    } else {
        "Shutdown already in progress"
    };
    (StatusCode::ACCEPTED, Json(json!({ "message": message }))).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuStressParams {
    pub cpu_percent: Option<String>,
    pub duration: Option<String>,
}

pub async fn stress_cpu(Query(params): Query<CpuStressParams>) -> Response {
    let started = stress::parse_percent(params.cpu_percent.as_deref()).and_then(|percent| {
        let duration = stress::parse_duration(params.duration.as_deref())?;
        stress::spawn_cpu_stress(percent, duration)?;
        Ok((percent, duration))
    });

    match started {
        Ok((percent, duration)) => Json(json!({
            "message": format!("CPU stressed at {percent}% for {} seconds", duration.as_secs())
        }))
        .into_response(),
        Err(e) => stress_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryStressParams {
    pub memory_mb: Option<String>,
    pub duration: Option<String>,
}

pub async fn stress_memory(
    State(state): State<AppState>,
    Query(params): Query<MemoryStressParams>,
) -> Response {
    let started = stress::parse_memory_mb(params.memory_mb.as_deref(), state.max_stress_memory_mb)
        .and_then(|megabytes| {
            let duration = stress::parse_duration(params.duration.as_deref())?;
            stress::spawn_memory_stress(megabytes, duration)?;
            Ok((megabytes, duration))
        });

    match started {
        Ok((megabytes, duration)) => Json(json!({
            "message": format!("Memory stressed at {megabytes} MiB for {} seconds", duration.as_secs())
        }))
        .into_response(),
        Err(e) => stress_error(e),
    }
}

fn stress_error(e: StressError) -> Response {
    let status = match e {
        StressError::Spawn => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string()).into_response()
}
