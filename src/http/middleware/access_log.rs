//! Access Log Middleware.
//! One structured event per request, after the handler has answered.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::http::request::request_id;
use crate::observability::metrics;

pub async fn access_log(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let method = req.method().clone();
    let uri = req.uri().to_string();
    let request_id = request_id(req.headers()).to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let response = next.run(req).await;
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        client_ip = %client_ip,
        user_agent = %user_agent,
        "Request served"
    );
    metrics::record_request(method.as_str(), status.as_u16(), start);

    response
}
