//! Debug HTTP service.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeout, access log)
//! - Serve each accepted connection with hyper, wrapped in [`ResetOnClose`]
//! - Hand each connection its own [`ResetDirective`] via request extensions
//! - Stop accepting and drain when the [`ShutdownCoordinator`] says so
//!
//! The accept loop is ours rather than `axum::serve` because the reset
//! decision has to reach the socket of the one connection that asked for it.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::ConnectInfo,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tower::Service;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{DebugServiceConfig, ShutdownConfig};
use crate::http::{handlers, request::UuidRequestId, websocket};
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::net::connection::{ConnectionGuard, ConnectionState, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError, ACCEPT_ERROR_BACKOFF};
use crate::net::teardown::{ResetDirective, ResetOnClose, TerminationMode};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: ShutdownCoordinator,
    pub max_stress_memory_mb: u64,
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &DebugServiceConfig, state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readiness", get(handlers::readiness))
        .route("/debug", post(handlers::debug))
        .route("/echo", post(handlers::echo))
        .route("/log", post(handlers::log))
        .route("/custom-headers", post(handlers::custom_headers))
        .route("/html", get(handlers::html))
        .route("/xml", get(handlers::xml))
        .route("/stateless", get(handlers::stateless))
        .route("/websocket", get(websocket::websocket_handler))
        .route("/sse", get(handlers::sse))
        .route("/reset", get(handlers::reset))
        .route("/crash", get(handlers::crash))
        .route("/shutdown", get(handlers::shutdown))
        .route("/stress/cpu", post(handlers::stress_cpu))
        .route("/stress/memory", post(handlers::stress_memory))
        .with_state(state)
        .layer(middleware::from_fn(crate::http::middleware::access_log))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(TraceLayer::new_for_http())
}

/// The debug HTTP service.
pub struct DebugServer {
    listener: Listener,
    router: Router,
    coordinator: ShutdownCoordinator,
    tracker: ConnectionTracker,
    reset_flush_timeout: Duration,
    handler_timeout: Duration,
    drain_window: Duration,
}

impl DebugServer {
    /// Bind the listener. Fails rather than running degraded.
    pub fn bind(
        config: &DebugServiceConfig,
        shutdown: &ShutdownConfig,
        coordinator: ShutdownCoordinator,
    ) -> Result<Self, ListenerError> {
        let listener = Listener::bind(&config.bind_address, config.backlog, config.max_connections)?;

        let state = AppState {
            coordinator: coordinator.clone(),
            max_stress_memory_mb: config.max_stress_memory_mb,
        };

        Ok(Self {
            listener,
            router: build_router(config, state),
            coordinator,
            tracker: ConnectionTracker::new("debug"),
            reset_flush_timeout: config.reset_flush_timeout(),
            handler_timeout: shutdown.handler_timeout(),
            drain_window: shutdown.drain_window(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until shutdown is requested, then drain. Returns once the
    /// coordinator has reached `Exited`.
    pub async fn run(self) {
        let Self {
            listener,
            router,
            coordinator,
            tracker,
            reset_flush_timeout,
            handler_timeout,
            drain_window,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Debug service listening");
        }

        loop {
            tokio::select! {
                biased;
                _ = coordinator.draining() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        metrics::record_connection("debug");
                        // Counted before the task exists, so a drain starting
                        // right now still waits for this connection.
                        let guard = tracker.track(peer);
                        let connection = DebugConnection {
                            router: router.clone(),
                            coordinator: coordinator.clone(),
                            reset_flush_timeout,
                        };
                        tokio::spawn(connection.serve(stream, peer, permit, guard));
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Debug accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        // Closing the listening socket makes new connects fail right away.
        drop(listener);
        tracing::info!(
            open_connections = tracker.open_count(),
            "Debug service stopped accepting"
        );

        coordinator.drain(&tracker, handler_timeout, drain_window).await;
        tracing::info!("Debug service stopped");
    }
}

/// How long a connection that has not delivered a request yet may keep the
/// drain waiting for one.
const FIRST_REQUEST_GRACE: Duration = Duration::from_millis(500);

/// Everything one connection task needs.
struct DebugConnection {
    router: Router,
    coordinator: ShutdownCoordinator,
    reset_flush_timeout: Duration,
}

impl DebugConnection {
    async fn serve(
        self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
        mut guard: ConnectionGuard,
    ) {
        let _permit = permit;
        let directive = ResetDirective::new();

        let io = TokioIo::new(ResetOnClose::new(
            stream,
            peer,
            directive.clone(),
            self.reset_flush_timeout,
        ));

        let (request_seen, mut seen) = watch::channel(false);
        let router = self.router;
        let request_directive = directive.clone();
        let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
            request_seen.send_replace(true);
            request.extensions_mut().insert(request_directive.clone());
            request.extensions_mut().insert(ConnectInfo(peer));
            router.clone().call(request)
        });

        let conn = http1::Builder::new()
            .timer(TokioTimer::new())
            .serve_connection(io, service)
            .with_upgrades();
        tokio::pin!(conn);

        let draining = self.coordinator.draining();
        tokio::pin!(draining);
        let grace = tokio::time::sleep(FIRST_REQUEST_GRACE);
        tokio::pin!(grace);
        let mut drain_seen = false;
        let mut shutdown_sent = false;

        // graceful_shutdown closes an idle connection at once, dropping a
        // request that is buffered but not yet parsed. Until the first request
        // has been read, hold it off (bounded by FIRST_REQUEST_GRACE).
        let result = loop {
            tokio::select! {
                result = conn.as_mut() => break result,
                _ = &mut draining, if !drain_seen => {
                    drain_seen = true;
                    guard.set_state(ConnectionState::Draining);
                    grace.as_mut().reset(Instant::now() + FIRST_REQUEST_GRACE);
                }
                _ = seen.wait_for(|read| *read), if drain_seen && !shutdown_sent => {
                    shutdown_sent = true;
                    // Finish the in-flight request, then close instead of keeping alive.
                    conn.as_mut().graceful_shutdown();
                }
                _ = &mut grace, if drain_seen && !shutdown_sent => {
                    shutdown_sent = true;
                    tracing::debug!(
                        connection_id = %guard.id(),
                        peer_addr = %peer,
                        "No request before drain grace elapsed"
                    );
                    conn.as_mut().graceful_shutdown();
                }
            }
        };

        guard.set_state(ConnectionState::Closing);
        match result {
            Ok(()) => tracing::trace!(
                connection_id = %guard.id(),
                peer_addr = %peer,
                mode = ?directive.mode(),
                "Connection finished"
            ),
            Err(e) => tracing::debug!(
                connection_id = %guard.id(),
                peer_addr = %peer,
                error = %e,
                "Connection ended with error"
            ),
        }
        if directive.mode() == TerminationMode::Reset {
            tracing::info!(connection_id = %guard.id(), peer_addr = %peer, "Connection reset after response");
        }
    }
}
