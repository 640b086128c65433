//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Start the background staleness checks next to the listener
//! - Serve until shutdown, then stop the background checks

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::GatewayConfig;
use crate::currency::ConfigCurrency;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::ApiError;
use crate::lifecycle::startup::Gateway;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub currency: ConfigCurrency,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Reject mutations in read-only mode.
    pub fn ensure_writable(&self) -> Result<(), ApiError> {
        if self.config.security.read_only {
            Err(ApiError::read_only())
        } else {
            Ok(())
        }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    nudges: Option<mpsc::Receiver<()>>,
    watcher: Option<RecommendedWatcher>,
}

impl HttpServer {
    /// Create a new HTTP server around an assembled gateway.
    pub fn new(mut gateway: Gateway) -> Self {
        let state = AppState {
            currency: gateway.currency.clone(),
            config: gateway.config.clone(),
        };
        let router = Self::build_router(&gateway.config, state.clone());
        Self {
            router,
            state,
            nudges: gateway.take_nudges(),
            watcher: gateway.take_watcher(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut api = Router::new()
            .route("/heartbeat", get(handlers::heartbeat))
            .route("/config/current", get(handlers::current_config))
            .route("/data-sources", get(handlers::list_data_sources).post(handlers::add_data_source))
            .route("/data-sources/{code}", get(handlers::get_data_source))
            .route(
                "/data-sources/{code}/records/{record_id}",
                get(handlers::get_record)
                    .put(handlers::put_record)
                    .delete(handlers::delete_record),
            )
            .route("/entity-types", get(handlers::list_entity_types))
            .route("/attribute-types", get(handlers::list_attribute_types));

        if config.admin.enabled {
            api = api.merge(admin::setup_admin_router(state.clone()));
        }

        api.with_state(state)
            .layer(middleware::from_fn(track_requests))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            config_id = %self.state.currency.current().id(),
            "HTTP server starting"
        );

        let checks = self.state.currency.spawn_periodic(self.nudges, shutdown.subscribe());
        // Keep the store watcher alive for as long as the server runs
        let _watcher = self.watcher;

        let stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(Shutdown::wait(stop))
            .await?;

        if let Err(e) = checks.await {
            tracing::warn!(error = %e, "Staleness detector task ended abnormally");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Count requests by matched route and status.
async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(route, response.status().as_u16(), start);
    response
}
