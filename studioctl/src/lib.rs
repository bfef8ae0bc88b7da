//! # studioctl: creation workflow for a children's creative studio
//!
//! `studioctl` is the server side of a creative studio where children make pictures, stories and
//! songs. Every creation request passes a quota check before a generation provider is called,
//! and every result is kept as a creation record.
//!
//! ## Architecture
//!
//! ```text
//!  client ──→ /api/v1/creations/* ──→ CreationWorkflow
//!                                        │ 1. auth (RequestContext)
//!                                        │ 2. validate
//!                                        │ 3. QuotaLedger::check_and_reserve ──→ Store
//!                                        │ 4. Providers (image / story / music)
//!                                        │ 5. CreationStore::create_creation ──→ Store
//!
//!  music provider ──→ /webhooks/music ──→ completion::apply_event ──→ Store
//! ```
//!
//! - [`quota`]: per-tier quota policies, checked and debited atomically by the store
//! - [`providers`]: adapters for the image, story and music generation services
//! - [`workflow`]: the quota-then-generate orchestrator
//! - [`completion`]: music callbacks and the client-side record poller
//! - [`db`]: the storage traits with Postgres and in-memory backends
//! - [`api`]: HTTP handlers and request/response models
//! - [`auth`]: session tokens, proxy header authentication and tier permissions
//!
//! ## Usage
//!
//! ```no_run
//! use studioctl::{Application, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let app = Application::new(config).await?;
//! app.serve(async { tokio::signal::ctrl_c().await.unwrap() }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod completion;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod providers;
pub mod quota;
pub mod telemetry;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub mod test_utils;

use crate::config::CorsOrigin;
use crate::db::Store;
use crate::openapi::ApiDoc;
use crate::providers::Providers;
use crate::quota::QuotaLedger;
use crate::workflow::CreationWorkflow;
use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::bon;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub ledger: QuotaLedger,
    pub workflow: CreationWorkflow,
}

#[bon]
impl AppState {
    /// Wire the ledger and the workflow over one store
    #[builder]
    pub fn new(config: Config, store: Arc<dyn Store>, providers: Providers) -> Self {
        let ledger = QuotaLedger::new(store.clone(), &config.quota);
        let workflow = CreationWorkflow::new(store.clone(), ledger.clone(), providers, config.music_callback_url());
        Self {
            config,
            store,
            ledger,
            workflow,
        }
    }
}

/// Get the studioctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: the `/api/v1` surface, the music callback, health, docs and
/// (when enabled) Prometheus metrics, wrapped in CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers;

    let api_routes = Router::new()
        // Accounts
        .route("/accounts/current", get(handlers::accounts::get_current_account))
        .route("/accounts/current/usage", get(handlers::accounts::get_current_usage))
        .route("/accounts/{id}", patch(handlers::accounts::update_account))
        // Check and reserve, for clients that gate their own features
        .route("/usage/track", post(handlers::usage::track_usage))
        // Creations
        .route("/creations", get(handlers::creations::list_creations))
        .route("/creations/{id}", get(handlers::creations::get_creation))
        .route("/creations/images", post(handlers::creations::create_image))
        .route("/creations/stories", post(handlers::creations::continue_story))
        .route("/creations/music", post(handlers::creations::submit_music))
        // Organizations
        .route("/organizations", post(handlers::organizations::create_organization))
        .route("/organizations/{id}", get(handlers::organizations::get_organization))
        .route("/organizations/{id}", patch(handlers::organizations::update_organization))
        .route("/organizations/{id}/usage", get(handlers::organizations::get_organization_usage))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        // Provider callbacks (not part of the client API docs)
        .route("/webhooks/music", post(handlers::callbacks::music_callback))
        .with_state(state.clone())
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router, the store and the configuration.
///
/// 1. **Create**: [`Application::new`] connects the store (running migrations for Postgres)
///    and builds the provider adapters
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting studio with configuration: {:#?}", config);

        let store = db::connect(&config.database).await?;
        let providers = providers::create_providers(&config.providers)?;
        if config.providers.callback_secret.is_none() {
            info!("No providers.callback_secret configured; music callbacks are not authenticated");
        }

        let app_state = AppState::builder()
            .config(config.clone())
            .store(store)
            .providers(providers)
            .build();
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Studio listening on http://{}, available at {}", bind_addr, self.config.public_url);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
