//! services/api/src/bin/api.rs

use api_lib::{
    adapters::db::DbAdapter,
    config::Config,
    error::ApiError,
    roast_worker::{RoastWorker, RoastWorkerSettings},
    web::{
        archive_pact_handler, check_in_handler, create_pact_handler, due_handler,
        pact_limit_handler, require_auth, rest::ApiDoc, stats_handler, state::AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use pact_engine_core::CheckInRecorder;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Start the Roast Worker ---
    let shutdown = CancellationToken::new();
    let (roast_worker, roast_handle) = RoastWorker::spawn(
        db_adapter.clone(),
        RoastWorkerSettings {
            max_attempts: config.roast_max_attempts,
            backoff: config.roast_retry_backoff,
            capacity: config.roast_queue_capacity,
        },
        shutdown.clone(),
    );

    // --- 4. Build the Shared AppState ---
    let recorder = CheckInRecorder::new(
        db_adapter.clone(),
        Arc::new(roast_worker),
        config.check_in_policy(),
    );
    let app_state = Arc::new(AppState {
        store: db_adapter.clone(),
        subscriptions: db_adapter.clone(),
        identity: db_adapter,
        recorder,
        config: config.clone(),
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Every engine route needs a resolved caller.
    let protected_routes = Router::new()
        .route("/pacts/{pact_id}/due", get(due_handler))
        .route("/pacts/{pact_id}/check-ins", post(check_in_handler))
        .route("/pacts/{pact_id}/stats", get(stats_handler))
        .route("/pacts/{pact_id}/archive", post(archive_pact_handler))
        .route("/groups/{group_id}/pact-limit", get(pact_limit_handler))
        .route("/groups/{group_id}/pacts", post(create_pact_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 7. Let the roast worker finish what is queued ---
    info!("Server stopped. Draining roast queue...");
    shutdown.cancel();
    roast_handle
        .await
        .map_err(|e| ApiError::Internal(format!("Roast worker panicked: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
