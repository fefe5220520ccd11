//! services/api/src/bin/api.rs

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    Router,
};
use medi_api::{
    adapters::{
        DbAdapter, GeminiTextAdapter, SupabaseAuthAdapter, SupabaseEndpoint,
        SupabaseStorageAdapter,
    },
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use medi_core::ports::Services;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
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

    // --- 2. Connect to the Database ---
    // The schema belongs to the hosted backend; nothing is migrated from here.
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder().build()?;
    let supabase = SupabaseEndpoint::new(http, &config.supabase_url, &config.supabase_anon_key);
    let auth_adapter = Arc::new(SupabaseAuthAdapter::new(supabase.clone()));
    let storage_adapter = Arc::new(SupabaseStorageAdapter::new(supabase));
    let text_adapter = Arc::new(GeminiTextAdapter::connect(
        &config.gemini_base_url,
        &config.gemini_api_key,
        config.gemini_model.clone(),
    ));
    info!(model = %config.gemini_model, "Text generation configured.");

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(Services {
        auth: auth_adapter,
        db: db_adapter,
        storage: storage_adapter,
        llm: text_adapter,
        buckets: config.buckets.clone(),
    }));
    app_state.spawn_idle_sweep(config.session_idle);

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = router(app_state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors);

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
    axum::serve(listener, app).await?;

    Ok(())
}
