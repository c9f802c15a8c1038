//! FieldDB Backend
//!
//! A REST backend for a linguistic fieldwork database: forms, collections and
//! files with structured search, versioned history and restricted records.

mod access;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod query;
mod schema;
mod versioning;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting FieldDB Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    match &config.admin_key {
        Some(secret) => {
            if let Some(key) = repo.ensure_administrator(secret).await? {
                let user_id = key.split('.').next().unwrap_or_default();
                tracing::info!(
                    "Initial administrator authenticates with {}.<FIELDDB_ADMIN_KEY>",
                    user_id
                );
            }
        }
        None => tracing::warn!(
            "No FIELDDB_ADMIN_KEY configured; no administrator is created on an empty database"
        ),
    }

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Forms
        .route("/forms", get(api::list_forms).post(api::create_form))
        .route("/forms/search", post(api::search_forms))
        .route("/forms/new_search", get(api::new_form_search))
        .route(
            "/forms/{id}",
            get(api::get_form).put(api::update_form).delete(api::delete_form),
        )
        .route("/forms/{id}/history", get(api::form_history))
        // Collections
        .route("/collections", get(api::list_collections).post(api::create_collection))
        .route("/collections/search", post(api::search_collections))
        .route("/collections/new_search", get(api::new_collection_search))
        .route(
            "/collections/{id}",
            get(api::get_collection)
                .put(api::update_collection)
                .delete(api::delete_collection),
        )
        .route("/collections/{id}/history", get(api::collection_history))
        // Files
        .route("/files", get(api::list_files).post(api::create_file))
        .route("/files/search", post(api::search_files))
        .route(
            "/files/{id}",
            get(api::get_file).put(api::update_file).delete(api::delete_file),
        )
        // Saved form searches
        .route(
            "/formsearches",
            get(api::list_form_searches).post(api::create_form_search),
        )
        .route("/formsearches/search", post(api::search_form_searches))
        .route("/formsearches/new_search", get(api::new_saved_search_search))
        .route(
            "/formsearches/{id}",
            get(api::get_form_search)
                .put(api::update_form_search)
                .delete(api::delete_form_search),
        )
        .route("/formsearches/{id}/forms", get(api::run_form_search))
        // Backups
        .route("/formbackups", get(api::list_form_backups))
        .route("/formbackups/search", post(api::search_form_backups))
        .route("/formbackups/{id}", get(api::get_form_backup))
        .route("/collectionbackups", get(api::list_collection_backups))
        .route("/collectionbackups/search", post(api::search_collection_backups))
        .route("/collectionbackups/{id}", get(api::get_collection_backup))
        // Tags
        .route("/tags", get(api::list_tags).post(api::create_tag))
        .route("/tags/{id}", put(api::update_tag).delete(api::delete_tag))
        // Speakers, sources, users, settings
        .route("/speakers", get(api::list_speakers).post(api::create_speaker))
        .route("/sources", get(api::list_sources).post(api::create_source))
        .route("/users", get(api::list_users).post(api::create_user))
        .route(
            "/applicationsettings",
            get(api::get_settings).put(api::update_settings),
        )
        // Apply API key auth middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth_layer,
        ));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
