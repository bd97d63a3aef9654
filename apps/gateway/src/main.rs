//! Permitra gateway composition root.

#![forbid(unsafe_code)]

mod dev_seed;
mod dto;
mod error;
mod gateway_config;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::routing::{delete, get, post};
use permitra_application::{
    GrantNotifier, GrantSnapshotService, GrantSyncService, RelationDirectory, RoleAdminService,
};
use permitra_core::AppError;
use permitra_infrastructure::{
    HttpRelationDirectory, HttpSessionService, InMemoryRelationDirectory, TracingGrantNotifier,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::gateway_config::{DirectoryProviderConfig, GatewayConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    gateway_config::init_tracing();

    let config = GatewayConfig::load()?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))?;

    let mut session_service = None;
    let directory: Arc<dyn RelationDirectory> = match &config.directory_provider {
        DirectoryProviderConfig::Http(http) => {
            let auth_service =
                HttpSessionService::new(http_client.clone(), http.auth_api_url.clone());
            let auth_service = Arc::new(match &http.service_credentials {
                Some(credentials) => auth_service
                    .with_credentials(credentials.username.clone(), credentials.password.clone()),
                None => auth_service,
            });
            session_service = Some(auth_service.clone());

            Arc::new(
                HttpRelationDirectory::new(http_client.clone(), http.reference_api_url.clone())
                    .with_refresher(auth_service),
            )
        }
        DirectoryProviderConfig::Memory => {
            let directory = Arc::new(InMemoryRelationDirectory::new());
            dev_seed::run(&directory).await?;
            directory
        }
    };

    let notifier: Arc<dyn GrantNotifier> = Arc::new(TracingGrantNotifier::new());
    let app_state = AppState {
        snapshot_service: GrantSnapshotService::new(directory.clone()),
        sync_service: GrantSyncService::new(directory.clone(), notifier),
        role_admin_service: RoleAdminService::new(directory.clone()),
        directory,
        session_service,
    };

    let protected_routes = Router::new()
        .route(
            "/api/roles",
            get(handlers::list_roles_handler).post(handlers::create_role_handler),
        )
        .route("/api/roles/{role_id}", delete(handlers::delete_role_handler))
        .route(
            "/api/roles/{role_id}/grants",
            get(handlers::get_role_grants_handler).put(handlers::update_role_grants_handler),
        )
        .route("/api/permissions", get(handlers::list_permissions_handler))
        .route("/api/restrictions", get(handlers::list_restrictions_handler))
        .route_layer(from_fn(middleware::require_session));

    let cors_layer = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.frontend_url).map_err(|error| {
            AppError::Internal(format!("invalid FRONTEND_URL: {error}"))
        })?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(middleware::APPLICATION_SCOPE_HEADER),
        ]);

    let app = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/auth/login", post(handlers::login_handler))
        .route("/auth/refresh", post(handlers::refresh_session_handler))
        .merge(protected_routes)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "permitra-gateway listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("gateway server error: {error}")))
}
