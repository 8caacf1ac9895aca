use crate::controller::{health_check_controller, status_controller};
use crate::{ws::handler, AppState};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use log::*;
use service::config::Config;
use tower_http::cors::CorsLayer;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Hanbase API"
        ),
        paths(
            health_check_controller::health_check,
            status_controller::index,
            status_controller::realtime,
        ),
        tags(
            (name = "hanbase", description = "Hanbase multi-tenant backend API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(status_routes(app_state.clone()))
        .merge(health_routes(app_state.clone()))
        .merge(realtime_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(cors)
}

fn status_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(status_controller::index))
        .route("/realtime/status", get(status_controller::realtime))
        .with_state(app_state)
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

// Realtime sessions are scoped by project name only; no bearer token is checked.
fn realtime_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws/{project}", get(handler::ws_handler))
        .with_state(app_state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use realtime::{Hub, HubConfig, HubHandle, ProjectId, Session};
    use sea_orm::DatabaseConnection;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config::try_parse_from(["hanbase"]).unwrap()
    }

    fn app_state(db: DatabaseConnection) -> (AppState, CancellationToken) {
        let shutdown = CancellationToken::new();
        let (hub, hub_loop) = Hub::new(HubConfig::default());
        tokio::spawn(hub_loop.run(shutdown.clone()));
        let state = AppState::new(test_config(), &Arc::new(db), hub, shutdown.clone());
        (state, shutdown)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn wait_for_sessions(hub: &HubHandle, project: &ProjectId, count: usize) {
        let mut stats = hub.subscribe_stats();
        timeout(
            Duration::from_secs(5),
            stats.wait_for(|s| s.sessions_in(project) == count),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_index_returns_running_banner() {
        let (state, _shutdown) = app_state(DatabaseConnection::Disconnected);

        let (status, body) = get(define_routes(state), "/").await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"status": "success", "message": "Hanbase System is Running!"})
        );
    }

    #[tokio::test]
    async fn test_realtime_status_reports_sessions_per_project() {
        let (state, _shutdown) = app_state(DatabaseConnection::Disconnected);
        let shop = ProjectId::from("shop");
        let (session, _queue) = Session::new(shop.clone(), 4);
        state.hub.register(session).await.unwrap();
        wait_for_sessions(&state.hub, &shop, 1).await;

        let (status, body) = get(define_routes(state), "/realtime/status").await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({"sessions": 1, "projects": {"shop": 1}}));
    }

    #[tokio::test]
    async fn test_health_check_reports_unreachable_database() {
        let (state, _shutdown) = app_state(DatabaseConnection::Disconnected);

        let (status, _) = get(define_routes(state), "/health").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_health_check_reports_healthy_database() {
        use sea_orm::{DatabaseBackend, MockDatabase};

        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (state, _shutdown) = app_state(db);

        let (status, body) = get(define_routes(state), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"healthy");
    }

    #[tokio::test]
    async fn test_realtime_route_requires_websocket_upgrade() {
        let (state, _shutdown) = app_state(DatabaseConnection::Disconnected);

        let (status, _) = get(define_routes(state), "/ws/shop").await;

        assert!(status.is_client_error(), "unexpected status {status}");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let (state, _shutdown) = app_state(DatabaseConnection::Disconnected);
        let origin = state.config.allowed_origins[0].clone();

        let request = Request::builder()
            .uri("/realtime/status")
            .header(header::ORIGIN, &origin)
            .body(Body::empty())
            .unwrap();
        let response = define_routes(state).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_str(&origin).unwrap())
        );
    }
}
