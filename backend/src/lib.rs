//! FIFO inventory costing and allocation
//!
//! Cost layers per receipt, oldest-first consumption, backorders priced at an
//! estimate and settled at actual cost once stock arrives.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes());

    with_middleware(router).with_state(state)
}

fn with_middleware<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn report_router() -> Router {
        let report = get(|| async { "layer,quantity,unit_cost\n".repeat(64) });
        with_middleware(Router::new().route("/report", report))
    }

    #[tokio::test]
    async fn test_responses_are_gzipped_when_accepted() {
        let request = Request::builder()
            .uri("/report")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();

        let response = report_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_identity_without_accept_encoding() {
        let request = Request::builder().uri("/report").body(Body::empty()).unwrap();

        let response = report_router().oneshot(request).await.unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }
}
