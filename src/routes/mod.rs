use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, Request, Response, Uri},
    middleware,
    routing::get,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::{error::AppError, middleware::throttle::throttle, state::AppState};

pub mod admin;
pub mod basket;
pub mod catalog;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod partner;
pub mod user;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/user", user::router())
        .nest("/partner", partner::router())
        .merge(catalog::router())
        .nest("/basket", basket::router())
        .nest("/order", orders::router())
        .nest("/admin", admin::router())
}

/// The full application: API, docs, health check and the HTTP middleware stack.
pub fn build_app(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "request started"
            );
        })
        .on_response(|response: &Response<_>, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                status = %response.status(),
                ms = %latency.as_millis(),
                "request finished"
            );
        });

    let api = create_api_router().layer(middleware::from_fn_with_state(state.clone(), throttle));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(ConcurrencyLimitLayer::new(100))
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    tracing::debug!(path = uri.path(), "no route");
    AppError::NotFound
}
