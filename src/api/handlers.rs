//! REST API handlers
//!
//! These handlers share one [`Dashboard`] and its backend.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::dashboard::{Dashboard, DashboardRender};
use crate::models::{FilterOptions, FilterRequest};

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

pub type AppState = Arc<Dashboard>;

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/v1/filters
pub async fn get_filters(
    State(dashboard): State<AppState>,
) -> Result<Json<FilterOptions>, ApiError> {
    match dashboard.load_options().await {
        Ok(options) => Ok(Json(options)),
        Err(e) => Err(error(StatusCode::BAD_GATEWAY, e)),
    }
}

/// POST /api/v1/dashboard
pub async fn render_dashboard(
    State(dashboard): State<AppState>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<DashboardRender>, ApiError> {
    // Reject an inverted range before the options query goes out
    let filter = request
        .into_spec()
        .and_then(|filter| filter.validate().map(|()| filter))
        .map_err(|e| error(StatusCode::BAD_REQUEST, e))?;

    // Without option universes every selection is treated as a narrowing filter
    let options = match dashboard.load_options().await {
        Ok(options) => options,
        Err(e) => {
            warn!("Filter options unavailable, rendering without them: {}", e.cause);
            FilterOptions::default()
        }
    };

    match dashboard.render(&filter, &options).await {
        Ok(render) => Ok(Json(render)),
        Err(e) => Err(error(StatusCode::BAD_REQUEST, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_rest_router;
    use crate::backend::FixtureBackend;
    use crate::catalog::View;
    use crate::dashboard::EngineSettings;
    use crate::models::AggregateRow;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(backend: FixtureBackend) -> axum::Router {
        create_rest_router(Arc::new(Dashboard::new(
            Arc::new(backend),
            EngineSettings::default(),
        )))
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_dashboard(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/dashboard")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(FixtureBackend::new()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_filters() {
        let backend = FixtureBackend::new().with_rows(
            View::FilterOptions,
            vec![
                AggregateRow::new().with("field", "member_casual").with("value", "casual"),
                AggregateRow::new().with("field", "member_casual").with("value", "member"),
            ],
        );
        let request = Request::builder().uri("/api/v1/filters").body(Body::empty()).unwrap();
        let (status, body) = send(app(backend), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rider_types"], serde_json::json!(["casual", "member"]));
    }

    #[tokio::test]
    async fn test_filters_backend_failure() {
        let backend = FixtureBackend::new().with_failure(View::FilterOptions, "unreachable");
        let request = Request::builder().uri("/api/v1/filters").body(Body::empty()).unwrap();
        let (status, body) = send(app(backend), request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_inverted_range_is_bad_request() {
        let backend = Arc::new(FixtureBackend::new().with_rows(View::FilterOptions, vec![]));
        let app = create_rest_router(Arc::new(Dashboard::new(
            backend.clone(),
            EngineSettings::default(),
        )));
        let request = post_dashboard(serde_json::json!({
            "start": "2024-03-01",
            "end": "2024-01-01"
        }));
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());
        assert!(backend.received().is_empty());
    }

    #[tokio::test]
    async fn test_non_scalar_value_is_bad_request() {
        let request = post_dashboard(serde_json::json!({
            "start": "2024-01-01",
            "end": "2024-01-31",
            "rider_types": [{"nested": true}]
        }));
        let (status, _) = send(app(FixtureBackend::new()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_degraded_view_still_renders() {
        let backend = FixtureBackend::new()
            .with_rows(
                View::RiderMix,
                vec![AggregateRow::new().with("member_casual", "member").with("trip_count", 10i64)],
            )
            .with_failure(View::TopStations, "quota exceeded");
        let request = post_dashboard(serde_json::json!({
            "start": "2024-01-01",
            "end": "2024-01-31",
            "rider_types": ["member"]
        }));
        let (status, body) = send(app(backend), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tables"]["Top Start Stations"], serde_json::json!([]));
        assert_eq!(body["tables"]["Trips by Rider Type"][0]["trip_count"], 10);
        assert_eq!(body["failures"][0]["view"], "top_stations");
        assert_eq!(body["filter"]["grain"], "daily");
    }
}
