//! REST API handlers
//!
//! Two surfaces share this router: the configuration API consumed by
//! the administrative UI (scheduler status and updates) and the content
//! read API consumed by the presentation layer (article listings and
//! slug lookups). Configuration validation failures are the only errors
//! surfaced synchronously; everything else in the generation pipeline
//! is contained by the scheduler loop.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCategory};
use crate::models::{Article, ArticleSummary, Topic};
use crate::scheduler::{ConfigUpdate, SchedulerStatus};
use crate::storage::ArticleFilter;

use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Scheduler status as reported to the administrative surface
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub articles_per_day: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub topics: Vec<Topic>,
    pub state: String,
}

impl From<SchedulerStatus> for StatusResponse {
    fn from(status: SchedulerStatus) -> Self {
        Self {
            enabled: status.enabled,
            articles_per_day: status.articles_per_day,
            last_run_at: status.last_run_at,
            next_run_at: status.next_run_at,
            topics: status.topics,
            state: status.state.to_string(),
        }
    }
}

/// Query parameters for article listings
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub include_drafts: bool,
    pub limit: Option<usize>,
}

impl ListQuery {
    fn into_filter(self) -> ArticleFilter {
        ArticleFilter {
            category: self.category,
            tag: self.tag,
            include_drafts: self.include_drafts,
            limit: self.limit,
        }
    }
}

/// Map a pipeline error to its HTTP response
///
/// Configuration validation failures are the caller's fault and come
/// back as 400; everything else is a server-side failure.
fn error_response(err: Error) -> axum::response::Response {
    let status = match err.category() {
        ErrorCategory::Config => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Configuration surface
        .route("/api/scheduler/status", get(get_scheduler_status))
        .route("/api/scheduler/config", put(update_scheduler_config))
        // Content read surface
        .route("/api/articles", get(list_articles))
        .route("/api/articles/{slug}", get(get_article_by_slug))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

/// Report scheduler configuration and run state
async fn get_scheduler_status(State(state): State<AppState>) -> axum::response::Response {
    match state.scheduler.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(ApiResponse::success(StatusResponse::from(status))),
        )
            .into_response(),
        Err(e) => error_response(e.into()),
    }
}

/// Apply a sparse configuration update
///
/// Out-of-range `articles_per_day` is silently clamped; malformed
/// topic entries are rejected with 400 and nothing is written.
async fn update_scheduler_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> axum::response::Response {
    if let Err(e) = state.config_store.update(update).await {
        return error_response(e.into());
    }

    match state.scheduler.status().await {
        Ok(status) => (
            StatusCode::OK,
            Json(ApiResponse::success(StatusResponse::from(status))),
        )
            .into_response(),
        Err(e) => error_response(e.into()),
    }
}

/// List article summaries, newest published first
async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    match state.articles.list(&query.into_filter()).await {
        Ok(articles) => {
            let summaries: Vec<ArticleSummary> = articles.iter().map(Article::summary).collect();
            (StatusCode::OK, Json(ApiResponse::success(summaries))).into_response()
        }
        Err(e) => error_response(e.into()),
    }
}

/// Fetch a full article by slug, counting the view
async fn get_article_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    match state.articles.get_by_slug(&slug).await {
        Ok(Some(article)) => (StatusCode::OK, Json(ApiResponse::success(article))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("article not found: {slug}"))),
        )
            .into_response(),
        Err(e) => error_response(e.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RunState;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response() {
        let response = ErrorResponse::new("test error");
        assert!(!response.success);
        assert_eq!(response.error, "test error");
    }

    #[test]
    fn test_status_response_from_scheduler_status() {
        let status = SchedulerStatus {
            enabled: true,
            articles_per_day: 2,
            last_run_at: None,
            next_run_at: None,
            topics: vec![Topic::new("Neighborhoods", vec!["Tetherow"])],
            state: RunState::Idle,
            loop_running: true,
        };

        let response = StatusResponse::from(status);
        assert!(response.enabled);
        assert_eq!(response.articles_per_day, 2);
        assert_eq!(response.state, "idle");
        assert_eq!(response.topics.len(), 1);
    }

    #[test]
    fn test_error_response_status_mapping() {
        let bad_request = error_response(
            crate::scheduler::SchedulerError::invalid_config("topics", "empty category").into(),
        );
        assert_eq!(bad_request.status(), StatusCode::BAD_REQUEST);

        let server_error =
            error_response(crate::storage::StorageError::duplicate_slug("some-slug").into());
        assert_eq!(server_error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_list_query_into_filter() {
        let query = ListQuery {
            category: Some("Neighborhoods".to_string()),
            tag: None,
            include_drafts: true,
            limit: Some(5),
        };

        let filter = query.into_filter();
        assert_eq!(filter.category.as_deref(), Some("Neighborhoods"));
        assert!(filter.include_drafts);
        assert_eq!(filter.limit, Some(5));
    }
}
