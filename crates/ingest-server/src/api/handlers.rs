//! Read-only handlers over the storage contract

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use ingest_common::types::IngestedPost;
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::error::AppError;

pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Raw pagination parameters; malformed values fall back to defaults
#[derive(Debug, Default)]
pub struct ListPostsParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListPostsParams {
    /// Collect from raw query pairs; the first occurrence of a key wins
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "limit" => {
                    params.limit.get_or_insert(value);
                },
                "offset" => {
                    params.offset.get_or_insert(value);
                },
                _ => {},
            }
        }
        params
    }

    /// Limit overrides the default only when it is an integer > 0
    pub fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|&n| n > 0)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    /// Offset overrides the default only when it is an integer >= 0
    pub fn offset(&self) -> usize {
        self.offset
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|&n| n >= 0)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct PostsPage {
    pub posts: Vec<IngestedPost>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })),
    )
}

/// GET /posts?limit=10&offset=0
pub async fn list_posts(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let params = ListPostsParams::from_pairs(pairs);
    let limit = params.limit();
    let offset = params.offset();

    let posts = state.storage.get_posts(limit, offset).await?;

    Ok(Json(PostsPage {
        count: posts.len(),
        posts,
        limit,
        offset,
    })
    .into_response())
}

/// GET /posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid post ID".to_string()))?;

    match state.storage.get_post_by_id(id).await? {
        Some(post) => Ok(Json(post).into_response()),
        None => {
            tracing::debug!(id, "Post not found");
            Err(AppError::NotFound("Post not found".to_string()))
        },
    }
}

/// GET /posts/ (empty id)
pub async fn missing_post_id() -> AppError {
    AppError::BadRequest("Invalid post ID".to_string())
}

/// GET /status
pub async fn ingestion_status(State(state): State<AppState>) -> Result<Response, AppError> {
    let status = state.storage.get_ingestion_status().await?;
    Ok(Json(status).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: Option<&str>, offset: Option<&str>) -> ListPostsParams {
        ListPostsParams {
            limit: limit.map(str::to_string),
            offset: offset.map(str::to_string),
        }
    }

    #[test]
    fn test_pagination_defaults() {
        let p = ListPostsParams::default();
        assert_eq!(p.limit(), 10);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_invalid_pagination_falls_back() {
        assert_eq!(params(Some("-1"), None).limit(), 10);
        assert_eq!(params(Some("0"), None).limit(), 10);
        assert_eq!(params(Some("ten"), None).limit(), 10);
        assert_eq!(params(None, Some("-5")).offset(), 0);
        assert_eq!(params(None, Some("x")).offset(), 0);
    }

    #[test]
    fn test_valid_pagination_is_used() {
        let p = params(Some("25"), Some("0"));
        assert_eq!(p.limit(), 25);
        assert_eq!(p.offset(), 0);
        assert_eq!(params(None, Some("40")).offset(), 40);
    }

    #[test]
    fn test_first_duplicate_value_wins() {
        let pairs = [
            ("limit", "3"),
            ("offset", "2"),
            ("limit", "5"),
            ("offset", "oops"),
            ("page", "9"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string()));

        let p = ListPostsParams::from_pairs(pairs);
        assert_eq!(p.limit(), 3);
        assert_eq!(p.offset(), 2);
    }
}
