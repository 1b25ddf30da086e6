//! JSON envelopes shared by every endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::db::PageRequest;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageRequest>,
}

impl Meta {
    fn now(pagination: Option<PageRequest>) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
            pagination,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Meta::now(None),
        }
    }

    pub fn paginated(data: T, page: PageRequest) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Meta::now(Some(page)),
        }
    }

    pub fn failure(
        code: &str,
        message: String,
        details: Option<serde_json::Value>,
    ) -> ApiResponse<T> {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message,
                details,
            }),
            meta: Meta::now(None),
        }
    }
}

/// A success envelope paired with its status code.
pub struct Reply<T: Serialize>(pub StatusCode, pub ApiResponse<T>);

impl<T: Serialize> Reply<T> {
    pub fn ok(data: T) -> Self {
        Reply(StatusCode::OK, ApiResponse::success(data))
    }

    pub fn created(data: T) -> Self {
        Reply(StatusCode::CREATED, ApiResponse::success(data))
    }

    pub fn page(data: T, page: PageRequest) -> Self {
        Reply(StatusCode::OK, ApiResponse::paginated(data, page))
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (self.0, axum::Json(self.1)).into_response()
    }
}

/// Paging query string: `?page=2&page_size=20` (`limit` is accepted too).
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<u32>,
    #[serde(default, alias = "limit", deserialize_with = "lenient_number")]
    pub page_size: Option<u32>,
}

/// Reads a paging parameter as text. Anything that is not a non-negative
/// integer becomes `None` so the window falls back to its default.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(query.page, query.page_size)
    }
}
