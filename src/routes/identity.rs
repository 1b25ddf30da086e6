use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::db::User;
use crate::error::AppError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The user making the request, resolved from the `X-User-Id` header through
/// the identity lookup.
#[derive(Debug, Clone)]
pub struct Requester(pub User);

impl Requester {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Requester {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthenticated("X-User-Id header required".to_string()))?;

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| AppError::Unauthenticated("Malformed X-User-Id header".to_string()))?;

        match state.accounts.lookup(user_id).await {
            Ok(user) => Ok(Requester(user)),
            Err(AppError::NotFound(_)) => {
                Err(AppError::Unauthenticated("Unknown user".to_string()))
            }
            Err(other) => Err(other),
        }
    }
}
