use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

use crate::db::User;
use crate::error::AppResult;
use crate::response::Reply;
use crate::routes::Requester;
use crate::state::AppState;
use crate::workflow::Registration;

pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> AppResult<Reply<User>> {
    let Json(registration) = payload?;
    let user = state.accounts.register(registration).await?;
    Ok(Reply::created(user))
}

pub async fn me(requester: Requester) -> Reply<User> {
    Reply::ok(requester.0)
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<User>> {
    let Path(user_id) = path?;
    Ok(Reply::ok(state.accounts.lookup(user_id).await?))
}
