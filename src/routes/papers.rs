use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{PageRequest, Paper, PaperStatus};
use crate::error::{AppError, AppResult};
use crate::response::{lenient_number, PageQuery, Reply};
use crate::routes::Requester;
use crate::state::AppState;
use crate::validation::FieldError;
use crate::workflow::{PaperChanges, PaperDetail, PaperInput};

#[derive(Debug, Default, Deserialize)]
pub struct PaperListQuery {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<u32>,
    #[serde(default, alias = "limit", deserialize_with = "lenient_number")]
    pub page_size: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
}

pub async fn list_papers(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    query: Result<Query<PaperListQuery>, QueryRejection>,
) -> AppResult<Reply<Vec<Paper>>> {
    let Query(query) = query?;
    let page = PageRequest::new(query.page, query.page_size);

    let papers = match (query.search.as_deref(), query.status.as_deref()) {
        (Some(text), _) if !text.trim().is_empty() => state.papers.search(text, page).await?,
        (_, Some(status)) if !status.is_empty() => {
            let status = status.parse::<PaperStatus>().map_err(|message| {
                AppError::Validation(vec![FieldError {
                    field: "status".to_string(),
                    message,
                }])
            })?;
            state.papers.list_by_status(status, page).await?
        }
        _ => state.papers.list(page).await?,
    };
    Ok(Reply::page(papers, page))
}

pub async fn my_papers(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Reply<Vec<Paper>>> {
    let Query(query) = query?;
    let page = PageRequest::from(query);
    let papers = state.papers.list_by_owner(requester.id(), page).await?;
    Ok(Reply::page(papers, page))
}

pub async fn create_paper(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    payload: Result<Json<PaperInput>, JsonRejection>,
) -> AppResult<Reply<Paper>> {
    let Json(input) = payload?;
    let paper = state.papers.create(requester.id(), input).await?;
    Ok(Reply::created(paper))
}

pub async fn get_paper(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<PaperDetail>> {
    let Path(paper_id) = path?;
    Ok(Reply::ok(state.papers.get(paper_id).await?))
}

pub async fn update_paper(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PaperChanges>, JsonRejection>,
) -> AppResult<Reply<Paper>> {
    let Path(paper_id) = path?;
    let Json(changes) = payload?;
    let paper = state.papers.update(paper_id, requester.id(), changes).await?;
    Ok(Reply::ok(paper))
}

pub async fn delete_paper(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(paper_id) = path?;
    state.papers.delete(paper_id, requester.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_paper(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<Paper>> {
    let Path(paper_id) = path?;
    let paper = state.papers.submit(paper_id, requester.id()).await?;
    Ok(Reply::ok(paper))
}
