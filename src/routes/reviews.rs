use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{PageRequest, Review};
use crate::error::AppResult;
use crate::response::{PageQuery, Reply};
use crate::routes::Requester;
use crate::state::AppState;
use crate::workflow::{PaperReviews, PaperSummary, ReviewInput};

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub paper_id: i64,
    #[serde(flatten)]
    pub review: ReviewInput,
}

#[derive(Debug, Serialize)]
pub struct Eligibility {
    pub paper_id: i64,
    pub eligible: bool,
}

#[derive(Debug, Serialize)]
pub struct PaperScore {
    pub paper_id: i64,
    pub average_score: f64,
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    payload: Result<Json<CreateReviewRequest>, JsonRejection>,
) -> AppResult<Reply<Review>> {
    let Json(request) = payload?;
    let review = state
        .reviews
        .create_review(request.paper_id, requester.id(), request.review)
        .await?;
    Ok(Reply::created(review))
}

pub async fn get_review(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<Review>> {
    let Path(review_id) = path?;
    Ok(Reply::ok(state.reviews.get_review(review_id).await?))
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ReviewInput>, JsonRejection>,
) -> AppResult<Reply<Review>> {
    let Path(review_id) = path?;
    let Json(input) = payload?;
    let review = state
        .reviews
        .update_review(review_id, requester.id(), input)
        .await?;
    Ok(Reply::ok(review))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(review_id) = path?;
    state.reviews.delete_review(review_id, requester.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_reviews(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Reply<Vec<Review>>> {
    let Query(query) = query?;
    let page = PageRequest::from(query);
    let reviews = state.reviews.reviews_by_reviewer(requester.id(), page).await?;
    Ok(Reply::page(reviews, page))
}

pub async fn pending_reviews(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Reply<Vec<PaperSummary>>> {
    let Query(query) = query?;
    let page = PageRequest::from(query);
    let papers = state.reviews.list_pending(requester.id(), page).await?;
    Ok(Reply::page(papers, page))
}

pub async fn paper_reviews(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<PaperReviews>> {
    let Path(paper_id) = path?;
    Ok(Reply::ok(state.reviews.reviews_for_paper(paper_id).await?))
}

pub async fn paper_score(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<PaperScore>> {
    let Path(paper_id) = path?;
    state.papers.find(paper_id).await?;
    let average_score = state.reviews.aggregate_score(paper_id).await?;
    Ok(Reply::ok(PaperScore {
        paper_id,
        average_score,
    }))
}

pub async fn eligibility(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Reply<Eligibility>> {
    let Path(paper_id) = path?;
    state
        .reviews
        .check_eligibility(paper_id, requester.id())
        .await?;
    Ok(Reply::ok(Eligibility {
        paper_id,
        eligible: true,
    }))
}
