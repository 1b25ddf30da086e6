//! Review eligibility, review CRUD and score aggregation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    NewReview, PageRequest, Paper, PaperRepository, Recommendation, Review, ReviewMetadata,
    ReviewRepository,
};
use crate::error::{AppError, AppResult};
use crate::validation::Validator;
use crate::workflow::{PaperLifecycle, PaperSummary};

pub const COMMENT_LEN: (usize, usize) = (10, 2000);
pub const SCORE_RANGE: (i64, i64) = (1, 10);

/// Reviewer-supplied content, used for both creation and full replacement.
///
/// Score and recommendation are kept loose here so that out-of-range values
/// surface as field-level validation errors.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub comment: String,
    pub score: i64,
    pub recommendation: String,
}

impl ReviewInput {
    fn validate(&self) -> AppResult<(i32, Recommendation)> {
        let mut v = Validator::new();
        v.length("comment", self.comment.trim(), COMMENT_LEN.0, COMMENT_LEN.1)
            .range("score", self.score, SCORE_RANGE.0, SCORE_RANGE.1)
            .one_of("recommendation", &self.recommendation, &Recommendation::ALLOWED);
        v.finish()?;

        let recommendation = self
            .recommendation
            .parse::<Recommendation>()
            .map_err(AppError::BadRequest)?;
        // In range after validation.
        Ok((self.score as i32, recommendation))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperReviews {
    pub paper_id: i64,
    pub reviews: Vec<Review>,
    pub review_count: usize,
    pub average_score: f64,
}

/// Arithmetic mean of the scores; 0 when there are none.
pub fn mean_score(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: i64 = reviews.iter().map(|r| i64::from(r.score)).sum();
    total as f64 / reviews.len() as f64
}

#[derive(Clone)]
pub struct ReviewWorkflow {
    papers: Arc<dyn PaperRepository>,
    reviews: Arc<dyn ReviewRepository>,
    lifecycle: PaperLifecycle,
}

impl ReviewWorkflow {
    pub fn new(
        papers: Arc<dyn PaperRepository>,
        reviews: Arc<dyn ReviewRepository>,
        lifecycle: PaperLifecycle,
    ) -> Self {
        Self {
            papers,
            reviews,
            lifecycle,
        }
    }

    /// Decide whether `reviewer_id` may review `paper_id`.
    ///
    /// Checks run in a fixed order so the reported reason is deterministic:
    /// existence, self-review, reviewable status, duplicate review.
    pub async fn check_eligibility(&self, paper_id: i64, reviewer_id: i64) -> AppResult<Paper> {
        let paper = self.lifecycle.find(paper_id).await?;

        if paper.owner_id == reviewer_id {
            return Err(AppError::Forbidden(
                "Authors cannot review their own papers".to_string(),
            ));
        }
        if !paper.status.is_reviewable() {
            return Err(AppError::InvalidState(format!(
                "Paper is {} and not open for review",
                paper.status
            )));
        }
        if self
            .reviews
            .review_by_paper_and_reviewer(paper_id, reviewer_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "You have already reviewed this paper".to_string(),
            ));
        }
        Ok(paper)
    }

    pub async fn create_review(
        &self,
        paper_id: i64,
        reviewer_id: i64,
        input: ReviewInput,
    ) -> AppResult<Review> {
        let (score, recommendation) = input.validate()?;
        self.check_eligibility(paper_id, reviewer_id).await?;

        let review = self
            .reviews
            .create_review(NewReview {
                paper_id,
                reviewer_id,
                score,
                comment: input.comment.trim().to_string(),
                recommendation,
                metadata: ReviewMetadata::default(),
            })
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::Conflict("You have already reviewed this paper".to_string())
                }
                other => other,
            })?;
        tracing::info!(
            "Review {} filed for paper {} by user {} ({})",
            review.id,
            paper_id,
            reviewer_id,
            review.recommendation.as_str()
        );

        self.lifecycle.advance_on_first_review(paper_id).await?;
        Ok(review)
    }

    pub async fn get_review(&self, review_id: i64) -> AppResult<Review> {
        self.reviews
            .review_by_id(review_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Review".to_string()))
    }

    pub async fn reviews_for_paper(&self, paper_id: i64) -> AppResult<PaperReviews> {
        self.lifecycle.find(paper_id).await?;
        let reviews = self.reviews.reviews_by_paper(paper_id).await?;
        Ok(PaperReviews {
            paper_id,
            review_count: reviews.len(),
            average_score: mean_score(&reviews),
            reviews,
        })
    }

    pub async fn reviews_by_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> AppResult<Vec<Review>> {
        Ok(self.reviews.reviews_by_reviewer(reviewer_id, page).await?)
    }

    /// Author-only full replacement of comment, score and recommendation.
    pub async fn update_review(
        &self,
        review_id: i64,
        requester_id: i64,
        input: ReviewInput,
    ) -> AppResult<Review> {
        let mut review = self.get_review(review_id).await?;
        if review.reviewer_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the reviewer may update this review".to_string(),
            ));
        }
        let (score, recommendation) = input.validate()?;

        review.comment = input.comment.trim().to_string();
        review.score = score;
        review.recommendation = recommendation;

        self.reviews
            .update_review(&review)
            .await?
            .ok_or_else(|| AppError::NotFound("Review".to_string()))
    }

    /// Author-only. The paper keeps its status.
    pub async fn delete_review(&self, review_id: i64, requester_id: i64) -> AppResult<()> {
        let review = self.get_review(review_id).await?;
        if review.reviewer_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the reviewer may delete this review".to_string(),
            ));
        }
        if !self.reviews.delete_review(review_id).await? {
            return Err(AppError::NotFound("Review".to_string()));
        }
        tracing::info!("Review {} deleted by user {}", review_id, requester_id);
        Ok(())
    }

    pub async fn aggregate_score(&self, paper_id: i64) -> AppResult<f64> {
        let reviews = self.reviews.reviews_by_paper(paper_id).await?;
        Ok(mean_score(&reviews))
    }

    /// Open papers the reviewer has not reviewed yet, with owners attached.
    pub async fn list_pending(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> AppResult<Vec<PaperSummary>> {
        let papers = self.papers.pending_for_reviewer(reviewer_id, page).await?;
        self.lifecycle.with_owners(papers).await
    }
}
