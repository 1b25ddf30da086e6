//! PostgreSQL implementation of the repositories.
//!
//! Author and keyword lists and review metadata are stored as JSONB; they are
//! converted to the domain types when rows are read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use super::{
    DbPool, NewPaper, NewReview, NewUser, PageRequest, Paper, PaperRepository, PaperStatus,
    Review, ReviewMetadata, ReviewRepository, StoreError, User, UserRepository,
};

const PAPER_COLUMNS: &str = "id, title, abstract, authors, keywords, category, status, owner_id, created_at, updated_at";
const REVIEW_COLUMNS: &str = "id, paper_id, reviewer_id, score, comment, recommendation, metadata, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    role: String,
    institution: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            institution: row.institution,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaperRow {
    id: i64,
    title: String,
    #[sqlx(rename = "abstract")]
    abstract_text: String,
    authors: Json<Vec<String>>,
    keywords: Json<Vec<String>>,
    category: String,
    status: String,
    owner_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaperRow> for Paper {
    type Error = StoreError;

    fn try_from(row: PaperRow) -> Result<Self, Self::Error> {
        Ok(Paper {
            id: row.id,
            title: row.title,
            abstract_text: row.abstract_text,
            authors: row.authors.0,
            keywords: row.keywords.0,
            category: row.category,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: i64,
    paper_id: i64,
    reviewer_id: i64,
    score: i32,
    comment: String,
    recommendation: String,
    metadata: Json<ReviewMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Review {
            id: row.id,
            paper_id: row.paper_id,
            reviewer_id: row.reviewer_id,
            score: row.score,
            comment: row.comment,
            recommendation: row.recommendation.parse().map_err(StoreError::Corrupt)?,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_domain<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Map unique-constraint violations onto [`StoreError::Duplicate`].
fn classify(err: sqlx::Error, what: &str) -> StoreError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StoreError::Duplicate(what.to_string()),
        _ => StoreError::Database(err),
    }
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_papers(
        &self,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, PaperRow, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Paper>, StoreError> {
        let rows = query.fetch_all(self.pool.as_ref()).await?;
        into_domain(rows)
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, name, role, institution)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, role, institution, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(&user.institution)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| classify(e, &format!("email {}", user.email)))?;
        row.try_into()
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, institution, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, institution, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(User::try_from)
        .transpose()
    }
}

#[async_trait]
impl PaperRepository for PgStore {
    async fn create_paper(&self, paper: NewPaper) -> Result<Paper, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO papers (title, abstract, authors, keywords, category, status, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PAPER_COLUMNS
        );
        let row = sqlx::query_as::<_, PaperRow>(&sql)
            .bind(&paper.title)
            .bind(&paper.abstract_text)
            .bind(Json(&paper.authors))
            .bind(Json(&paper.keywords))
            .bind(&paper.category)
            .bind(PaperStatus::Draft.as_str())
            .bind(paper.owner_id)
            .fetch_one(self.pool.as_ref())
            .await?;
        row.try_into()
    }

    async fn paper_by_id(&self, id: i64) -> Result<Option<Paper>, StoreError> {
        let sql = format!("SELECT {} FROM papers WHERE id = $1", PAPER_COLUMNS);
        sqlx::query_as::<_, PaperRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Paper::try_from)
            .transpose()
    }

    async fn update_paper(&self, paper: &Paper) -> Result<Option<Paper>, StoreError> {
        let sql = format!(
            r#"
            UPDATE papers
            SET title = $2, abstract = $3, authors = $4, keywords = $5, category = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAPER_COLUMNS
        );
        sqlx::query_as::<_, PaperRow>(&sql)
            .bind(paper.id)
            .bind(&paper.title)
            .bind(&paper.abstract_text)
            .bind(Json(&paper.authors))
            .bind(Json(&paper.keywords))
            .bind(&paper.category)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Paper::try_from)
            .transpose()
    }

    async fn delete_paper(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM papers WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_papers(&self, page: PageRequest) -> Result<Vec<Paper>, StoreError> {
        let sql = format!(
            "SELECT {} FROM papers ORDER BY id LIMIT $1 OFFSET $2",
            PAPER_COLUMNS
        );
        self.fetch_papers(
            sqlx::query_as::<_, PaperRow>(&sql)
                .bind(page.limit())
                .bind(page.offset()),
        )
        .await
    }

    async fn papers_by_owner(
        &self,
        owner_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let sql = format!(
            "SELECT {} FROM papers WHERE owner_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            PAPER_COLUMNS
        );
        self.fetch_papers(
            sqlx::query_as::<_, PaperRow>(&sql)
                .bind(owner_id)
                .bind(page.limit())
                .bind(page.offset()),
        )
        .await
    }

    async fn papers_by_status(
        &self,
        status: PaperStatus,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let sql = format!(
            "SELECT {} FROM papers WHERE status = $1 ORDER BY id LIMIT $2 OFFSET $3",
            PAPER_COLUMNS
        );
        self.fetch_papers(
            sqlx::query_as::<_, PaperRow>(&sql)
                .bind(status.as_str())
                .bind(page.limit())
                .bind(page.offset()),
        )
        .await
    }

    async fn search_papers(
        &self,
        query: &str,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM papers
            WHERE title ILIKE $1 OR abstract ILIKE $1
            ORDER BY id LIMIT $2 OFFSET $3
            "#,
            PAPER_COLUMNS
        );
        let pattern = format!("%{}%", escape_like(query));
        self.fetch_papers(
            sqlx::query_as::<_, PaperRow>(&sql)
                .bind(pattern)
                .bind(page.limit())
                .bind(page.offset()),
        )
        .await
    }

    async fn pending_for_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM papers p
            WHERE p.status IN ('submitted', 'under_review')
              AND NOT EXISTS (
                SELECT 1 FROM reviews r WHERE r.paper_id = p.id AND r.reviewer_id = $1
              )
            ORDER BY p.id LIMIT $2 OFFSET $3
            "#,
            PAPER_COLUMNS
        );
        self.fetch_papers(
            sqlx::query_as::<_, PaperRow>(&sql)
                .bind(reviewer_id)
                .bind(page.limit())
                .bind(page.offset()),
        )
        .await
    }

    async fn transition_status(
        &self,
        id: i64,
        from: PaperStatus,
        to: PaperStatus,
    ) -> Result<Option<Paper>, StoreError> {
        let sql = format!(
            r#"
            UPDATE papers SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            PAPER_COLUMNS
        );
        sqlx::query_as::<_, PaperRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Paper::try_from)
            .transpose()
    }
}

#[async_trait]
impl ReviewRepository for PgStore {
    async fn create_review(&self, review: NewReview) -> Result<Review, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO reviews (paper_id, reviewer_id, score, comment, recommendation, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        );
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(review.paper_id)
            .bind(review.reviewer_id)
            .bind(review.score)
            .bind(&review.comment)
            .bind(review.recommendation.as_str())
            .bind(Json(&review.metadata))
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(|e| {
                classify(
                    e,
                    &format!(
                        "review of paper {} by user {}",
                        review.paper_id, review.reviewer_id
                    ),
                )
            })?;
        row.try_into()
    }

    async fn review_by_id(&self, id: i64) -> Result<Option<Review>, StoreError> {
        let sql = format!("SELECT {} FROM reviews WHERE id = $1", REVIEW_COLUMNS);
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Review::try_from)
            .transpose()
    }

    async fn update_review(&self, review: &Review) -> Result<Option<Review>, StoreError> {
        let sql = format!(
            r#"
            UPDATE reviews
            SET comment = $2, score = $3, recommendation = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        );
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(review.id)
            .bind(&review.comment)
            .bind(review.score)
            .bind(review.recommendation.as_str())
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Review::try_from)
            .transpose()
    }

    async fn delete_review(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reviews_by_paper(&self, paper_id: i64) -> Result<Vec<Review>, StoreError> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE paper_id = $1 ORDER BY id",
            REVIEW_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(paper_id)
            .fetch_all(self.pool.as_ref())
            .await?;
        into_domain(rows)
    }

    async fn reviews_by_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Review>, StoreError> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE reviewer_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            REVIEW_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(reviewer_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool.as_ref())
            .await?;
        into_domain(rows)
    }

    async fn review_by_paper_and_reviewer(
        &self,
        paper_id: i64,
        reviewer_id: i64,
    ) -> Result<Option<Review>, StoreError> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE paper_id = $1 AND reviewer_id = $2",
            REVIEW_COLUMNS
        );
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(paper_id)
            .bind(reviewer_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Review::try_from)
            .transpose()
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn unknown_status_in_a_row_is_reported_as_corrupt() {
        let now = Utc::now();
        let row = PaperRow {
            id: 1,
            title: "t".into(),
            abstract_text: "a".into(),
            authors: Json(vec!["x".into()]),
            keywords: Json(vec![]),
            category: "c".into(),
            status: "rejected".into(),
            owner_id: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(Paper::try_from(row), Err(StoreError::Corrupt(_))));
    }
}
