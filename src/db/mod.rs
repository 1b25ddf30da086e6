//! Persistence for users, papers and reviews.
//!
//! The workflow only sees the repository traits below. Two backends
//! implement them: [`PgStore`] for PostgreSQL and [`InMemoryStore`] for
//! tests and throwaway deployments.

mod memory;
mod models;
mod postgres;

pub use memory::InMemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};

pub type DbPool = Arc<PgPool>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// A stored row could not be mapped back into the domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait PaperRepository: Send + Sync {
    async fn create_paper(&self, paper: NewPaper) -> Result<Paper, StoreError>;

    async fn paper_by_id(&self, id: i64) -> Result<Option<Paper>, StoreError>;

    /// Persist title, abstract, authors, keywords and category.
    ///
    /// The status column is never written here; use
    /// [`PaperRepository::transition_status`] for that.
    async fn update_paper(&self, paper: &Paper) -> Result<Option<Paper>, StoreError>;

    /// Remove a paper and its reviews. Returns whether a row existed.
    async fn delete_paper(&self, id: i64) -> Result<bool, StoreError>;

    async fn list_papers(&self, page: PageRequest) -> Result<Vec<Paper>, StoreError>;

    async fn papers_by_owner(
        &self,
        owner_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError>;

    async fn papers_by_status(
        &self,
        status: PaperStatus,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError>;

    /// Case-insensitive substring match on title or abstract.
    async fn search_papers(&self, query: &str, page: PageRequest)
        -> Result<Vec<Paper>, StoreError>;

    /// Reviewable papers the reviewer has not reviewed yet.
    async fn pending_for_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError>;

    /// Compare-and-set on the stored status. Returns `Some(paper)` with the
    /// new status when the stored value was `from`, `None` otherwise.
    async fn transition_status(
        &self,
        id: i64,
        from: PaperStatus,
        to: PaperStatus,
    ) -> Result<Option<Paper>, StoreError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the reviewer already has a
    /// review for the paper.
    async fn create_review(&self, review: NewReview) -> Result<Review, StoreError>;

    async fn review_by_id(&self, id: i64) -> Result<Option<Review>, StoreError>;

    /// Persist comment, score and recommendation.
    async fn update_review(&self, review: &Review) -> Result<Option<Review>, StoreError>;

    async fn delete_review(&self, id: i64) -> Result<bool, StoreError>;

    async fn reviews_by_paper(&self, paper_id: i64) -> Result<Vec<Review>, StoreError>;

    async fn reviews_by_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Review>, StoreError>;

    /// Existence probe: `None` when the pair has no review.
    async fn review_by_paper_and_reviewer(
        &self,
        paper_id: i64,
        reviewer_id: i64,
    ) -> Result<Option<Review>, StoreError>;
}

/// The three repositories, as handed to the workflow components.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub papers: Arc<dyn PaperRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            users: store.clone(),
            papers: store.clone(),
            reviews: store,
        }
    }

    pub fn postgres(pool: DbPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            users: store.clone(),
            papers: store.clone(),
            reviews: store,
        }
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Build the repositories selected by the configuration, connecting and
/// migrating the database when PostgreSQL is in use.
pub async fn open(config: &Config) -> Result<Repositories, StoreError> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Ok(Repositories::in_memory())
        }
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.max_connections).await?;
            run_migrations(pool.as_ref()).await?;
            tracing::info!("Database connected and migrated");
            Ok(Repositories::postgres(pool))
        }
    }
}
