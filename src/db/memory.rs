//! In-memory implementation of the repositories.
//!
//! All tables live behind one `RwLock` so that multi-table operations
//! (cascading deletes, the pending-review set difference) see a consistent
//! snapshot. Data is lost on restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    NewPaper, NewReview, NewUser, PageRequest, Paper, PaperRepository, PaperStatus, Review,
    ReviewRepository, StoreError, User, UserRepository,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    papers: BTreeMap<i64, Paper>,
    reviews: BTreeMap<i64, Review>,
    next_user_id: i64,
    next_paper_id: i64,
    next_review_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T>(rows: impl Iterator<Item = T>, page: PageRequest) -> Vec<T> {
    rows.skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(format!("email {}", user.email)));
        }
        let id = Tables::next_id(&mut tables.next_user_id);
        let user = User {
            id,
            email: user.email,
            name: user.name,
            role: user.role,
            institution: user.institution,
            created_at: Utc::now(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl PaperRepository for InMemoryStore {
    async fn create_paper(&self, paper: NewPaper) -> Result<Paper, StoreError> {
        let mut tables = self.tables.write().await;
        let id = Tables::next_id(&mut tables.next_paper_id);
        let now = Utc::now();
        let paper = Paper {
            id,
            title: paper.title,
            abstract_text: paper.abstract_text,
            authors: paper.authors,
            keywords: paper.keywords,
            category: paper.category,
            status: PaperStatus::Draft,
            owner_id: paper.owner_id,
            created_at: now,
            updated_at: now,
        };
        tables.papers.insert(id, paper.clone());
        Ok(paper)
    }

    async fn paper_by_id(&self, id: i64) -> Result<Option<Paper>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.papers.get(&id).cloned())
    }

    async fn update_paper(&self, paper: &Paper) -> Result<Option<Paper>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.papers.get_mut(&paper.id) else {
            return Ok(None);
        };
        stored.title = paper.title.clone();
        stored.abstract_text = paper.abstract_text.clone();
        stored.authors = paper.authors.clone();
        stored.keywords = paper.keywords.clone();
        stored.category = paper.category.clone();
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_paper(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.papers.remove(&id).is_none() {
            return Ok(false);
        }
        tables.reviews.retain(|_, review| review.paper_id != id);
        Ok(true)
    }

    async fn list_papers(&self, page: PageRequest) -> Result<Vec<Paper>, StoreError> {
        let tables = self.tables.read().await;
        Ok(paginate(tables.papers.values().cloned(), page))
    }

    async fn papers_by_owner(
        &self,
        owner_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .papers
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn papers_by_status(
        &self,
        status: PaperStatus,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .papers
            .values()
            .filter(|p| p.status == status)
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn search_papers(
        &self,
        query: &str,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let needle = query.to_lowercase();
        let tables = self.tables.read().await;
        let rows = tables
            .papers
            .values()
            .filter(|p| {
                p.title.to_lowercase().contains(&needle)
                    || p.abstract_text.to_lowercase().contains(&needle)
            })
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn pending_for_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Paper>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .papers
            .values()
            .filter(|p| p.status.is_reviewable())
            .filter(|p| {
                !tables
                    .reviews
                    .values()
                    .any(|r| r.paper_id == p.id && r.reviewer_id == reviewer_id)
            })
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn transition_status(
        &self,
        id: i64,
        from: PaperStatus,
        to: PaperStatus,
    ) -> Result<Option<Paper>, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.papers.get_mut(&id) {
            Some(paper) if paper.status == from => {
                paper.status = to;
                paper.updated_at = Utc::now();
                Ok(Some(paper.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ReviewRepository for InMemoryStore {
    async fn create_review(&self, review: NewReview) -> Result<Review, StoreError> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .reviews
            .values()
            .any(|r| r.paper_id == review.paper_id && r.reviewer_id == review.reviewer_id);
        if taken {
            return Err(StoreError::Duplicate(format!(
                "review of paper {} by user {}",
                review.paper_id, review.reviewer_id
            )));
        }
        let id = Tables::next_id(&mut tables.next_review_id);
        let now = Utc::now();
        let review = Review {
            id,
            paper_id: review.paper_id,
            reviewer_id: review.reviewer_id,
            score: review.score,
            comment: review.comment,
            recommendation: review.recommendation,
            metadata: review.metadata,
            created_at: now,
            updated_at: now,
        };
        tables.reviews.insert(id, review.clone());
        Ok(review)
    }

    async fn review_by_id(&self, id: i64) -> Result<Option<Review>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.reviews.get(&id).cloned())
    }

    async fn update_review(&self, review: &Review) -> Result<Option<Review>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.reviews.get_mut(&review.id) else {
            return Ok(None);
        };
        stored.comment = review.comment.clone();
        stored.score = review.score;
        stored.recommendation = review.recommendation;
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_review(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.reviews.remove(&id).is_some())
    }

    async fn reviews_by_paper(&self, paper_id: i64) -> Result<Vec<Review>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .filter(|r| r.paper_id == paper_id)
            .cloned()
            .collect())
    }

    async fn reviews_by_reviewer(
        &self,
        reviewer_id: i64,
        page: PageRequest,
    ) -> Result<Vec<Review>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .reviews
            .values()
            .filter(|r| r.reviewer_id == reviewer_id)
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn review_by_paper_and_reviewer(
        &self,
        paper_id: i64,
        reviewer_id: i64,
    ) -> Result<Option<Review>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .find(|r| r.paper_id == paper_id && r.reviewer_id == reviewer_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Recommendation, ReviewMetadata, Role};

    fn new_paper(owner_id: i64, title: &str) -> NewPaper {
        NewPaper {
            owner_id,
            title: title.to_string(),
            abstract_text: "An abstract about graph rewriting".to_string(),
            authors: vec!["Ada".to_string()],
            keywords: vec![],
            category: "cs".to_string(),
        }
    }

    fn new_review(paper_id: i64, reviewer_id: i64) -> NewReview {
        NewReview {
            paper_id,
            reviewer_id,
            score: 7,
            comment: "Solid contribution".to_string(),
            recommendation: Recommendation::Accept,
            metadata: ReviewMetadata::default(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        let user = NewUser {
            email: "ada@example.org".into(),
            name: "Ada".into(),
            role: Role::Researcher,
            institution: String::new(),
        };
        store.create_user(user.clone()).await.unwrap();
        let err = store.create_user(user).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn second_review_for_same_pair_is_a_duplicate() {
        let store = InMemoryStore::new();
        let paper = store.create_paper(new_paper(1, "Paper")).await.unwrap();
        store.create_review(new_review(paper.id, 2)).await.unwrap();
        let err = store.create_review(new_review(paper.id, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store.create_review(new_review(paper.id, 3)).await.is_ok());
    }

    #[tokio::test]
    async fn transition_only_applies_from_the_expected_status() {
        let store = InMemoryStore::new();
        let paper = store.create_paper(new_paper(1, "Paper")).await.unwrap();

        let moved = store
            .transition_status(paper.id, PaperStatus::Submitted, PaperStatus::UnderReview)
            .await
            .unwrap();
        assert!(moved.is_none());

        let moved = store
            .transition_status(paper.id, PaperStatus::Draft, PaperStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(moved.map(|p| p.status), Some(PaperStatus::Submitted));
    }

    #[tokio::test]
    async fn update_never_writes_status() {
        let store = InMemoryStore::new();
        let mut paper = store.create_paper(new_paper(1, "Paper")).await.unwrap();
        store
            .transition_status(paper.id, PaperStatus::Draft, PaperStatus::Submitted)
            .await
            .unwrap();

        paper.title = "Renamed".into();
        let updated = store.update_paper(&paper).await.unwrap().unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.status, PaperStatus::Submitted);
    }

    #[tokio::test]
    async fn deleting_a_paper_removes_its_reviews() {
        let store = InMemoryStore::new();
        let paper = store.create_paper(new_paper(1, "Paper")).await.unwrap();
        let review = store.create_review(new_review(paper.id, 2)).await.unwrap();

        assert!(store.delete_paper(paper.id).await.unwrap());
        assert!(store.review_by_id(review.id).await.unwrap().is_none());
        assert!(!store.delete_paper(paper.id).await.unwrap());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_over_title_and_abstract() {
        let store = InMemoryStore::new();
        store.create_paper(new_paper(1, "Lattice Methods")).await.unwrap();
        store.create_paper(new_paper(1, "Other")).await.unwrap();

        let by_title = store
            .search_papers("lattice", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(by_title.len(), 1);

        let by_abstract = store
            .search_papers("GRAPH", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(by_abstract.len(), 2);
    }

    #[tokio::test]
    async fn listing_honours_the_page_window() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .create_paper(new_paper(1, &format!("Paper {}", i)))
                .await
                .unwrap();
        }
        let page = store
            .list_papers(PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        let titles: Vec<_> = page.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Paper 2", "Paper 3"]);
    }
}
