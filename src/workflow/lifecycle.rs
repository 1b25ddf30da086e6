//! Paper lifecycle: creation, owner-only edits, and the status machine
//!
//! ```text
//! draft --submit--> submitted --(first review)--> under_review --> published
//! ```
//!
//! Status is only ever changed through a compare-and-set on the stored value,
//! so the explicit submit and the implicit advance on first review cannot
//! overwrite each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{
    NewPaper, PageRequest, Paper, PaperRepository, PaperStatus, Review, ReviewRepository, User,
    UserRepository,
};
use crate::error::{AppError, AppResult};
use crate::validation::Validator;

pub const TITLE_LEN: (usize, usize) = (5, 200);
pub const ABSTRACT_LEN: (usize, usize) = (50, 2000);

#[derive(Debug, Clone, Deserialize)]
pub struct PaperInput {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub category: String,
}

/// Partial update. `None`, a blank string or an empty list leaves the
/// attribute as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperChanges {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub category: Option<String>,
}

impl PaperChanges {
    /// Folds blank strings and empty lists into `None`.
    fn supplied(self) -> Self {
        fn text(value: Option<String>) -> Option<String> {
            value.filter(|s| !s.trim().is_empty())
        }
        fn list(value: Option<Vec<String>>) -> Option<Vec<String>> {
            value.filter(|l| !l.is_empty())
        }
        Self {
            title: text(self.title),
            abstract_text: text(self.abstract_text),
            authors: list(self.authors),
            keywords: list(self.keywords),
            category: text(self.category),
        }
    }
}

/// A paper together with its owner and the reviews filed against it.
#[derive(Debug, Clone, Serialize)]
pub struct PaperDetail {
    #[serde(flatten)]
    pub paper: Paper,
    pub owner: Option<User>,
    pub reviews: Vec<Review>,
}

/// A paper with its owner's profile attached, as listed to reviewers.
#[derive(Debug, Clone, Serialize)]
pub struct PaperSummary {
    #[serde(flatten)]
    pub paper: Paper,
    pub owner: Option<User>,
}

fn check_title(v: &mut Validator, title: &str) {
    v.length("title", title.trim(), TITLE_LEN.0, TITLE_LEN.1);
}

fn check_abstract(v: &mut Validator, text: &str) {
    v.length("abstract", text.trim(), ABSTRACT_LEN.0, ABSTRACT_LEN.1);
}

#[derive(Clone)]
pub struct PaperLifecycle {
    papers: Arc<dyn PaperRepository>,
    reviews: Arc<dyn ReviewRepository>,
    users: Arc<dyn UserRepository>,
}

impl PaperLifecycle {
    pub fn new(
        papers: Arc<dyn PaperRepository>,
        reviews: Arc<dyn ReviewRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            papers,
            reviews,
            users,
        }
    }

    pub async fn create(&self, owner_id: i64, input: PaperInput) -> AppResult<Paper> {
        let mut v = Validator::new();
        check_title(&mut v, &input.title);
        check_abstract(&mut v, &input.abstract_text);
        v.non_empty_list("authors", &input.authors)
            .required("category", &input.category);
        v.finish()?;

        let paper = self
            .papers
            .create_paper(NewPaper {
                owner_id,
                title: input.title.trim().to_string(),
                abstract_text: input.abstract_text.trim().to_string(),
                authors: input.authors,
                keywords: input.keywords,
                category: input.category.trim().to_string(),
            })
            .await?;
        tracing::info!("Paper {} created by user {}", paper.id, owner_id);
        Ok(paper)
    }

    /// Load a paper or fail with `NotFound`.
    pub async fn find(&self, paper_id: i64) -> AppResult<Paper> {
        self.papers
            .paper_by_id(paper_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Paper".to_string()))
    }

    pub async fn get(&self, paper_id: i64) -> AppResult<PaperDetail> {
        let paper = self.find(paper_id).await?;
        let owner = self.users.user_by_id(paper.owner_id).await?;
        let reviews = self.reviews.reviews_by_paper(paper_id).await?;
        Ok(PaperDetail {
            paper,
            owner,
            reviews,
        })
    }

    /// Attach owner profiles, looking each distinct owner up once.
    pub async fn with_owners(&self, papers: Vec<Paper>) -> AppResult<Vec<PaperSummary>> {
        let mut owners: BTreeMap<i64, Option<User>> = BTreeMap::new();
        let mut summaries = Vec::with_capacity(papers.len());
        for paper in papers {
            let owner = match owners.get(&paper.owner_id) {
                Some(owner) => owner.clone(),
                None => {
                    let owner = self.users.user_by_id(paper.owner_id).await?;
                    owners.insert(paper.owner_id, owner.clone());
                    owner
                }
            };
            summaries.push(PaperSummary { paper, owner });
        }
        Ok(summaries)
    }

    pub async fn list(&self, page: PageRequest) -> AppResult<Vec<Paper>> {
        Ok(self.papers.list_papers(page).await?)
    }

    pub async fn list_by_owner(&self, owner_id: i64, page: PageRequest) -> AppResult<Vec<Paper>> {
        Ok(self.papers.papers_by_owner(owner_id, page).await?)
    }

    pub async fn list_by_status(
        &self,
        status: PaperStatus,
        page: PageRequest,
    ) -> AppResult<Vec<Paper>> {
        Ok(self.papers.papers_by_status(status, page).await?)
    }

    pub async fn search(&self, query: &str, page: PageRequest) -> AppResult<Vec<Paper>> {
        Ok(self.papers.search_papers(query.trim(), page).await?)
    }

    /// Owner-only; moves a draft to `submitted`.
    pub async fn submit(&self, paper_id: i64, requester_id: i64) -> AppResult<Paper> {
        let paper = self.find(paper_id).await?;
        if paper.owner_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the owner may submit this paper".to_string(),
            ));
        }
        if paper.status != PaperStatus::Draft {
            return Err(AppError::InvalidState(format!(
                "Paper is {}, only draft papers can be submitted",
                paper.status
            )));
        }

        match self
            .papers
            .transition_status(paper_id, PaperStatus::Draft, PaperStatus::Submitted)
            .await?
        {
            Some(paper) => {
                tracing::info!("Paper {} submitted for review", paper_id);
                Ok(paper)
            }
            // Lost a race with a concurrent transition or delete.
            None => match self.papers.paper_by_id(paper_id).await? {
                Some(current) => Err(AppError::InvalidState(format!(
                    "Paper is {}, only draft papers can be submitted",
                    current.status
                ))),
                None => Err(AppError::NotFound("Paper".to_string())),
            },
        }
    }

    /// Owner-only partial update of the descriptive fields. Never touches
    /// status.
    pub async fn update(
        &self,
        paper_id: i64,
        requester_id: i64,
        changes: PaperChanges,
    ) -> AppResult<Paper> {
        let mut paper = self.find(paper_id).await?;
        if paper.owner_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the owner may update this paper".to_string(),
            ));
        }
        let changes = changes.supplied();

        let mut v = Validator::new();
        if let Some(title) = &changes.title {
            check_title(&mut v, title);
        }
        if let Some(text) = &changes.abstract_text {
            check_abstract(&mut v, text);
        }
        if let Some(authors) = &changes.authors {
            v.non_empty_list("authors", authors);
        }
        if let Some(category) = &changes.category {
            v.required("category", category);
        }
        v.finish()?;

        if let Some(title) = changes.title {
            paper.title = title.trim().to_string();
        }
        if let Some(text) = changes.abstract_text {
            paper.abstract_text = text.trim().to_string();
        }
        if let Some(authors) = changes.authors {
            paper.authors = authors;
        }
        if let Some(keywords) = changes.keywords {
            paper.keywords = keywords;
        }
        if let Some(category) = changes.category {
            paper.category = category.trim().to_string();
        }

        self.papers
            .update_paper(&paper)
            .await?
            .ok_or_else(|| AppError::NotFound("Paper".to_string()))
    }

    /// Owner-only. Reviews go with the paper at the storage layer.
    pub async fn delete(&self, paper_id: i64, requester_id: i64) -> AppResult<()> {
        let paper = self.find(paper_id).await?;
        if paper.owner_id != requester_id {
            return Err(AppError::Unauthorized(
                "Only the owner may delete this paper".to_string(),
            ));
        }
        if !self.papers.delete_paper(paper_id).await? {
            return Err(AppError::NotFound("Paper".to_string()));
        }
        tracing::info!("Paper {} deleted by user {}", paper_id, requester_id);
        Ok(())
    }

    /// `submitted -> under_review`. Any other status is left alone.
    pub async fn advance_on_first_review(&self, paper_id: i64) -> AppResult<()> {
        if let Some(paper) = self
            .papers
            .transition_status(paper_id, PaperStatus::Submitted, PaperStatus::UnderReview)
            .await?
        {
            tracing::info!("Paper {} is now {}", paper.id, paper.status);
        }
        Ok(())
    }
}
