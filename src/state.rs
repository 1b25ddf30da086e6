use crate::config::Config;
use crate::db::Repositories;
use crate::workflow::{Accounts, PaperLifecycle, ReviewWorkflow};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Accounts,
    pub papers: PaperLifecycle,
    pub reviews: ReviewWorkflow,
}

impl AppState {
    pub fn new(config: Arc<Config>, repos: Repositories) -> Self {
        let papers = PaperLifecycle::new(
            repos.papers.clone(),
            repos.reviews.clone(),
            repos.users.clone(),
        );
        let reviews = ReviewWorkflow::new(repos.papers, repos.reviews, papers.clone());
        Self {
            config,
            accounts: Accounts::new(repos.users),
            papers,
            reviews,
        }
    }
}
