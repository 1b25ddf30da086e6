//! The review workflow core: paper lifecycle, review eligibility and
//! aggregation, and the account lookups they rely on.

pub mod accounts;
pub mod lifecycle;
pub mod reviews;

pub use accounts::{Accounts, Registration};
pub use lifecycle::{PaperChanges, PaperDetail, PaperInput, PaperLifecycle, PaperSummary};
pub use reviews::{PaperReviews, ReviewInput, ReviewWorkflow};
