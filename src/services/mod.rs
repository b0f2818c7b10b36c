//! Core services
//!
//! The mutation plane: referential integrity, the tree engine, identity
//! links, the suggestion workflow, and user management. Each service owns
//! its slice of the document store; the HTTP layer only binds inputs and
//! applies the role guards.

pub mod identity;
pub mod integrity;
pub mod profile;
pub mod suggestions;
pub mod tree;
pub mod users;

pub use identity::{IdentityService, MyClaimStatus};
pub use integrity::IntegrityService;
pub use profile::{NameMatchAdapter, NoopProfileFetcher, ProfileFetcher};
pub use suggestions::{
    BatchReviewResult, CreateSuggestionRequest, SuggestionGroup, SuggestionService, SuggestionView,
};
pub use tree::{CreatePersonRequest, TreeService, UpdatePersonRequest};
pub use users::{AuthOutcome, RegisterRequest, UserPublic, UserService, UserSummary};
