pub mod authz;
pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;

// Re-export commonly used items for hosts and tests
pub use authz::{AccessEvaluator, AuthorizationStrategy, Decision, SubjectIdentity, Target};
pub use config::AuthzConfig;
pub use errors::{AuthzError, AuthzResult, PersistenceError};
pub use models::role::{Role, RoleKind};
