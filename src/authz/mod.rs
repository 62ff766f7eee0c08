//! Authorization module - role model evaluation and the strategy aggregate
//!
//! This module implements the role-based engine with support for:
//! - Global roles that apply to every resource including the root
//! - Namespace roles inherited by every descendant of their namespaces
//! - Agent roles scoped to exact agents
//! - Permission implication through the injected catalog

pub mod catalog;
mod evaluator;
pub mod principal;
pub mod store;
pub mod tree;

pub use catalog::{PermissionCatalog, PermissionRegistry};
pub use evaluator::{AccessEvaluator, Decision, EffectiveGrant, Evaluator};
pub use principal::{IdentityProvider, InMemoryIdentityProvider, SubjectIdentity, Target, AUTHENTICATED};
pub use store::{RoleCounts, RoleSnapshot, RoleStore};
pub use tree::{InMemoryResourceTree, PathResourceTree, ResourceTree};

use std::sync::Arc;

use crate::config::AuthzConfig;
use crate::errors::{AuthzError, AuthzResult, PersistenceError};
use crate::models::role::{Role, RoleKind};
use crate::persistence::codec;

/// Well-known role names
pub mod roles {
    pub const ADMIN: &str = "admin";
}

/// Well-known permission names, as registered by [`PermissionCatalog::standard`]
pub mod permissions {
    // Overall
    pub const OVERALL_ADMINISTER: &str = "overall.administer";
    pub const OVERALL_READ: &str = "overall.read";

    // Item
    pub const ITEM_DISCOVER: &str = "item.discover";
    pub const ITEM_READ: &str = "item.read";
    pub const ITEM_BUILD: &str = "item.build";
    pub const ITEM_CONFIGURE: &str = "item.configure";
    pub const ITEM_DELETE: &str = "item.delete";

    // Agent
    pub const AGENT_CONFIGURE: &str = "agent.configure";
    pub const AGENT_CONNECT: &str = "agent.connect";
    pub const AGENT_DELETE: &str = "agent.delete";
}

/// The aggregate root: one role store plus the collaborators needed to
/// validate roles and evaluate checks. Hosts share it as
/// `Arc<AuthorizationStrategy>`; nothing here is process-global.
pub struct AuthorizationStrategy {
    store: RoleStore,
    catalog: PermissionCatalog,
    tree: Arc<dyn ResourceTree>,
    identities: Option<Arc<dyn IdentityProvider>>,
    strict_subjects: bool,
    saves: tokio::sync::Mutex<()>,
}

impl AuthorizationStrategy {
    pub fn new(catalog: PermissionCatalog, tree: Arc<dyn ResourceTree>) -> Self {
        Self {
            store: RoleStore::new(),
            catalog,
            tree,
            identities: None,
            strict_subjects: false,
            saves: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &AuthzConfig, catalog: PermissionCatalog, tree: Arc<dyn ResourceTree>) -> Self {
        Self::new(catalog, tree).with_strict_subjects(config.strict_subjects)
    }

    pub fn with_identity_provider(mut self, identities: Arc<dyn IdentityProvider>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Reject roles naming subjects the identity provider does not know.
    pub fn with_strict_subjects(mut self, strict: bool) -> Self {
        self.strict_subjects = strict;
        self
    }

    /// Seeds the global `admin` role holding `overall.administer` for
    /// `admin_sid`, the configuration of a fresh install.
    pub fn with_initial_admin(self, admin_sid: impl Into<String>) -> AuthzResult<Self> {
        let admin_sid: String = admin_sid.into();
        self.create_role(Role::global(roles::ADMIN, [permissions::OVERALL_ADMINISTER], [admin_sid]))?;
        Ok(self)
    }

    pub fn store(&self) -> &RoleStore {
        &self.store
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn tree(&self) -> &dyn ResourceTree {
        self.tree.as_ref()
    }

    /// Held by storage while it snapshots and writes.
    pub(crate) fn save_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.saves
    }

    fn subject_validator(&self) -> AuthzResult<Option<&dyn IdentityProvider>> {
        if !self.strict_subjects {
            return Ok(None);
        }
        self.identities
            .as_deref()
            .map(Some)
            .ok_or_else(|| AuthzError::configuration("strict subject validation requires an identity provider"))
    }

    fn validate(&self, role: &Role) -> AuthzResult<()> {
        role.validate(&self.catalog, self.subject_validator()?)
    }

    /// Validates `role` against the catalog (and identities when strict)
    /// and adds it to the store.
    pub fn create_role(&self, role: Role) -> AuthzResult<()> {
        self.validate(&role)?;
        self.store.add_role(role)
    }

    pub fn update_role(&self, kind: RoleKind, name: &str, new_role: Role) -> AuthzResult<()> {
        self.validate(&new_role)?;
        self.store.update_role(kind, name, new_role)
    }

    pub fn remove_role(&self, kind: RoleKind, name: &str) -> AuthzResult<Role> {
        self.store.remove_role(kind, name)
    }

    pub fn assign_subjects(&self, kind: RoleKind, name: &str, subjects: &[&str]) -> AuthzResult<()> {
        if let Some(identities) = self.subject_validator()? {
            if let Some(unknown) = subjects.iter().find(|s| !identities.knows(s)) {
                return Err(AuthzError::unknown_subject(*unknown));
            }
        }
        self.store.assign_subjects(kind, name, subjects.iter().copied())
    }

    pub fn unassign_subjects(&self, kind: RoleKind, name: &str, subjects: &[&str]) -> AuthzResult<()> {
        self.store.unassign_subjects(kind, name, subjects.iter().copied())
    }

    /// Allow or deny `permission` on `target` for `identity`. Never fails.
    pub fn check(&self, identity: &SubjectIdentity, permission: &str, target: &Target) -> Decision {
        self.evaluator()
            .check(&self.store.snapshot(), identity, permission, target)
    }

    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.catalog, self.tree.as_ref())
    }

    /// Every grant `identity` holds at `target` with its source role.
    pub fn effective_grants(&self, identity: &SubjectIdentity, target: &Target) -> Vec<EffectiveGrant> {
        self.evaluator().effective_grants(&self.store.snapshot(), identity, target)
    }

    /// Resolves `subject` through the identity provider and checks it.
    /// Subjects the provider cannot resolve are denied.
    pub fn check_subject(&self, subject: &str, permission: &str, target: &Target) -> Decision {
        match self.identities.as_ref().and_then(|ids| ids.resolve(subject)) {
            Some(identity) => self.check(&identity, permission, target),
            None => {
                tracing::debug!(subject = %subject, "unresolved subject denied");
                Decision::Deny
            }
        }
    }

    /// Canonical document for the current snapshot.
    pub fn export_configuration(&self) -> Result<Vec<u8>, PersistenceError> {
        codec::export(&self.store.snapshot())
    }

    /// Decodes a document without installing it.
    pub fn import_configuration(&self, bytes: &[u8]) -> Result<RoleSnapshot, PersistenceError> {
        codec::import(bytes, &self.catalog).map(|decoded| decoded.snapshot)
    }

    /// Decodes a document and installs it as one swap.
    pub fn load_configuration(&self, bytes: &[u8]) -> Result<RoleCounts, PersistenceError> {
        let snapshot = self.import_configuration(bytes)?;
        let counts = snapshot.counts();
        self.store.replace_all(snapshot);
        Ok(counts)
    }
}

impl AccessEvaluator for AuthorizationStrategy {
    fn check(&self, identity: &SubjectIdentity, permission: &str, target: &Target) -> Decision {
        AuthorizationStrategy::check(self, identity, permission, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> AuthorizationStrategy {
        let tree = InMemoryResourceTree::new();
        tree.add_namespace("/folder");
        AuthorizationStrategy::new(PermissionCatalog::standard(), Arc::new(tree))
    }

    #[test]
    fn initial_admin_can_administer() {
        let strategy = strategy().with_initial_admin("root-user").unwrap();
        let admin = SubjectIdentity::new("root-user");
        assert!(strategy.check(&admin, permissions::OVERALL_ADMINISTER, &Target::Root).is_allowed());
        assert!(strategy.check(&admin, permissions::ITEM_DELETE, &Target::item("/folder")).is_allowed());
        assert_eq!(strategy.store().counts().global, 1);
    }

    #[test]
    fn create_rejects_unknown_permission() {
        let strategy = strategy();
        let err = strategy
            .create_role(Role::global("weird", ["job.teleport"], ["alice"]))
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownPermission(p) if p == "job.teleport"));
        assert!(strategy.store().snapshot().is_empty());
    }

    #[test]
    fn unknown_subjects_accepted_by_default() {
        let strategy = strategy();
        strategy
            .create_role(Role::global("read", [permissions::OVERALL_READ], ["not-yet-provisioned"]))
            .unwrap();
    }

    #[test]
    fn strict_subjects_consult_identity_provider() {
        let identities = InMemoryIdentityProvider::new();
        identities.add_user("user1", ["devs"]);
        let strategy = strategy()
            .with_identity_provider(Arc::new(identities))
            .with_strict_subjects(true);

        strategy
            .create_role(Role::global("read", [permissions::OVERALL_READ], ["devs", AUTHENTICATED]))
            .unwrap();
        let err = strategy
            .create_role(Role::global("ghosts", [permissions::OVERALL_READ], ["ghost"]))
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownSubject(s) if s == "ghost"));

        let err = strategy
            .assign_subjects(RoleKind::Global, "read", &["user1", "ghost"])
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownSubject(_)));
        assert!(!strategy.store().get(RoleKind::Global, "read").unwrap().has_subject("user1"));
    }

    #[test]
    fn strict_without_provider_is_a_configuration_error() {
        let strategy = strategy().with_strict_subjects(true);
        let err = strategy
            .create_role(Role::global("read", [permissions::OVERALL_READ], ["x"]))
            .unwrap_err();
        assert!(matches!(err, AuthzError::Configuration(_)));
    }

    #[test]
    fn deleting_role_revokes_grants() {
        let strategy = strategy();
        let dev = SubjectIdentity::new("dev");
        strategy
            .create_role(Role::namespace("read", [permissions::ITEM_READ], ["/folder"], ["dev"]))
            .unwrap();
        assert!(strategy.check(&dev, permissions::ITEM_READ, &Target::item("/folder")).is_allowed());

        strategy.remove_role(RoleKind::Namespace, "read").unwrap();
        assert!(!strategy.check(&dev, permissions::ITEM_READ, &Target::item("/folder")).is_allowed());
    }

    #[test]
    fn check_subject_resolves_groups() {
        let identities = InMemoryIdentityProvider::new();
        identities.add_user("user1", Vec::<String>::new());
        let strategy = strategy().with_identity_provider(Arc::new(identities));
        strategy
            .create_role(Role::global("read", [permissions::OVERALL_READ], [AUTHENTICATED]))
            .unwrap();

        assert!(strategy.check_subject("user1", permissions::OVERALL_READ, &Target::Root).is_allowed());
        assert!(!strategy.check_subject("stranger", permissions::OVERALL_READ, &Target::Root).is_allowed());
    }
}
