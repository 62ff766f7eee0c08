use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::authz::catalog::PermissionCatalog;
use crate::authz::principal::{IdentityProvider, SubjectIdentity};
use crate::authz::tree::normalize_path;
use crate::errors::{AuthzError, AuthzResult};

// =============================================================================
// ROLE KIND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Global,
    Namespace,
    Agent,
}

impl RoleKind {
    pub const ALL: [RoleKind; 3] = [RoleKind::Global, RoleKind::Namespace, RoleKind::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Global => "global",
            RoleKind::Namespace => "namespace",
            RoleKind::Agent => "agent",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ROLE SCOPE
// =============================================================================

/// Where a role applies. The variant decides the role kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    Global,
    /// Full namespace paths; each entry covers its whole subtree.
    Namespaces(HashSet<String>),
    /// Exact agent ids, no inheritance.
    Agents(HashSet<String>),
}

impl RoleScope {
    pub fn kind(&self) -> RoleKind {
        match self {
            RoleScope::Global => RoleKind::Global,
            RoleScope::Namespaces(_) => RoleKind::Namespace,
            RoleScope::Agents(_) => RoleKind::Agent,
        }
    }

    pub fn ids(&self) -> Option<&HashSet<String>> {
        match self {
            RoleScope::Global => None,
            RoleScope::Namespaces(ids) | RoleScope::Agents(ids) => Some(ids),
        }
    }
}

// =============================================================================
// ROLE
// =============================================================================

/// Immutable role value. Edits produce a new value through the `with_*`
/// methods; nothing mutates a role that a snapshot already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    name: String,
    permissions: HashSet<String>,
    subjects: HashSet<String>,
    scope: RoleScope,
}

impl Role {
    pub fn global<P, S>(name: impl Into<String>, permissions: P, subjects: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: collect(permissions),
            subjects: collect(subjects),
            scope: RoleScope::Global,
        }
    }

    /// Namespace ids are normalized, so `folder` and `/folder/` name the same scope.
    pub fn namespace<P, N, S>(name: impl Into<String>, permissions: P, namespaces: N, subjects: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let namespaces = namespaces
            .into_iter()
            .map(|ns| normalize_path(&ns.into()))
            .collect();
        Self {
            name: name.into(),
            permissions: collect(permissions),
            subjects: collect(subjects),
            scope: RoleScope::Namespaces(namespaces),
        }
    }

    pub fn agent<P, A, S>(name: impl Into<String>, permissions: P, agents: A, subjects: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: collect(permissions),
            subjects: collect(subjects),
            scope: RoleScope::Agents(collect(agents)),
        }
    }

    pub fn kind(&self) -> RoleKind {
        self.scope.kind()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permissions(&self) -> &HashSet<String> {
        &self.permissions
    }

    pub fn subjects(&self) -> &HashSet<String> {
        &self.subjects
    }

    pub fn scope(&self) -> &RoleScope {
        &self.scope
    }

    /// Scope ids for namespace and agent roles, `None` for global roles.
    pub fn scopes(&self) -> Option<&HashSet<String>> {
        self.scope.ids()
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.subjects.contains(subject)
    }

    /// True when any of the identity's names appears in the subject set.
    pub fn matches(&self, identity: &SubjectIdentity) -> bool {
        identity.names().any(|name| self.subjects.contains(name))
    }

    /// True when the role holds at least one permission from `satisfying`.
    pub fn grants_any(&self, satisfying: &HashSet<String>) -> bool {
        if self.permissions.len() <= satisfying.len() {
            self.permissions.iter().any(|p| satisfying.contains(p))
        } else {
            satisfying.iter().any(|p| self.permissions.contains(p))
        }
    }

    pub fn with_subjects<S>(mut self, subjects: S) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        self.subjects.extend(subjects.into_iter().map(Into::into));
        self
    }

    pub fn without_subjects<'a, S>(mut self, subjects: S) -> Self
    where
        S: IntoIterator<Item = &'a str>,
    {
        for subject in subjects {
            self.subjects.remove(subject);
        }
        self
    }

    /// Drops permissions the catalog does not know and returns them sorted.
    pub fn retain_known_permissions(mut self, catalog: &PermissionCatalog) -> (Self, Vec<String>) {
        let mut dropped: Vec<String> = self
            .permissions
            .iter()
            .filter(|p| !catalog.is_known(p))
            .cloned()
            .collect();
        dropped.sort();
        for permission in &dropped {
            self.permissions.remove(permission);
        }
        (self, dropped)
    }

    /// Checks the role against the catalog and, when `identities` is given,
    /// against the identity provider. Uniqueness is the store's concern.
    pub fn validate(
        &self,
        catalog: &PermissionCatalog,
        identities: Option<&dyn IdentityProvider>,
    ) -> AuthzResult<()> {
        if self.name.trim().is_empty() {
            return Err(AuthzError::invalid_role(format!("{} role name must not be blank", self.kind())));
        }

        if let Some(unknown) = first_sorted(self.permissions.iter().filter(|p| !catalog.is_known(p))) {
            return Err(AuthzError::unknown_permission(unknown));
        }

        if let Some(identities) = identities {
            if let Some(unknown) = first_sorted(self.subjects.iter().filter(|s| !identities.knows(s))) {
                return Err(AuthzError::unknown_subject(unknown));
            }
        }

        Ok(())
    }
}

fn collect<I>(items: I) -> HashSet<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

// Hash sets iterate in arbitrary order; report the smallest offender so
// error messages are stable.
fn first_sorted<'a>(items: impl Iterator<Item = &'a String>) -> Option<String> {
    items.min().cloned()
}
