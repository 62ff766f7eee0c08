use serde::Serialize;

use super::catalog::PermissionCatalog;
use super::principal::{SubjectIdentity, Target};
use super::store::RoleSnapshot;
use super::tree::ResourceTree;
use crate::models::role::{Role, RoleKind, RoleScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => f.write_str("ALLOW"),
            Decision::Deny => f.write_str("DENY"),
        }
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Enforcement-point seam: anything that can answer an access check.
pub trait AccessEvaluator: Send + Sync {
    fn check(&self, identity: &SubjectIdentity, permission: &str, target: &Target) -> Decision;
}

/// A permission a subject holds at a target and the role it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EffectiveGrant {
    pub permission: String,
    pub kind: RoleKind,
    pub role_name: String,
}

/// Role-driven evaluator over one snapshot.
///
/// Evaluation:
/// 1. expand the permission to every permission that satisfies it
/// 2. collect global roles, plus namespace roles on the target's ancestry
///    or agent roles naming the target agent
/// 3. allow if any candidate grants a satisfying permission to one of the
///    subject's names, otherwise deny
///
/// There is no superuser bypass and no deny rule. Anything missing resolves
/// to deny.
pub struct Evaluator<'a> {
    catalog: &'a PermissionCatalog,
    tree: &'a dyn ResourceTree,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a PermissionCatalog, tree: &'a dyn ResourceTree) -> Self {
        Self { catalog, tree }
    }

    /// Roles whose scope covers `target`.
    pub fn candidates<'s>(&self, snapshot: &'s RoleSnapshot, target: &Target) -> Vec<&'s Role> {
        let mut candidates: Vec<&Role> = snapshot.roles(RoleKind::Global).map(|r| r.as_ref()).collect();

        match target {
            Target::Root => {}
            Target::Item(path) => {
                let ancestry = self.tree.namespace_ancestry(path);
                if !ancestry.is_empty() {
                    candidates.extend(
                        snapshot
                            .roles(RoleKind::Namespace)
                            .map(|r| r.as_ref())
                            .filter(|role| Self::scope_covers(role, &ancestry)),
                    );
                }
            }
            Target::Agent(agent) => {
                if let Some(agent_id) = self.tree.agent_id(agent) {
                    candidates.extend(
                        snapshot
                            .roles(RoleKind::Agent)
                            .map(|r| r.as_ref())
                            .filter(|role| Self::scope_covers(role, std::slice::from_ref(&agent_id))),
                    );
                }
            }
        }

        candidates
    }

    fn scope_covers(role: &Role, ids: &[String]) -> bool {
        match role.scope() {
            RoleScope::Global => true,
            RoleScope::Namespaces(scopes) | RoleScope::Agents(scopes) => {
                ids.iter().any(|id| scopes.contains(id))
            }
        }
    }

    pub fn check(
        &self,
        snapshot: &RoleSnapshot,
        identity: &SubjectIdentity,
        permission: &str,
        target: &Target,
    ) -> Decision {
        let satisfying = self.catalog.satisfying_set(permission);
        if satisfying.is_empty() {
            tracing::debug!(
                subject = %identity.name,
                permission = %permission,
                target = %target,
                "unknown permission denied"
            );
            return Decision::Deny;
        }

        let granting = self
            .candidates(snapshot, target)
            .into_iter()
            .find(|role| role.grants_any(&satisfying) && role.matches(identity));

        match granting {
            Some(role) => {
                tracing::debug!(
                    subject = %identity.name,
                    permission = %permission,
                    target = %target,
                    kind = %role.kind(),
                    role = %role.name(),
                    "permission granted"
                );
                Decision::Allow
            }
            None => {
                tracing::debug!(
                    subject = %identity.name,
                    permission = %permission,
                    target = %target,
                    "permission denied"
                );
                Decision::Deny
            }
        }
    }

    /// Every (permission, role) pair the subject holds at `target`, sorted.
    /// Implied permissions are listed under the permission the role holds.
    pub fn effective_grants(
        &self,
        snapshot: &RoleSnapshot,
        identity: &SubjectIdentity,
        target: &Target,
    ) -> Vec<EffectiveGrant> {
        let mut grants: Vec<EffectiveGrant> = self
            .candidates(snapshot, target)
            .into_iter()
            .filter(|role| role.matches(identity))
            .flat_map(|role| {
                role.permissions().iter().map(move |permission| EffectiveGrant {
                    permission: permission.clone(),
                    kind: role.kind(),
                    role_name: role.name().to_string(),
                })
            })
            .collect();
        grants.sort();
        grants.dedup();
        grants
    }
}
