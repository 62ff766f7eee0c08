//! Role store: three name-keyed collections, one per role kind.
//!
//! Readers clone an `Arc` of the current [`RoleSnapshot`] and never observe a
//! partial update. Writers serialize on a mutex, build the next snapshot from
//! a copy of the current one and publish it with a single pointer swap. A
//! failed mutation publishes nothing, so the store is left unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::tree::ResourceTree;
use crate::errors::{AuthzError, AuthzResult};
use crate::models::role::{Role, RoleKind, RoleScope};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCounts {
    pub global: usize,
    pub namespace: usize,
    pub agent: usize,
}

impl RoleCounts {
    pub fn total(&self) -> usize {
        self.global + self.namespace + self.agent
    }
}

/// Immutable view of every role, ordered by name within each kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleSnapshot {
    global: BTreeMap<String, Arc<Role>>,
    namespace: BTreeMap<String, Arc<Role>>,
    agent: BTreeMap<String, Arc<Role>>,
}

impl RoleSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot, rejecting a name repeated within one kind.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> AuthzResult<Self> {
        let mut snapshot = Self::new();
        for role in roles {
            snapshot.insert(role)?;
        }
        Ok(snapshot)
    }

    fn map(&self, kind: RoleKind) -> &BTreeMap<String, Arc<Role>> {
        match kind {
            RoleKind::Global => &self.global,
            RoleKind::Namespace => &self.namespace,
            RoleKind::Agent => &self.agent,
        }
    }

    fn map_mut(&mut self, kind: RoleKind) -> &mut BTreeMap<String, Arc<Role>> {
        match kind {
            RoleKind::Global => &mut self.global,
            RoleKind::Namespace => &mut self.namespace,
            RoleKind::Agent => &mut self.agent,
        }
    }

    pub fn insert(&mut self, role: Role) -> AuthzResult<()> {
        let kind = role.kind();
        let map = self.map_mut(kind);
        if map.contains_key(role.name()) {
            return Err(AuthzError::duplicate(kind, role.name()));
        }
        map.insert(role.name().to_string(), Arc::new(role));
        Ok(())
    }

    fn take(&mut self, kind: RoleKind, name: &str) -> AuthzResult<Arc<Role>> {
        self.map_mut(kind)
            .remove(name)
            .ok_or_else(|| AuthzError::not_found(kind, name))
    }

    pub fn get(&self, kind: RoleKind, name: &str) -> Option<&Arc<Role>> {
        self.map(kind).get(name)
    }

    /// Roles of one kind in name order.
    pub fn roles(&self, kind: RoleKind) -> impl Iterator<Item = &Arc<Role>> {
        self.map(kind).values()
    }

    pub fn all_roles(&self) -> impl Iterator<Item = &Arc<Role>> {
        RoleKind::ALL.into_iter().flat_map(move |kind| self.roles(kind))
    }

    pub fn len(&self, kind: RoleKind) -> usize {
        self.map(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    pub fn counts(&self) -> RoleCounts {
        RoleCounts {
            global: self.global.len(),
            namespace: self.namespace.len(),
            agent: self.agent.len(),
        }
    }

    /// Namespace roles scoped to `namespace_id` or any of its ancestors.
    pub fn roles_for_namespace(&self, namespace_id: &str, tree: &dyn ResourceTree) -> Vec<Arc<Role>> {
        let ancestry = tree.namespace_ancestry(namespace_id);
        self.namespace
            .values()
            .filter(|role| match role.scope() {
                RoleScope::Namespaces(scopes) => ancestry.iter().any(|ns| scopes.contains(ns)),
                _ => false,
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct RoleStore {
    current: RwLock<Arc<RoleSnapshot>>,
    writer: Mutex<()>,
}

impl RoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current published snapshot.
    pub fn snapshot(&self) -> Arc<RoleSnapshot> {
        self.current.read().clone()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut RoleSnapshot) -> AuthzResult<T>) -> AuthzResult<T> {
        let _writer = self.writer.lock();
        let mut next = RoleSnapshot::clone(&self.current.read());
        let out = f(&mut next)?;
        *self.current.write() = Arc::new(next);
        Ok(out)
    }

    pub fn add_role(&self, role: Role) -> AuthzResult<()> {
        let (kind, name) = (role.kind(), role.name().to_string());
        self.mutate(|snapshot| snapshot.insert(role))?;
        tracing::info!(kind = %kind, role = %name, "role added");
        Ok(())
    }

    /// Removes the role and hands it back to the caller.
    pub fn remove_role(&self, kind: RoleKind, name: &str) -> AuthzResult<Role> {
        let removed = self.mutate(|snapshot| snapshot.take(kind, name))?;
        tracing::info!(kind = %kind, role = %name, "role removed");
        Ok(Arc::unwrap_or_clone(removed))
    }

    /// Replaces `name` with `new_role`, which may carry a different name.
    pub fn update_role(&self, kind: RoleKind, name: &str, new_role: Role) -> AuthzResult<()> {
        if new_role.kind() != kind {
            return Err(AuthzError::invalid_role(format!(
                "cannot replace {kind} role {name} with a {} role",
                new_role.kind()
            )));
        }
        let new_name = new_role.name().to_string();
        self.mutate(|snapshot| {
            snapshot.take(kind, name)?;
            snapshot.insert(new_role)
        })?;
        tracing::info!(kind = %kind, role = %name, new_name = %new_name, "role updated");
        Ok(())
    }

    /// Adds subjects to a role. Subjects already present are left alone.
    pub fn assign_subjects<S>(&self, kind: RoleKind, name: &str, subjects: S) -> AuthzResult<()>
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        self.mutate(|snapshot| {
            let role = snapshot.take(kind, name)?;
            snapshot.insert(Arc::unwrap_or_clone(role).with_subjects(subjects))
        })?;
        tracing::info!(kind = %kind, role = %name, "subjects assigned");
        Ok(())
    }

    /// Removes subjects from a role. Subjects not present are ignored.
    pub fn unassign_subjects<'a, S>(&self, kind: RoleKind, name: &str, subjects: S) -> AuthzResult<()>
    where
        S: IntoIterator<Item = &'a str>,
    {
        self.mutate(|snapshot| {
            let role = snapshot.take(kind, name)?;
            snapshot.insert(Arc::unwrap_or_clone(role).without_subjects(subjects))
        })?;
        tracing::info!(kind = %kind, role = %name, "subjects unassigned");
        Ok(())
    }

    /// Drops `subject` from every role of every kind in one swap. Returns
    /// the number of roles that held it.
    pub fn unassign_subject_everywhere(&self, subject: &str) -> usize {
        let touched = self
            .mutate(|snapshot| {
                let mut touched = 0;
                for kind in RoleKind::ALL {
                    for role in snapshot.map_mut(kind).values_mut() {
                        if role.has_subject(subject) {
                            *role = Arc::new(Role::clone(role).without_subjects([subject]));
                            touched += 1;
                        }
                    }
                }
                Ok(touched)
            })
            .unwrap_or_default();
        tracing::info!(subject = %subject, roles = touched, "subject unassigned everywhere");
        touched
    }

    /// Installs `snapshot` wholesale, as a configuration load does.
    pub fn replace_all(&self, snapshot: RoleSnapshot) {
        let counts = snapshot.counts();
        let _writer = self.writer.lock();
        *self.current.write() = Arc::new(snapshot);
        tracing::info!(
            global = counts.global,
            namespace = counts.namespace,
            agent = counts.agent,
            "role configuration replaced"
        );
    }

    pub fn get(&self, kind: RoleKind, name: &str) -> Option<Arc<Role>> {
        self.snapshot().get(kind, name).cloned()
    }

    pub fn roles(&self, kind: RoleKind) -> Vec<Arc<Role>> {
        self.snapshot().roles(kind).cloned().collect()
    }

    pub fn counts(&self) -> RoleCounts {
        self.snapshot().counts()
    }

    /// Roles of any kind that list `subject` directly.
    pub fn roles_for_subject(&self, subject: &str) -> Vec<Arc<Role>> {
        self.snapshot()
            .all_roles()
            .filter(|role| role.has_subject(subject))
            .cloned()
            .collect()
    }

    pub fn roles_for_namespace(&self, namespace_id: &str, tree: &dyn ResourceTree) -> Vec<Arc<Role>> {
        self.snapshot().roles_for_namespace(namespace_id, tree)
    }
}
