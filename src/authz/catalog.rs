use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::permissions;

/// Host permission registry: which permissions exist and which permissions
/// directly imply each of them.
pub trait PermissionRegistry: Send + Sync {
    fn contains(&self, permission: &str) -> bool;

    /// Permissions that directly imply `permission`. Holding any of them
    /// satisfies a request for `permission`.
    fn implied_by(&self, permission: &str) -> Vec<String>;
}

/// Lookup adapter over an injected [`PermissionRegistry`].
#[derive(Clone)]
pub struct PermissionCatalog {
    registry: Arc<dyn PermissionRegistry>,
}

impl fmt::Debug for PermissionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionCatalog").finish_non_exhaustive()
    }
}

impl PermissionCatalog {
    pub fn new(registry: Arc<dyn PermissionRegistry>) -> Self {
        Self { registry }
    }

    pub fn builder() -> StaticRegistryBuilder {
        StaticRegistryBuilder::default()
    }

    /// Catalog with the well-known permissions in [`permissions`].
    /// `overall.administer` implies every other permission.
    pub fn standard() -> Self {
        let mut builder = Self::builder().permission(permissions::OVERALL_ADMINISTER);
        for permission in [
            permissions::OVERALL_READ,
            permissions::ITEM_READ,
            permissions::ITEM_CONFIGURE,
            permissions::ITEM_BUILD,
            permissions::ITEM_DELETE,
            permissions::AGENT_CONFIGURE,
            permissions::AGENT_CONNECT,
            permissions::AGENT_DELETE,
        ] {
            builder = builder.implied_by(permission, permissions::OVERALL_ADMINISTER);
        }
        builder
            .implied_by(permissions::ITEM_DISCOVER, permissions::ITEM_READ)
            .build()
    }

    pub fn is_known(&self, permission: &str) -> bool {
        self.registry.contains(permission)
    }

    /// Reversed implication closure: `permission` itself plus every known
    /// permission that implies it, directly or transitively. Unknown
    /// permissions yield an empty set, so they can never be satisfied.
    pub fn satisfying_set(&self, permission: &str) -> HashSet<String> {
        let mut satisfying = HashSet::new();
        if !self.registry.contains(permission) {
            return satisfying;
        }

        let mut queue = VecDeque::from([permission.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !satisfying.insert(current.clone()) {
                continue;
            }
            for parent in self.registry.implied_by(&current) {
                if self.registry.contains(&parent) && !satisfying.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
        satisfying
    }
}

/// Immutable registry assembled with [`StaticRegistryBuilder`].
#[derive(Debug, Default)]
pub struct StaticRegistry {
    implied_by: HashMap<String, Vec<String>>,
}

impl PermissionRegistry for StaticRegistry {
    fn contains(&self, permission: &str) -> bool {
        self.implied_by.contains_key(permission)
    }

    fn implied_by(&self, permission: &str) -> Vec<String> {
        self.implied_by.get(permission).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct StaticRegistryBuilder {
    implied_by: HashMap<String, Vec<String>>,
}

impl StaticRegistryBuilder {
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.implied_by.entry(permission.into()).or_default();
        self
    }

    /// Registers `permission` (and `implier`) and records that holding
    /// `implier` satisfies `permission`.
    pub fn implied_by(mut self, permission: impl Into<String>, implier: impl Into<String>) -> Self {
        let implier = implier.into();
        self.implied_by.entry(implier.clone()).or_default();
        let parents = self.implied_by.entry(permission.into()).or_default();
        if !parents.contains(&implier) {
            parents.push(implier);
        }
        self
    }

    pub fn build(self) -> PermissionCatalog {
        PermissionCatalog::new(Arc::new(StaticRegistry {
            implied_by: self.implied_by,
        }))
    }
}
