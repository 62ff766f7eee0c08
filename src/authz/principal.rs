use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;

use super::tree::normalize_path;

/// Pseudo-group every resolved user belongs to.
pub const AUTHENTICATED: &str = "authenticated";

/// The acting subject: its own name plus the groups it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub name: String,
    pub groups: HashSet<String>,
}

impl SubjectIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: HashSet::new(),
        }
    }

    pub fn with_groups<G>(mut self, groups: G) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Own name first, then group names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.groups.iter().map(String::as_str))
    }
}

/// Host identity subsystem. Authentication happens before this is consulted.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, subject: &str) -> Option<SubjectIdentity>;

    /// Whether `subject` names a known user or group.
    fn knows(&self, subject: &str) -> bool;
}

/// Identity provider backed by an in-memory user/group table.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    users: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user<G>(&self, name: impl Into<String>, groups: G)
    where
        G: IntoIterator,
        G::Item: Into<String>,
    {
        self.users
            .write()
            .insert(name.into(), groups.into_iter().map(Into::into).collect());
    }

    pub fn remove_user(&self, name: &str) -> bool {
        self.users.write().remove(name).is_some()
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn resolve(&self, subject: &str) -> Option<SubjectIdentity> {
        let users = self.users.read();
        let groups = users.get(subject)?;
        Some(
            SubjectIdentity::new(subject)
                .with_groups(groups.iter().cloned())
                .with_groups([AUTHENTICATED]),
        )
    }

    fn knows(&self, subject: &str) -> bool {
        if subject == AUTHENTICATED {
            return true;
        }
        let users = self.users.read();
        users.contains_key(subject) || users.values().any(|groups| groups.contains(subject))
    }
}

/// The resource a permission is requested on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The system object itself.
    Root,
    /// A namespace or an item nested somewhere in the namespace tree.
    Item(String),
    Agent(String),
}

impl Target {
    pub fn item(path: impl AsRef<str>) -> Self {
        Target::Item(normalize_path(path.as_ref()))
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Target::Agent(id.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Root => f.write_str("root"),
            Target::Item(path) => write!(f, "item:{path}"),
            Target::Agent(id) => write!(f, "agent:{id}"),
        }
    }
}
