use std::collections::HashSet;

use parking_lot::RwLock;

/// Host resource tree. Lookups are in-memory and must not block.
pub trait ResourceTree: Send + Sync {
    /// Namespace ids containing `item`, nearest first. The item itself is
    /// included when it is a namespace. Root-level items yield nothing.
    fn namespace_ancestry(&self, item: &str) -> Vec<String>;

    /// The agent id when `agent` names an existing agent.
    fn agent_id(&self, agent: &str) -> Option<String>;
}

/// Canonical form of a namespace path: leading slash, no trailing or
/// repeated slashes. The root is `/`.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Every proper path prefix of `path` plus the path itself, nearest first.
/// `/a/b/c` yields `/a/b/c`, `/a/b`, `/a`.
pub fn path_prefixes(path: &str) -> Vec<String> {
    let normalized = normalize_path(path);
    let mut prefixes = Vec::new();
    let mut current = normalized.as_str();
    while current != "/" {
        prefixes.push(current.to_string());
        current = match current.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &current[..idx],
        };
    }
    prefixes
}

/// Resource tree that knows which paths are namespaces and which agents exist.
#[derive(Debug, Default)]
pub struct InMemoryResourceTree {
    namespaces: RwLock<HashSet<String>>,
    agents: RwLock<HashSet<String>>,
}

impl InMemoryResourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace(&self, path: &str) {
        self.namespaces.write().insert(normalize_path(path));
    }

    /// Removes the namespace and everything nested below it.
    pub fn remove_namespace(&self, path: &str) {
        let path = normalize_path(path);
        let nested = format!("{path}/");
        self.namespaces
            .write()
            .retain(|ns| ns != &path && !ns.starts_with(&nested));
    }

    pub fn add_agent(&self, id: impl Into<String>) {
        self.agents.write().insert(id.into());
    }

    pub fn remove_agent(&self, id: &str) {
        self.agents.write().remove(id);
    }
}

impl ResourceTree for InMemoryResourceTree {
    fn namespace_ancestry(&self, item: &str) -> Vec<String> {
        let namespaces = self.namespaces.read();
        path_prefixes(item)
            .into_iter()
            .filter(|prefix| namespaces.contains(prefix))
            .collect()
    }

    fn agent_id(&self, agent: &str) -> Option<String> {
        self.agents.read().get(agent).cloned()
    }
}

/// Tree derived from path syntax alone: the path and every prefix of it
/// count as namespaces, and any non-empty agent id exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathResourceTree;

impl ResourceTree for PathResourceTree {
    fn namespace_ancestry(&self, item: &str) -> Vec<String> {
        path_prefixes(item)
    }

    fn agent_id(&self, agent: &str) -> Option<String> {
        (!agent.is_empty()).then(|| agent.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(normalize_path("folder"), "/folder");
        assert_eq!(normalize_path("/a//b/"), "/a/b");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn prefixes_nearest_first() {
        assert_eq!(path_prefixes("/a/b/c"), vec!["/a/b/c", "/a/b", "/a"]);
        assert!(path_prefixes("/").is_empty());
    }

    #[test]
    fn ancestry_skips_non_namespaces() {
        let tree = InMemoryResourceTree::new();
        tree.add_namespace("/teamA");
        tree.add_namespace("/teamA/sub");

        assert_eq!(tree.namespace_ancestry("/teamA/sub/job"), vec!["/teamA/sub", "/teamA"]);
        assert_eq!(tree.namespace_ancestry("/teamA"), vec!["/teamA"]);
        assert!(tree.namespace_ancestry("/rootJob").is_empty());
    }

    #[test]
    fn removing_namespace_drops_subtree() {
        let tree = InMemoryResourceTree::new();
        tree.add_namespace("/teamA");
        tree.add_namespace("/teamA/sub");
        tree.add_namespace("/teamAB");
        tree.remove_namespace("/teamA");

        assert!(tree.namespace_ancestry("/teamA/sub").is_empty());
        assert_eq!(tree.namespace_ancestry("/teamAB"), vec!["/teamAB"]);
    }

    #[test]
    fn agents_are_flat() {
        let tree = InMemoryResourceTree::new();
        tree.add_agent("foo");
        assert_eq!(tree.agent_id("foo").as_deref(), Some("foo"));
        assert!(tree.agent_id("bar").is_none());
        tree.remove_agent("foo");
        assert!(tree.agent_id("foo").is_none());
    }
}
