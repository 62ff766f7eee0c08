//! Canonical JSON document for the role configuration.
//!
//! Live roles hold `HashSet`s, whose iteration order changes from run to
//! run. Nothing live is serialized directly: every set is copied into a
//! sorted `Vec<String>` record first, and on load the records are rebuilt
//! into fresh roles. Role lists are written in name order, so exporting an
//! unchanged snapshot always yields the same bytes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::authz::catalog::PermissionCatalog;
use crate::authz::store::RoleSnapshot;
use crate::errors::{AuthzError, PersistenceError};
use crate::models::role::{Role, RoleKind};

/// Schema version written by [`export`].
///
/// - 1: `globalRoles` and `folderRoles` only
/// - 2: adds `agentRoles`; `folderRoles` renamed to `namespaceRoles`
pub const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument {
    #[serde(default = "legacy_version")]
    version: u32,
    #[serde(default)]
    global_roles: Vec<RoleRecord>,
    #[serde(default, alias = "folderRoles")]
    namespace_roles: Vec<RoleRecord>,
    #[serde(default)]
    agent_roles: Vec<RoleRecord>,
}

fn legacy_version() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
struct RoleRecord {
    name: String,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    subjects: Vec<String>,
}

impl From<&Role> for RoleRecord {
    fn from(role: &Role) -> Self {
        RoleRecord {
            name: role.name().to_string(),
            permissions: sorted(role.permissions()),
            scopes: role.scopes().map(sorted),
            subjects: sorted(role.subjects()),
        }
    }
}

impl RoleRecord {
    fn into_role(self, kind: RoleKind) -> Result<Role, PersistenceError> {
        if self.name.trim().is_empty() {
            return Err(PersistenceError::invalid_record(kind, "role name must not be blank"));
        }
        let scopes = self.scopes.unwrap_or_default();
        let role = match kind {
            RoleKind::Global => {
                if !scopes.is_empty() {
                    tracing::warn!(role = %self.name, "ignoring scopes on global role");
                }
                Role::global(self.name, self.permissions, self.subjects)
            }
            RoleKind::Namespace => Role::namespace(self.name, self.permissions, scopes, self.subjects),
            RoleKind::Agent => Role::agent(self.name, self.permissions, scopes, self.subjects),
        };
        Ok(role)
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut items: Vec<String> = set.iter().cloned().collect();
    items.sort();
    items
}

/// A permission dropped during import because the catalog does not know it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedPermission {
    pub kind: RoleKind,
    pub role: String,
    pub permission: String,
}

#[derive(Debug)]
pub struct DecodedConfiguration {
    pub version: u32,
    pub snapshot: RoleSnapshot,
    pub dropped_permissions: Vec<DroppedPermission>,
    /// Records skipped because an earlier record of the same kind had the same name.
    pub duplicate_records: Vec<(RoleKind, String)>,
}

/// Serializes `snapshot` into the canonical document.
pub fn export(snapshot: &RoleSnapshot) -> Result<Vec<u8>, PersistenceError> {
    let records = |kind: RoleKind| -> Vec<RoleRecord> {
        snapshot.roles(kind).map(|role| RoleRecord::from(role.as_ref())).collect()
    };
    let document = ConfigDocument {
        version: CURRENT_VERSION,
        global_roles: records(RoleKind::Global),
        namespace_roles: records(RoleKind::Namespace),
        agent_roles: records(RoleKind::Agent),
    };

    let mut bytes = serde_json::to_vec_pretty(&document).map_err(PersistenceError::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes a document into a snapshot.
///
/// Missing sections decode as empty and unknown fields are ignored, so older
/// and newer documents load. Unknown permissions are dropped with a warning.
/// A document that is not valid JSON of the expected shape fails with
/// [`PersistenceError::Malformed`] naming the offending path.
pub fn import(bytes: &[u8], catalog: &PermissionCatalog) -> Result<DecodedConfiguration, PersistenceError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let document: ConfigDocument = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|err| PersistenceError::malformed(err.path().to_string(), err.inner().to_string()))?;
    // Only whitespace may follow the document.
    deserializer
        .end()
        .map_err(|err| PersistenceError::malformed(".", err.to_string()))?;

    if document.version > CURRENT_VERSION {
        tracing::warn!(
            version = document.version,
            supported = CURRENT_VERSION,
            "configuration written by a newer schema, unknown fields are ignored"
        );
    }

    let version = document.version;
    let mut decoded = DecodedConfiguration {
        version,
        snapshot: RoleSnapshot::new(),
        dropped_permissions: Vec::new(),
        duplicate_records: Vec::new(),
    };

    let sections = [
        (RoleKind::Global, document.global_roles),
        (RoleKind::Namespace, document.namespace_roles),
        (RoleKind::Agent, document.agent_roles),
    ];

    for (kind, records) in sections {
        for record in records {
            let (role, dropped) = record.into_role(kind)?.retain_known_permissions(catalog);
            for permission in dropped {
                tracing::warn!(kind = %kind, role = %role.name(), permission = %permission, "dropping unknown permission");
                decoded.dropped_permissions.push(DroppedPermission {
                    kind,
                    role: role.name().to_string(),
                    permission,
                });
            }

            let name = role.name().to_string();
            match decoded.snapshot.insert(role) {
                Ok(()) => {}
                Err(AuthzError::DuplicateName { .. }) => {
                    tracing::warn!(kind = %kind, role = %name, "skipping duplicate role record");
                    decoded.duplicate_records.push((kind, name));
                }
                Err(other) => {
                    return Err(PersistenceError::invalid_record(kind, other.to_string()));
                }
            }
        }
    }

    Ok(decoded)
}

/// Hex SHA-256 of a document, used to compare exports.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions;

    fn snapshot() -> RoleSnapshot {
        RoleSnapshot::from_roles([
            Role::global("read", [permissions::OVERALL_READ], ["authenticated"]),
            Role::global(
                "admin",
                [permissions::OVERALL_ADMINISTER, permissions::OVERALL_READ],
                ["zed", "admin", "m"],
            ),
            Role::namespace("read", [permissions::ITEM_READ], ["/folder", "/a"], ["user1"]),
            Role::agent("configureMaster", [permissions::AGENT_CONFIGURE], ["foo"], ["user1"]),
        ])
        .unwrap()
    }

    #[test]
    fn export_is_sorted_and_omits_global_scopes() {
        let bytes = export(&snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["version"], CURRENT_VERSION);
        assert_eq!(value["globalRoles"][0]["name"], "admin");
        assert_eq!(value["globalRoles"][0]["subjects"], serde_json::json!(["admin", "m", "zed"]));
        assert!(value["globalRoles"][0].get("scopes").is_none());
        assert_eq!(value["namespaceRoles"][0]["scopes"], serde_json::json!(["/a", "/folder"]));
        assert_eq!(value["agentRoles"][0]["scopes"], serde_json::json!(["foo"]));
    }

    #[test]
    fn import_restores_equal_snapshot() {
        let original = snapshot();
        let bytes = export(&original).unwrap();
        let decoded = import(&bytes, &PermissionCatalog::standard()).unwrap();
        assert_eq!(decoded.snapshot, original);
        assert!(decoded.dropped_permissions.is_empty());
    }

    #[test]
    fn legacy_document_without_agent_roles_loads() {
        let legacy = br#"{
            "globalRoles": [{"name": "admin", "permissions": ["overall.administer"], "subjects": ["admin"]}],
            "folderRoles": [{"name": "read", "permissions": ["item.read"], "scopes": ["folder"], "subjects": ["user1"]}]
        }"#;
        let decoded = import(legacy, &PermissionCatalog::standard()).unwrap();
        assert_eq!(decoded.version, 1);
        let counts = decoded.snapshot.counts();
        assert_eq!((counts.global, counts.namespace, counts.agent), (1, 1, 0));
        let role = decoded.snapshot.get(RoleKind::Namespace, "read").unwrap();
        assert!(role.scopes().unwrap().contains("/folder"));
    }

    #[test]
    fn empty_object_is_an_empty_configuration() {
        let decoded = import(b"{}", &PermissionCatalog::standard()).unwrap();
        assert!(decoded.snapshot.is_empty());
    }

    #[test]
    fn unknown_permissions_are_dropped() {
        let doc = br#"{"version": 2, "agentRoles": [
            {"name": "ops", "permissions": ["agent.configure", "agent.teleport"], "scopes": ["foo"], "subjects": ["ops"]}
        ]}"#;
        let decoded = import(doc, &PermissionCatalog::standard()).unwrap();
        assert_eq!(
            decoded.dropped_permissions,
            vec![DroppedPermission {
                kind: RoleKind::Agent,
                role: "ops".to_string(),
                permission: "agent.teleport".to_string(),
            }]
        );
        let role = decoded.snapshot.get(RoleKind::Agent, "ops").unwrap();
        assert_eq!(role.permissions().len(), 1);
    }

    #[test]
    fn duplicate_records_keep_the_first() {
        let doc = br#"{"globalRoles": [
            {"name": "dup", "permissions": ["overall.read"], "subjects": ["a"]},
            {"name": "dup", "permissions": ["overall.administer"], "subjects": ["b"]}
        ]}"#;
        let decoded = import(doc, &PermissionCatalog::standard()).unwrap();
        assert_eq!(decoded.duplicate_records, vec![(RoleKind::Global, "dup".to_string())]);
        assert!(decoded.snapshot.get(RoleKind::Global, "dup").unwrap().has_subject("a"));
    }

    #[test]
    fn malformed_document_names_the_path() {
        let doc = br#"{"globalRoles": [{"name": "x", "permissions": "overall.read"}]}"#;
        match import(doc, &PermissionCatalog::standard()) {
            Err(PersistenceError::Malformed { path, .. }) => assert_eq!(path, "globalRoles[0].permissions"),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn trailing_data_is_malformed() {
        let doc = br#"{"globalRoles": [{"name": "admin", "permissions": ["overall.administer"], "subjects": ["admin"]}]} TRUNCATED {{{"#;
        assert!(matches!(
            import(doc, &PermissionCatalog::standard()),
            Err(PersistenceError::Malformed { .. })
        ));

        let concatenated = [export(&snapshot()).unwrap(), export(&snapshot()).unwrap()].concat();
        assert!(matches!(
            import(&concatenated, &PermissionCatalog::standard()),
            Err(PersistenceError::Malformed { .. })
        ));

        let padded = [export(&snapshot()).unwrap(), b"\n\n  ".to_vec()].concat();
        assert!(import(&padded, &PermissionCatalog::standard()).is_ok());
    }

    #[test]
    fn blank_name_is_an_invalid_record() {
        let doc = br#"{"agentRoles": [{"name": " ", "scopes": ["foo"]}]}"#;
        assert!(matches!(
            import(doc, &PermissionCatalog::standard()),
            Err(PersistenceError::InvalidRecord { kind: RoleKind::Agent, .. })
        ));
    }

    #[test]
    fn digest_is_stable() {
        let a = export(&snapshot()).unwrap();
        let b = export(&snapshot()).unwrap();
        assert_eq!(a, b);
        assert_eq!(digest(&a), digest(&b));
        assert_eq!(digest(&a).len(), 64);
    }
}
