use std::sync::Arc;

use scoped_authz::authz::{permissions, InMemoryResourceTree, PermissionCatalog, AUTHENTICATED};
use scoped_authz::persistence::{ConfigFile, ConfigStorage, LoadFallback, LoadOutcome};
use scoped_authz::{AuthorizationStrategy, Decision, Role, RoleKind, SubjectIdentity, Target};

fn tree() -> Arc<InMemoryResourceTree> {
    let tree = InMemoryResourceTree::new();
    tree.add_namespace("/folder");
    tree.add_namespace("/folder/sub");
    tree.add_namespace("/other");
    tree.add_agent("foo");
    tree.add_agent("bar");
    Arc::new(tree)
}

fn seeded(tree: Arc<InMemoryResourceTree>) -> anyhow::Result<AuthorizationStrategy> {
    let strategy = AuthorizationStrategy::new(PermissionCatalog::standard(), tree);
    strategy.create_role(Role::global("admin", [permissions::OVERALL_ADMINISTER], ["admin"]))?;
    strategy.create_role(Role::global("read", [permissions::OVERALL_READ], [AUTHENTICATED]))?;
    strategy.create_role(Role::namespace("read", [permissions::ITEM_READ], ["/folder"], ["user1"]))?;
    strategy.create_role(Role::agent("configureMaster", [permissions::AGENT_CONFIGURE], ["foo"], ["user1"]))?;
    Ok(strategy)
}

fn decisions(strategy: &AuthorizationStrategy) -> Vec<Decision> {
    let admin = SubjectIdentity::new("admin");
    let user1 = SubjectIdentity::new("user1").with_groups([AUTHENTICATED]);
    let user2 = SubjectIdentity::new("user2").with_groups([AUTHENTICATED]);

    vec![
        strategy.check(&admin, permissions::OVERALL_ADMINISTER, &Target::Root),
        strategy.check(&admin, permissions::ITEM_DELETE, &Target::item("/other")),
        strategy.check(&user1, permissions::OVERALL_READ, &Target::Root),
        strategy.check(&user1, permissions::ITEM_READ, &Target::item("/folder")),
        strategy.check(&user1, permissions::ITEM_READ, &Target::item("/folder/sub/job")),
        strategy.check(&user1, permissions::ITEM_READ, &Target::item("/other")),
        strategy.check(&user1, permissions::ITEM_CONFIGURE, &Target::item("/folder")),
        strategy.check(&user1, permissions::AGENT_CONFIGURE, &Target::agent("foo")),
        strategy.check(&user1, permissions::AGENT_DELETE, &Target::agent("foo")),
        strategy.check(&user1, permissions::AGENT_CONFIGURE, &Target::agent("bar")),
        strategy.check(&user1, permissions::OVERALL_ADMINISTER, &Target::Root),
        strategy.check(&user2, permissions::OVERALL_READ, &Target::Root),
        strategy.check(&user2, permissions::ITEM_READ, &Target::item("/folder")),
    ]
}

#[tokio::test]
async fn roles_survive_save_and_reload() -> anyhow::Result<()> {
    use Decision::{Allow, Deny};

    let dir = tempfile::tempdir()?;
    let file = ConfigFile::new(dir.path().join("authz.json"));

    let tree = tree();
    let before = seeded(tree.clone())?;
    let expected = vec![
        Allow, Allow, Allow, Allow, Allow, Deny, Deny, Allow, Deny, Deny, Deny, Allow, Deny,
    ];
    assert_eq!(decisions(&before), expected);

    let saved = file.save(&before).await?;
    assert_eq!(saved.total(), 4);

    let after = AuthorizationStrategy::new(PermissionCatalog::standard(), tree);
    let outcome = file.load_into(&after, LoadFallback::Keep).await;
    let counts = match outcome {
        LoadOutcome::Loaded(counts) => counts,
        other => anyhow::bail!("unexpected load outcome: {other:?}"),
    };
    assert_eq!((counts.global, counts.namespace, counts.agent), (2, 1, 1));
    assert_eq!(decisions(&after), expected);

    // Global and namespace roles share the name `read` and both survive.
    let global_read = after.store().get(RoleKind::Global, "read");
    let namespace_read = after.store().get(RoleKind::Namespace, "read");
    assert!(global_read.is_some_and(|role| role.has_subject(AUTHENTICATED)));
    assert!(namespace_read.is_some_and(|role| role.has_subject("user1")));
    assert_eq!(*after.store().snapshot(), *before.store().snapshot());

    Ok(())
}

#[tokio::test]
async fn persisted_document_is_canonical() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = ConfigFile::new(dir.path().join("nested").join("authz.json"));

    let strategy = seeded(tree())?;
    strategy.assign_subjects(RoleKind::Global, "admin", &["zed", "alpha", "mid"])?;
    file.save(&strategy).await?;

    let bytes = file.read().await?.ok_or_else(|| anyhow::anyhow!("file not written"))?;
    let text = String::from_utf8(bytes.clone())?;
    assert!(!text.contains("HashSet"));
    assert!(!text.contains("KeySet"));

    let document: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(document["version"], 2);
    assert_eq!(
        document["globalRoles"][0]["subjects"],
        serde_json::json!(["admin", "alpha", "mid", "zed"])
    );
    assert_eq!(document["namespaceRoles"][0]["scopes"], serde_json::json!(["/folder"]));
    assert!(document["globalRoles"][0].get("scopes").is_none());

    let reloaded = AuthorizationStrategy::new(PermissionCatalog::standard(), tree());
    reloaded.load_configuration(&bytes)?;
    assert_eq!(reloaded.export_configuration()?, bytes);
    assert_eq!(strategy.export_configuration()?, bytes);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_save_reflects_latest_roles() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = Arc::new(ConfigFile::new(dir.path().join("authz.json")));
    let strategy = Arc::new(seeded(tree())?);

    let mut saves = Vec::new();
    for i in 0..32 {
        strategy.create_role(Role::global(
            format!("extra-{i:02}"),
            [permissions::OVERALL_READ],
            [format!("user-{i}")],
        ))?;
        let file = Arc::clone(&file);
        let strategy = Arc::clone(&strategy);
        saves.push(tokio::spawn(async move { file.save(&strategy).await }));
    }
    for save in saves {
        save.await??;
    }

    let on_disk = file.read().await?.ok_or_else(|| anyhow::anyhow!("file not written"))?;
    assert_eq!(on_disk, strategy.export_configuration()?);
    Ok(())
}
