//! Tests for the link registry: creation, editing, cascading deletes,
//! list management and snapshots

use golinks::database::init_db;
use golinks::error::GoError;
use golinks::model::{LinkId, LinkUpdate, ListKind, Policy};
use golinks::registry::LinkDatabase;
use golinks::resolver::Resolution;
use golinks::transfer::Snapshot;
use tempfile::NamedTempFile;

fn lists(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Registry on a temporary redb file
fn redb_database() -> (LinkDatabase, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let store = init_db(temp_db.path()).expect("Failed to initialize test database");
    (LinkDatabase::new(store), temp_db)
}

#[test]
fn test_create_link_creates_lists() {
    let db = LinkDatabase::in_memory();
    let link = db
        .create_link(&lists(&["Wiki", "docs"]), "https://wiki.example.com", "Wiki", "alice")
        .unwrap();

    assert_eq!(link.lists, vec!["wiki", "docs"]);
    assert_eq!(link.last_edit().unwrap().editor, "alice");
    assert!(!link.regex_generated);

    let wiki = db.get_list("wiki").unwrap();
    assert_eq!(wiki.links, vec![link.id]);
    assert_eq!(wiki.policy, Policy::Freshest);
    assert_eq!(wiki.kind, ListKind::Keyword);
    assert_ne!(wiki.id, link.id);
}

#[test]
fn test_ids_are_never_reused() {
    let db = LinkDatabase::in_memory();
    let first = db.create_link(&lists(&["a"]), "https://a.example.com", "", "u").unwrap();
    db.delete_link(first.id).unwrap();
    let second = db.create_link(&lists(&["a"]), "https://a.example.com", "", "u").unwrap();

    assert!(second.id > first.id);
}

#[test]
fn test_duplicate_url_is_a_conflict() {
    let db = LinkDatabase::in_memory();
    let original = db
        .create_link(&lists(&["a"]), "https://same.example.com", "first", "u")
        .unwrap();

    let err = db
        .create_link(&lists(&["b"]), "https://same.example.com", "second", "u")
        .unwrap_err();

    match err {
        GoError::UrlConflict(existing) => {
            assert_eq!(existing.id, original.id);
            assert_eq!(existing.title, "first");
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    // nothing was written
    assert!(matches!(db.get_list("b"), Err(GoError::ListNotFound(_))));
}

#[test]
fn test_create_validates_before_writing() {
    let db = LinkDatabase::in_memory();

    assert!(matches!(
        db.create_link(&lists(&["ok", "not_ok"]), "https://x.example.com", "", "u"),
        Err(GoError::InvalidKeyword(_))
    ));
    assert!(matches!(db.get_list("ok"), Err(GoError::ListNotFound(_))));

    assert!(matches!(
        db.create_link(&lists(&[]), "https://x.example.com", "", "u"),
        Err(GoError::InvalidInput(_))
    ));
    assert!(matches!(
        db.create_link(&lists(&["ok"]), "  ", "", "u"),
        Err(GoError::InvalidInput(_))
    ));
    assert!(matches!(
        db.create_link(&lists(&[r"^bad(\d+$"]), "https://x.example.com", "", "u"),
        Err(GoError::InvalidKeyword(_))
    ));
}

#[test]
fn test_wildcard_links_get_generative_lists() {
    let db = LinkDatabase::in_memory();
    let link = db
        .create_link(&lists(&["search"]), "https://search.example.com/?q={*}", "", "u")
        .unwrap();

    assert!(link.regex_generated);
    assert_eq!(link.lists, vec!["search/"]);
    assert!(db.get_list("search/").unwrap().is_generative());
    assert!(db.get_list("search").is_err());
}

#[test]
fn test_delete_link_cascades_to_empty_lists() {
    let db = LinkDatabase::in_memory();
    let keep = db.create_link(&lists(&["a"]), "https://keep.example.com", "", "u").unwrap();
    let gone = db
        .create_link(&lists(&["a", "b"]), "https://gone.example.com", "", "u")
        .unwrap();

    db.delete_link(gone.id).unwrap();

    assert_eq!(db.get_list("a").unwrap().links, vec![keep.id]);
    assert!(matches!(db.get_list("b"), Err(GoError::ListNotFound(_))));
    assert!(matches!(db.get_link(gone.id), Err(GoError::LinkNotFound(_))));
    assert!(matches!(
        db.delete_link(gone.id),
        Err(GoError::LinkNotFound(id)) if id == gone.id
    ));
}

#[test]
fn test_update_link_moves_url_index() {
    let db = LinkDatabase::in_memory();
    let link = db.create_link(&lists(&["a"]), "https://old.example.com", "", "u").unwrap();

    let update = LinkUpdate {
        url: Some("https://new.example.com".to_string()),
        title: Some("New".to_string()),
        lists: None,
    };
    let updated = db.update_link(link.id, update, "bob").unwrap();
    assert_eq!(updated.url, "https://new.example.com");
    assert_eq!(updated.title, "New");
    assert_eq!(updated.edits.len(), 2);
    assert_eq!(updated.last_edit().unwrap().editor, "bob");

    // the old url is free again, the new one is taken
    db.create_link(&lists(&["b"]), "https://old.example.com", "", "u").unwrap();
    assert!(matches!(
        db.create_link(&lists(&["c"]), "https://new.example.com", "", "u"),
        Err(GoError::UrlConflict(_))
    ));
}

#[test]
fn test_update_link_url_conflict() {
    let db = LinkDatabase::in_memory();
    let first = db.create_link(&lists(&["a"]), "https://one.example.com", "", "u").unwrap();
    let second = db.create_link(&lists(&["a"]), "https://two.example.com", "", "u").unwrap();

    let update = LinkUpdate {
        url: Some("https://one.example.com".to_string()),
        ..LinkUpdate::default()
    };
    match db.update_link(second.id, update, "u") {
        Err(GoError::UrlConflict(existing)) => assert_eq!(existing.id, first.id),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(db.get_link(second.id).unwrap().url, "https://two.example.com");
}

#[test]
fn test_update_link_lists() {
    let db = LinkDatabase::in_memory();
    let link = db
        .create_link(&lists(&["a", "b"]), "https://x.example.com", "", "u")
        .unwrap();

    let update = LinkUpdate {
        lists: Some(lists(&["b", "c"])),
        ..LinkUpdate::default()
    };
    let updated = db.update_link(link.id, update, "u").unwrap();

    assert_eq!(updated.lists, vec!["b", "c"]);
    assert!(matches!(db.get_list("a"), Err(GoError::ListNotFound(_))));
    assert_eq!(db.get_list("b").unwrap().links, vec![link.id]);
    assert_eq!(db.get_list("c").unwrap().links, vec![link.id]);

    let update = LinkUpdate {
        lists: Some(Vec::new()),
        ..LinkUpdate::default()
    };
    assert!(matches!(
        db.update_link(link.id, update, "u"),
        Err(GoError::InvalidInput(_))
    ));
    assert!(matches!(
        db.update_link(LinkId(999), LinkUpdate::default(), "u"),
        Err(GoError::LinkNotFound(_))
    ));
}

#[test]
fn test_rename_list() {
    let db = LinkDatabase::in_memory();
    let link = db.create_link(&lists(&["x"]), "https://x.example.com", "", "u").unwrap();
    db.create_link(&lists(&["y"]), "https://y.example.com", "", "u").unwrap();

    assert!(matches!(db.rename_list("x", "y"), Err(GoError::ListConflict(_))));
    assert!(matches!(db.rename_list("nope", "z"), Err(GoError::ListNotFound(_))));

    let renamed = db.rename_list("x", "Z").unwrap();
    assert_eq!(renamed.name, "z");
    assert!(db.get_list("x").is_err());
    assert_eq!(db.get_link(link.id).unwrap().lists, vec!["z"]);

    // the renamed list still cascades correctly
    db.delete_link(link.id).unwrap();
    assert!(db.get_list("z").is_err());
}

#[test]
fn test_delete_list_keeps_links() {
    let db = LinkDatabase::in_memory();
    let link = db
        .create_link(&lists(&["a", "b"]), "https://x.example.com", "", "u")
        .unwrap();

    db.delete_list("a").unwrap();

    assert!(db.get_list("a").is_err());
    assert_eq!(db.get_link(link.id).unwrap().lists, vec!["b"]);
    assert!(matches!(db.delete_list("a"), Err(GoError::ListNotFound(_))));
}

#[test]
fn test_set_list_policy() {
    let db = LinkDatabase::in_memory();
    let link = db.create_link(&lists(&["a"]), "https://x.example.com", "", "u").unwrap();
    let other = db.create_link(&lists(&["b"]), "https://y.example.com", "", "u").unwrap();

    db.set_list_policy("a", Policy::Top).unwrap();
    assert_eq!(db.get_list("a").unwrap().policy, Policy::Top);

    db.set_list_policy("a", Policy::Link(link.id)).unwrap();
    assert_eq!(db.get_list("a").unwrap().policy, Policy::Link(link.id));

    assert!(matches!(
        db.set_list_policy("a", Policy::Link(other.id)),
        Err(GoError::LinkNotFound(_))
    ));
    assert!(matches!(
        db.set_list_policy("missing", Policy::Random),
        Err(GoError::ListNotFound(_))
    ));
}

#[test]
fn test_policy_parsing() {
    assert_eq!("list".parse::<Policy>().unwrap(), Policy::List);
    assert_eq!("top".parse::<Policy>().unwrap(), Policy::Top);
    assert_eq!("42".parse::<Policy>().unwrap(), Policy::Link(LinkId(42)));
    assert!("sometimes".parse::<Policy>().is_err());
    assert_eq!(Policy::Link(LinkId(7)).to_string(), "7");
}

#[test]
fn test_special_links() {
    let db = LinkDatabase::in_memory();
    let plain = db.create_link(&lists(&["plain"]), "https://p.example.com", "", "u").unwrap();
    let wildcard = db
        .create_link(&lists(&["search"]), "https://s.example.com/{*}", "", "u")
        .unwrap();
    let pattern = db
        .create_link(&lists(&[r"^bug-(\d+)$"]), "https://bugs.example.com/{1}", "", "u")
        .unwrap();

    let special: Vec<_> = db.special_links().unwrap().into_iter().map(|l| l.id).collect();
    assert!(special.contains(&wildcard.id));
    assert!(special.contains(&pattern.id));
    assert!(!special.contains(&plain.id));
}

#[test]
fn test_top_links_and_main_keyword() {
    let db = LinkDatabase::in_memory();
    let a = db.create_link(&lists(&["a"]), "https://a.example.com", "", "u").unwrap();
    let b = db
        .create_link(&lists(&["b", "shared"]), "https://b.example.com", "", "u")
        .unwrap();

    db.follow_link(b.id).unwrap();
    db.follow_link(b.id).unwrap();
    db.follow_link(a.id).unwrap();

    let top: Vec<_> = db.top_links(10).unwrap().into_iter().map(|l| l.id).collect();
    assert_eq!(top, vec![b.id, a.id]);
    assert_eq!(db.top_links(1).unwrap().len(), 1);

    db.set_list_policy("shared", Policy::List).unwrap();
    assert_eq!(db.main_keyword(b.id).unwrap().unwrap().name, "b");

    db.set_list_policy("b", Policy::List).unwrap();
    assert!(db.main_keyword(b.id).unwrap().is_none());
}

#[test]
fn test_variables() {
    let db = LinkDatabase::in_memory();
    db.set_variable("jira", "jira.example.com").unwrap();

    assert_eq!(db.variables().unwrap()["jira"], "jira.example.com");
    assert!(matches!(db.set_variable("", "x"), Err(GoError::InvalidInput(_))));
    assert!(matches!(db.set_variable("1", "x"), Err(GoError::InvalidInput(_))));
    assert!(matches!(db.set_variable("{a}", "x"), Err(GoError::InvalidInput(_))));
}

#[test]
fn test_redb_store_persists_and_enforces_uniqueness() {
    let (db, temp_db) = redb_database();
    let link = db
        .create_link(&lists(&["a", "b"]), "https://x.example.com", "X", "u")
        .unwrap();
    db.follow_link(link.id).unwrap();
    drop(db);

    // reopen the same file
    let db = LinkDatabase::new(init_db(temp_db.path()).unwrap());
    let reloaded = db.get_link(link.id).unwrap();
    assert_eq!(reloaded.title, "X");
    assert_eq!(reloaded.click_count(), 1);
    assert_eq!(db.get_list("b").unwrap().links, vec![link.id]);

    assert!(matches!(
        db.create_link(&lists(&["c"]), "https://x.example.com", "", "u"),
        Err(GoError::UrlConflict(_))
    ));

    db.delete_link(link.id).unwrap();
    assert!(db.get_list("a").is_err());
    assert!(db.get_list("b").is_err());
}

#[test]
fn test_snapshot_round_trip() {
    let source = LinkDatabase::in_memory();
    let a = source.create_link(&lists(&["a"]), "https://a.example.com", "A", "u").unwrap();
    source
        .create_link(&lists(&["a", "b"]), "https://b.example.com", "B", "u")
        .unwrap();
    source.set_list_policy("a", Policy::Link(a.id)).unwrap();
    source.set_variable("host", "example.com").unwrap();

    let snapshot = source.export_snapshot().unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();
    let snapshot: Snapshot = serde_json::from_str(&json).unwrap();

    let target = LinkDatabase::in_memory();
    target
        .create_link(&lists(&["existing"]), "https://other.example.com", "", "u")
        .unwrap();
    let summary = target.import_snapshot(snapshot.clone()).unwrap();
    assert_eq!(summary.links, 2);
    assert_eq!(summary.lists, 2);
    assert_eq!(summary.variables, 1);

    let list_a = target.list_links("a").unwrap();
    let urls: Vec<_> = list_a.links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.example.com", "https://b.example.com"]);
    match list_a.list.policy {
        Policy::Link(id) => assert_eq!(target.get_link(id).unwrap().title, "A"),
        other => panic!("expected fixed link policy, got {}", other),
    }
    assert_eq!(target.variables().unwrap()["host"], "example.com");

    // a second import collides and changes nothing
    assert!(matches!(
        target.import_snapshot(snapshot),
        Err(GoError::UrlConflict(_))
    ));
    assert_eq!(target.top_links(100).unwrap().len(), 3);
}

#[test]
fn test_dump_tsv() {
    let db = LinkDatabase::in_memory();
    db.create_link(&lists(&["a", "b"]), "https://a.example.com", "A", "u")
        .unwrap();

    let mut out = Vec::new();
    db.dump_tsv(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "a|b\tA\thttps://a.example.com\n");
}

#[test]
fn test_unknown_patterns_are_not_cached() {
    let db = LinkDatabase::in_memory();

    for i in 0..500 {
        let name = format!(r"^nope{}\d", i);
        assert!(matches!(db.get_list(&name), Err(GoError::ListNotFound(_))));
        assert!(db.list_links(&name).is_err());
        assert!(db.delete_list(&name).is_err());
        assert!(db.set_list_policy(&name, Policy::Top).is_err());
    }
    assert!(db
        .create_link(&lists(&[r"^never\d", "bad_name"]), "https://x.example.com", "", "u")
        .is_err());

    assert_eq!(db.cached_pattern_count(), 0);
}

#[test]
fn test_pattern_cache_follows_stored_lists() {
    let db = LinkDatabase::in_memory();
    let link = db
        .create_link(&lists(&[r"^bug-(\d+)$"]), "https://bugs.example.com/{*}", "", "u")
        .unwrap();
    assert_eq!(db.cached_pattern_count(), 0);

    db.resolve("/bug-1").unwrap();
    assert_eq!(db.cached_pattern_count(), 1);

    db.rename_list(r"^bug-(\d+)$", r"^issue-(\d+)$").unwrap();
    assert_eq!(db.cached_pattern_count(), 0);
    db.resolve("/issue-1").unwrap();
    assert_eq!(db.cached_pattern_count(), 1);

    // emptied by the cascade
    db.delete_link(link.id).unwrap();
    assert_eq!(db.cached_pattern_count(), 0);

    db.create_link(&lists(&[r"^t-(\d+)$"]), "https://t.example.com/{*}", "", "u")
        .unwrap();
    db.resolve("/t-1").unwrap();
    db.delete_list(r"^t-(\d+)$").unwrap();
    assert_eq!(db.cached_pattern_count(), 0);
}

#[test]
fn test_rename_generative_list_stays_generative() {
    let db = LinkDatabase::in_memory();
    let link = db
        .create_link(&lists(&["docs"]), "https://docs.example.com/{*}", "", "u")
        .unwrap();

    let renamed = db.rename_list("docs/", "manual").unwrap();
    assert_eq!(renamed.name, "manual/");
    assert!(renamed.is_generative());
    assert_eq!(db.get_link(link.id).unwrap().lists, vec!["manual/"]);

    match db.resolve("/manual/page").unwrap() {
        Resolution::Redirect { url, .. } => assert_eq!(url, "https://docs.example.com/page"),
        other => panic!("expected redirect, got {:?}", other),
    }
}

#[test]
fn test_regex_lists_survive_reopen_rename_and_delete() {
    let (db, temp_db) = redb_database();
    db.create_link(&lists(&["plain"]), "https://plain.example.com", "", "u")
        .unwrap();
    db.create_link(&lists(&[r"^bug-(\d+)$"]), "https://bugs.example.com/{*}", "", "u")
        .unwrap();
    drop(db);

    let db = LinkDatabase::new(init_db(temp_db.path()).unwrap());
    assert!(matches!(db.resolve("/bug-7").unwrap(), Resolution::Redirect { .. }));

    db.rename_list(r"^bug-(\d+)$", r"^ticket-(\d+)$").unwrap();
    assert!(matches!(db.resolve("/bug-7").unwrap(), Resolution::NotFound { .. }));
    match db.resolve("/ticket-7").unwrap() {
        Resolution::Redirect { url, .. } => assert_eq!(url, "https://bugs.example.com/7"),
        other => panic!("expected redirect, got {:?}", other),
    }

    db.delete_list(r"^ticket-(\d+)$").unwrap();
    assert!(matches!(db.resolve("/ticket-7").unwrap(), Resolution::NotFound { .. }));
}

#[test]
fn test_control_characters_are_rejected() {
    let db = LinkDatabase::in_memory();

    assert!(matches!(
        db.create_link(&lists(&["a"]), "https://x.example.com/\u{7f}", "", "u"),
        Err(GoError::InvalidInput(_))
    ));
    assert!(db.get_list("a").is_err());

    let link = db.create_link(&lists(&["a"]), "https://x.example.com", "", "u").unwrap();
    let update = LinkUpdate {
        url: Some("https://x.example.com/\u{0}".to_string()),
        ..LinkUpdate::default()
    };
    assert!(matches!(
        db.update_link(link.id, update, "u"),
        Err(GoError::InvalidInput(_))
    ));
    assert_eq!(db.get_link(link.id).unwrap().url, "https://x.example.com");

    assert!(matches!(
        db.set_variable("host", "evil\r\nSet-Cookie: a=b"),
        Err(GoError::InvalidInput(_))
    ));
    assert!(db.variables().unwrap().is_empty());
}

#[test]
fn test_import_drops_references_to_skipped_lists() {
    let source = LinkDatabase::in_memory();
    let link = source
        .create_link(&lists(&["a", "b"]), "https://x.example.com", "", "u")
        .unwrap();

    let mut snapshot = source.export_snapshot().unwrap();
    // list b loses its only member, so the import skips it
    for list in &mut snapshot.lists {
        if list.name == "b" {
            list.links.clear();
        }
    }
    assert_eq!(snapshot.links[0].id, link.id);

    let target = LinkDatabase::in_memory();
    let summary = target.import_snapshot(snapshot).unwrap();
    assert_eq!(summary.lists, 1);

    let imported = target.list_links("a").unwrap().links;
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].lists, vec!["a"]);
    assert!(target.get_list("b").is_err());
}

#[test]
fn test_import_validates_list_names() {
    let source = LinkDatabase::in_memory();
    source
        .create_link(&lists(&["a"]), "https://x.example.com", "", "u")
        .unwrap();

    let mut snapshot = source.export_snapshot().unwrap();
    snapshot.lists[0].name = "Not_Valid".to_string();
    snapshot.links[0].lists = vec!["Not_Valid".to_string()];

    let target = LinkDatabase::in_memory();
    assert!(matches!(
        target.import_snapshot(snapshot.clone()),
        Err(GoError::InvalidKeyword(_))
    ));
    assert!(target.top_links(10).unwrap().is_empty());

    snapshot.lists[0].name = "Mixed".to_string();
    snapshot.links[0].lists = vec!["Mixed".to_string()];
    target.import_snapshot(snapshot).unwrap();
    let list = target.list_links("mixed").unwrap();
    assert_eq!(list.links[0].lists, vec!["mixed"]);
}
