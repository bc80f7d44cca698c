//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;

use logbook_core::{
  Error as CoreError,
  actions::Actions,
  document::Document,
  entity::{EntityKind, EntityRef, Entry, Mentionable as _, Structure, Topic},
  mention::extract,
  ordering::{OrderingScope, STEP},
  session::Session,
  store::{EntityWrite, LogStore},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn actions() -> Actions<SqliteStore> { Actions::new(store().await) }

/// A saved top-level topic.
async fn topic(a: &Actions<SqliteStore>, session: &Session, name: &str) -> Topic {
  let upserted = a
    .upsert_topic(Topic::new_virtual(session, name, None))
    .await
    .unwrap();
  upserted.entity.into_topic().unwrap()
}

/// A saved entry whose title is `document`.
async fn entry(a: &Actions<SqliteStore>, session: &Session, document: Document) -> Entry {
  let title = document.encode().unwrap();
  let upserted = a
    .upsert_entry(Entry::new_virtual(session, title, None))
    .await
    .unwrap();
  upserted.entity.into_entry().unwrap()
}

async fn load_entry(a: &Actions<SqliteStore>, id: i64) -> Entry {
  a.store()
    .load(EntityRef::entry(id))
    .await
    .unwrap()
    .and_then(|e| e.into_entry())
    .expect("entry exists")
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn persist_assigns_real_id_and_round_trips() {
  let a = actions().await;
  let session = Session::new();

  let draft = Topic::new_virtual(&session, "Garden", None);
  assert!(draft.entity_ref().is_virtual());

  let saved = topic(&a, &session, "Garden").await;
  assert!(saved.id > 0);
  assert!(saved.ordering_index.is_some());

  let loaded = a
    .store()
    .load(EntityRef::topic(saved.id))
    .await
    .unwrap()
    .and_then(|e| e.into_topic())
    .unwrap();
  assert_eq!(loaded, saved);
}

#[tokio::test]
async fn load_missing_returns_none() {
  let s = store().await;
  assert!(s.load(EntityRef::entry(7)).await.unwrap().is_none());
}

#[tokio::test]
async fn entry_name_is_derived_from_title() {
  let a = actions().await;
  let session = Session::new();
  let cy = topic(&a, &session, "Cy").await;

  let saved = entry(
    &a,
    &session,
    Document::new().text("Dinner with ").mention(EntityRef::topic(cy.id), "Cy"),
  )
  .await;
  assert_eq!(saved.name, "Dinner with Cy");
  assert_eq!(load_entry(&a, saved.id).await.name, "Dinner with Cy");
}

#[tokio::test]
async fn plain_text_is_stored_structured() {
  let a = actions().await;
  let session = Session::new();
  let mut t = Topic::new_virtual(&session, "Notes", None);
  t.details = "plaintext:one\ntwo".into();

  let saved = a.upsert_topic(t).await.unwrap().entity.into_topic().unwrap();
  assert!(saved.details.starts_with("structured:"));
  assert_eq!(Document::decode(&saved.details).unwrap().plain_text(), "one\ntwo");
}

#[tokio::test]
async fn corrupt_document_is_rejected_and_nothing_is_written() {
  let a = actions().await;
  let session = Session::new();
  let mut e = Entry::new_virtual(&session, "", None);
  e.details = "richtext:{}".into();

  let err = a.upsert_entry(e).await.unwrap_err();
  assert!(matches!(err, CoreError::Format(_)));
  assert!(a.store().list_ids(EntityKind::Entry).await.unwrap().is_empty());
}

#[tokio::test]
async fn persist_unknown_positive_id_is_not_found() {
  let s = store().await;
  let mut t = Topic::new_virtual(&Session::new(), "Ghost", None);
  t.id = 41;

  let err = s
    .persist(EntityWrite::prepare(t.into()).unwrap())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::NotFound(r)) if r == EntityRef::topic(41)
  ));
}

#[tokio::test]
async fn delete_missing_is_not_found() {
  let a = actions().await;
  let err = a.delete_topic(42).await.unwrap_err();
  assert!(matches!(err, CoreError::NotFound(r) if r == EntityRef::topic(42)));
}

#[tokio::test]
async fn list_ids_is_ascending_per_kind() {
  let a = actions().await;
  let session = Session::new();
  let t1 = topic(&a, &session, "One").await;
  let t2 = topic(&a, &session, "Two").await;
  entry(&a, &session, Document::new().text("unrelated")).await;

  let ids = a.store().list_ids(EntityKind::Topic).await.unwrap();
  assert_eq!(ids, vec![t1.id, t2.id]);
}

// ─── Edges ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn edges_follow_document_mentions() {
  let a = actions().await;
  let session = Session::new();
  let cy = topic(&a, &session, "Cy").await;
  let dot = topic(&a, &session, "Dot").await;

  let mut e = entry(&a, &session, Document::new().mention(EntityRef::topic(cy.id), "Cy")).await;
  let source = EntityRef::entry(e.id);
  assert_eq!(
    a.store().outgoing(source, EntityKind::Topic).await.unwrap(),
    BTreeSet::from([cy.id])
  );

  e.title = Document::new()
    .mention(EntityRef::topic(dot.id), "Dot")
    .encode()
    .unwrap();
  a.upsert_entry(e).await.unwrap();

  assert_eq!(
    a.store().outgoing(source, EntityKind::Topic).await.unwrap(),
    BTreeSet::from([dot.id])
  );
  assert!(
    a.store()
      .backlinks(EntityRef::topic(cy.id), EntityKind::Entry)
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn set_edges_is_idempotent() {
  let s = store().await;
  let source = EntityRef::entry(1);
  let targets = BTreeSet::from([3, 5, 8]);

  let first = s.set_edges(source, EntityKind::Topic, targets.clone()).await.unwrap();
  assert_eq!(first.added, vec![3, 5, 8]);
  assert!(first.removed.is_empty());

  let second = s.set_edges(source, EntityKind::Topic, targets.clone()).await.unwrap();
  assert!(second.is_empty());
  assert_eq!(s.outgoing(source, EntityKind::Topic).await.unwrap(), targets);

  let third = s
    .set_edges(source, EntityKind::Topic, BTreeSet::from([5, 13]))
    .await
    .unwrap();
  assert_eq!(third.added, vec![13]);
  assert_eq!(third.removed, vec![3, 8]);
}

#[tokio::test]
async fn backlinks_are_ordered_by_source_id() {
  let a = actions().await;
  let session = Session::new();
  let cy = topic(&a, &session, "Cy").await;
  let target = EntityRef::topic(cy.id);

  let mut ids = vec![];
  for text in ["a ", "b ", "c "] {
    let e = entry(&a, &session, Document::new().text(text).mention(target, "Cy")).await;
    ids.push(e.id);
  }
  let mut t = Topic::new_virtual(&session, "Other", None);
  t.details = Document::new().mention(target, "Cy").encode().unwrap();
  let other = a.upsert_topic(t).await.unwrap();

  assert_eq!(a.store().backlinks(target, EntityKind::Entry).await.unwrap(), ids);
  assert_eq!(
    a.store().backlinks(target, EntityKind::Topic).await.unwrap(),
    vec![other.id]
  );
  assert!(a.store().backlinks(target, EntityKind::Structure).await.unwrap().is_empty());
}

#[tokio::test]
async fn dangling_mentions_still_produce_edges() {
  let a = actions().await;
  let session = Session::new();
  let e = entry(&a, &session, Document::new().mention(EntityRef::topic(999), "Gone")).await;

  assert_eq!(
    a.store()
      .outgoing(EntityRef::entry(e.id), EntityKind::Topic)
      .await
      .unwrap(),
    BTreeSet::from([999])
  );
}

#[tokio::test]
async fn deletion_prunes_edges_in_both_directions() {
  let a = actions().await;
  let session = Session::new();
  let cy = topic(&a, &session, "Cy").await;
  let mut t = Topic::new_virtual(&session, "Mentions Cy", None);
  t.details = Document::new().mention(EntityRef::topic(cy.id), "Cy").encode().unwrap();
  let source = a.upsert_topic(t).await.unwrap().entity.into_topic().unwrap();
  let e = entry(&a, &session, Document::new().mention(EntityRef::topic(source.id), "Mentions Cy")).await;

  a.delete_topic(source.id).await.unwrap();

  assert!(
    a.store()
      .backlinks(EntityRef::topic(cy.id), EntityKind::Topic)
      .await
      .unwrap()
      .is_empty()
  );
  assert!(
    a.store()
      .outgoing(EntityRef::entry(e.id), EntityKind::Topic)
      .await
      .unwrap()
      .is_empty()
  );
  // The mentioning document itself is left alone.
  let doc = Document::decode(&load_entry(&a, e.id).await.title).unwrap();
  assert!(extract(&doc, None).contains(EntityRef::topic(source.id)));
}

// ─── Rename propagation ──────────────────────────────────────────────────────

#[tokio::test]
async fn rename_propagates_to_backlinking_entries() {
  let a = actions().await;
  let session = Session::new();

  let foo = Topic::new_virtual(&session, "Foo", None);
  assert_eq!(foo.id, -1);
  let foo = a.upsert_topic(foo).await.unwrap().entity.into_topic().unwrap();
  let target = EntityRef::topic(foo.id);

  let e = entry(&a, &session, Document::new().text("Lunch with ").mention(target, "Foo")).await;
  let key_before: Vec<String> = Document::decode(&e.title)
    .unwrap()
    .entity_map
    .keys()
    .cloned()
    .collect();

  let mut renamed = foo.clone();
  renamed.name = "Bar".into();
  let upserted = a.upsert_topic(renamed).await.unwrap();
  let report = upserted.cascade.expect("rename triggers a cascade");
  assert!(report.is_clean());
  assert_eq!(report.updated, vec![EntityRef::entry(e.id)]);

  let reloaded = load_entry(&a, e.id).await;
  let doc = Document::decode(&reloaded.title).unwrap();
  let keys: Vec<String> = doc.entity_map.keys().cloned().collect();
  assert_eq!(keys, key_before);
  let record = &doc.entity_map[&keys[0]];
  assert_eq!(record.cached_label, "Bar");
  assert_eq!(record.referenced_id, foo.id);
  assert_eq!(reloaded.name, "Lunch with Bar");

  assert_eq!(
    a.store().backlinks(target, EntityKind::Entry).await.unwrap(),
    vec![e.id]
  );
}

#[tokio::test]
async fn saving_without_rename_does_not_cascade() {
  let a = actions().await;
  let session = Session::new();
  let mut t = topic(&a, &session, "Foo").await;
  t.pinned = true;
  assert!(a.upsert_topic(t).await.unwrap().cascade.is_none());
}

#[tokio::test]
async fn rename_of_entry_does_not_cascade() {
  let a = actions().await;
  let session = Session::new();
  let mut e = entry(&a, &session, Document::new().text("before")).await;
  e.title = Document::new().text("after").encode().unwrap();
  assert!(a.upsert_entry(e).await.unwrap().cascade.is_none());
}

#[tokio::test]
async fn mention_cycles_terminate() {
  let a = actions().await;
  let session = Session::new();

  let mut first = topic(&a, &session, "A").await;
  let first_ref = EntityRef::topic(first.id);
  let mut second = Topic::new_virtual(&session, "B", None);
  second.details = Document::new().mention(first_ref, "A").encode().unwrap();
  let second = a.upsert_topic(second).await.unwrap().entity.into_topic().unwrap();
  let second_ref = EntityRef::topic(second.id);

  first.details = Document::new().mention(EntityRef::topic(second.id), "B").encode().unwrap();
  let first = a.upsert_topic(first).await.unwrap();
  assert!(first.cascade.is_none());
  let mut first = first.entity.into_topic().unwrap();

  first.name = "A2".into();
  let report = a.upsert_topic(first).await.unwrap().cascade.unwrap();
  assert_eq!(report.updated, vec![EntityRef::topic(second.id)]);

  let mut second = a
    .store()
    .load(EntityRef::topic(second.id))
    .await
    .unwrap()
    .and_then(|e| e.into_topic())
    .unwrap();
  assert_eq!(
    extract(&Document::decode(&second.details).unwrap(), None).get(first_ref),
    Some("A2")
  );

  second.name = "B2".into();
  let report = a.upsert_topic(second).await.unwrap().cascade.unwrap();
  assert_eq!(report.updated, vec![first_ref]);
  assert!(report.failures.is_empty());

  // Renaming A again still reaches B exactly once.
  let mut first = a
    .store()
    .load(first_ref)
    .await
    .unwrap()
    .and_then(|e| e.into_topic())
    .unwrap();
  assert_eq!(
    extract(&Document::decode(&first.details).unwrap(), None).get(second_ref),
    Some("B2")
  );
  first.name = "A3".into();
  let report = a.upsert_topic(first).await.unwrap().cascade.unwrap();
  assert_eq!(report.updated, vec![second_ref]);
  assert!(report.unchanged.is_empty());
  assert!(report.failures.is_empty());
}

#[tokio::test]
async fn rename_continues_past_failed_sources() {
  let a = actions().await;
  let session = Session::new();
  let foo = topic(&a, &session, "Foo").await;
  let target = EntityRef::topic(foo.id);
  let e = entry(&a, &session, Document::new().text("with ").mention(target, "Foo")).await;

  // A backlink whose source row does not exist.
  let missing = EntityRef::entry(500);
  a.store()
    .set_edges(missing, EntityKind::Topic, BTreeSet::from([foo.id]))
    .await
    .unwrap();

  let mut renamed = foo;
  renamed.name = "Bar".into();
  let report = a.upsert_topic(renamed).await.unwrap().cascade.unwrap();
  assert!(!report.is_clean());
  assert_eq!(report.updated, vec![EntityRef::entry(e.id)]);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].entity, missing);
  assert!(matches!(report.failures[0].error, CoreError::Reference(r) if r == missing));

  let reloaded = load_entry(&a, e.id).await;
  assert_eq!(reloaded.name, "with Bar");
}

#[tokio::test]
async fn stale_backlink_without_mention_is_left_unchanged() {
  let a = actions().await;
  let session = Session::new();
  let foo = topic(&a, &session, "Foo").await;
  let e = entry(&a, &session, Document::new().text("no mentions here")).await;

  // An edge with no matching mention in the document.
  a.store()
    .set_edges(EntityRef::entry(e.id), EntityKind::Topic, BTreeSet::from([foo.id]))
    .await
    .unwrap();

  let mut renamed = foo;
  renamed.name = "Bar".into();
  let report = a.upsert_topic(renamed).await.unwrap().cascade.unwrap();
  assert!(report.updated.is_empty());
  assert_eq!(report.unchanged, vec![EntityRef::entry(e.id)]);
}

// ─── Ordering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn allocations_are_strictly_increasing() {
  let s = store().await;
  let scope = OrderingScope::Topics { parent: Some(9) };
  let a = s.allocate_index(scope).await.unwrap();
  let b = s.allocate_index(scope).await.unwrap();
  let c = s.allocate_index(scope).await.unwrap();
  assert!(a < b && b < c);

  // Scopes are independent.
  assert_eq!(s.allocate_index(OrderingScope::Structures).await.unwrap(), STEP);
}

#[tokio::test]
async fn saving_in_place_keeps_the_index() {
  let a = actions().await;
  let session = Session::new();
  let mut t = topic(&a, &session, "Stable").await;
  let index = t.ordering_index;
  t.details = Document::new().text("edited").encode().unwrap();
  t.ordering_index = None;

  let saved = a.upsert_topic(t).await.unwrap().entity.into_topic().unwrap();
  assert_eq!(saved.ordering_index, index);
}

#[tokio::test]
async fn completing_an_entry_moves_it_to_the_end_of_the_new_scope() {
  let a = actions().await;
  let session = Session::new();

  let mut pending = Entry::new_virtual(&session, "plaintext:call", None);
  pending.is_complete = false;
  let pending = a.upsert_entry(pending).await.unwrap().entity.into_entry().unwrap();

  let done = entry(&a, &session, Document::new().text("water plants")).await;
  let mut toggled = done.clone();
  toggled.is_complete = false;
  let toggled = a.upsert_entry(toggled).await.unwrap().entity.into_entry().unwrap();

  assert!(toggled.ordering_index > pending.ordering_index);
  let pending_scope = OrderingScope::Entries { date: None, complete: false };
  assert_eq!(
    a.store().scope_members(pending_scope).await.unwrap(),
    vec![pending.id, toggled.id]
  );
  let complete_scope = OrderingScope::Entries { date: None, complete: true };
  assert!(a.store().scope_members(complete_scope).await.unwrap().is_empty());
}

#[tokio::test]
async fn reparenting_a_topic_places_it_last() {
  let a = actions().await;
  let session = Session::new();
  let parent = topic(&a, &session, "Parent").await;
  let stray = topic(&a, &session, "Stray").await;
  let child = a
    .upsert_topic(Topic::new_virtual(&session, "Child", Some(parent.id)))
    .await
    .unwrap();

  let mut moved = stray;
  moved.parent_id = Some(parent.id);
  let moved = a.upsert_topic(moved).await.unwrap();

  assert_eq!(
    a.store()
      .scope_members(OrderingScope::Topics { parent: Some(parent.id) })
      .await
      .unwrap(),
    vec![child.id, moved.id]
  );
  assert_eq!(
    a.store()
      .scope_members(OrderingScope::Topics { parent: None })
      .await
      .unwrap(),
    vec![parent.id]
  );
}

#[tokio::test]
async fn reorder_moves_between_siblings() {
  let a = actions().await;
  let session = Session::new();
  let mut ids = vec![];
  for name in ["one", "two", "three"] {
    let s = a.upsert_structure(Structure::new_virtual(&session, name)).await.unwrap();
    ids.push(s.id);
  }
  let (one, two, three) = (ids[0], ids[1], ids[2]);

  a.store().reorder(EntityRef::structure(three), Some(one)).await.unwrap();
  assert_eq!(
    a.store().scope_members(OrderingScope::Structures).await.unwrap(),
    vec![one, three, two]
  );

  a.store().reorder(EntityRef::structure(two), None).await.unwrap();
  assert_eq!(
    a.store().scope_members(OrderingScope::Structures).await.unwrap(),
    vec![two, one, three]
  );

  a.store().reorder(EntityRef::structure(two), Some(three)).await.unwrap();
  assert_eq!(
    a.store().scope_members(OrderingScope::Structures).await.unwrap(),
    vec![one, three, two]
  );
}

#[tokio::test]
async fn reorder_renormalizes_when_the_gap_is_exhausted() {
  let a = actions().await;
  let session = Session::new();
  let store = a.store();

  let mut ids = vec![];
  for n in 0..20 {
    let s = a
      .upsert_structure(Structure::new_virtual(&session, format!("s{n}")))
      .await
      .unwrap();
    ids.push(s.id);
  }
  let (head, second) = (ids[0], ids[1]);
  let movers = &ids[2..19];
  let last = ids[19];

  // Each move lands directly after `head`, halving the same gap.
  for &id in movers {
    store.reorder(EntityRef::structure(id), Some(head)).await.unwrap();
  }

  let mut expected = vec![head];
  expected.extend(movers.iter().rev());
  expected.extend([second, last]);
  let members = store.scope_members(OrderingScope::Structures).await.unwrap();
  assert_eq!(members, expected);

  let mut indices = vec![];
  for id in &members {
    let s = store.load(EntityRef::structure(*id)).await.unwrap().unwrap();
    indices.push(s.as_mentionable().ordering_index().unwrap());
  }
  assert!(indices.windows(2).all(|w| w[0] < w[1]));

  let next = store.allocate_index(OrderingScope::Structures).await.unwrap();
  assert!(next > *indices.last().unwrap());
}

#[tokio::test]
async fn reorder_after_unknown_sibling_is_not_found() {
  let a = actions().await;
  let session = Session::new();
  let s = a.upsert_structure(Structure::new_virtual(&session, "only")).await.unwrap();

  let err = a
    .store()
    .reorder(EntityRef::structure(s.id), Some(77))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::NotFound(r)) if r == EntityRef::structure(77)
  ));
}

// ─── Consistency check ───────────────────────────────────────────────────────

#[tokio::test]
async fn consistency_check_repairs_drift_once() {
  let a = actions().await;
  let session = Session::new();
  let foo = topic(&a, &session, "Foo").await;
  let target = EntityRef::topic(foo.id);
  let e = entry(&a, &session, Document::new().text("with ").mention(target, "Foo")).await;
  let source = EntityRef::entry(e.id);

  // Rename behind the cascade's back and drop the edge.
  let mut renamed = foo;
  renamed.name = "Baz".into();
  a.store()
    .persist(EntityWrite::prepare(renamed.into()).unwrap())
    .await
    .unwrap();
  a.store()
    .set_edges(source, EntityKind::Topic, BTreeSet::new())
    .await
    .unwrap();

  let report = a.consistency_check().await.unwrap();
  assert_eq!(report.checked, 2);
  assert_eq!(report.repaired, vec![source]);
  assert!(report.failures.is_empty());

  let repaired = load_entry(&a, e.id).await;
  let doc = Document::decode(&repaired.title).unwrap();
  assert_eq!(extract(&doc, None).get(target), Some("Baz"));
  assert_eq!(repaired.name, "with Baz");
  assert_eq!(
    a.store().outgoing(source, EntityKind::Topic).await.unwrap(),
    BTreeSet::from([target.id])
  );

  let again = a.consistency_check().await.unwrap();
  assert!(again.repaired.is_empty());
}

#[tokio::test]
async fn consistency_check_leaves_unresolvable_mentions_untouched() {
  let a = actions().await;
  let session = Session::new();
  let e = entry(&a, &session, Document::new().mention(EntityRef::topic(999), "Gone")).await;

  let report = a.consistency_check().await.unwrap();
  assert!(report.repaired.is_empty());
  assert!(report.failures.is_empty());
  assert_eq!(load_entry(&a, e.id).await.title, e.title);
}

#[tokio::test]
async fn consistency_check_on_empty_store_is_a_no_op() {
  let a = actions().await;
  let report = a.consistency_check().await.unwrap();
  assert_eq!(report.checked, 0);
  assert!(report.repaired.is_empty());
}
