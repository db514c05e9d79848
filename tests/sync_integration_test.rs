//! End-to-end tests: SQLite record store transactions driving index
//! synchronization through the commit hooks, plus reindex and ordered search.

use tempfile::TempDir;

use searchsync::{
    CommitOutcome, Document, EntityType, FieldKind, FieldValue, RecordId, RecordSnapshot,
    RecordStore, ResultWindow, Searcher, SqliteRecordStore, SyncConfig, SyncError, SyncSession,
    Synchronizer,
};

fn post_type() -> EntityType {
    EntityType::new("post")
        .with_field("title", FieldKind::Text)
        .with_field("body", FieldKind::Text)
}

async fn harness(tmp: &TempDir) -> (Synchronizer, SqliteRecordStore) {
    let config = SyncConfig::builder()
        .index_root(tmp.path().join("indexes"))
        .build()
        .unwrap();
    let sync = Synchronizer::new(Searcher::new(config));
    let store = SqliteRecordStore::open(&tmp.path().join("records.sqlite"))
        .await
        .unwrap();
    (sync, store)
}

fn post(id: i64, title: &str, body: &str) -> RecordSnapshot {
    RecordSnapshot::new("post", id)
        .with_field("title", FieldValue::text(title))
        .with_field("body", FieldValue::text(body))
}

#[tokio::test]
async fn committed_inserts_become_searchable() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    let mut tx = store.begin();
    tx.insert(&entity, post(1, "hello search", "body text"));
    tx.insert(&entity, post(2, "unrelated", "other text"));
    let report = tx.commit(&sync).await.unwrap();
    assert_eq!(report.upserted, 2);
    assert!(report.is_clean());

    let (records, total) = sync
        .search(&store, &entity, "title", "hello", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, RecordId::from(1_i64));
    assert_eq!(
        records[0].field("title"),
        Some(&FieldValue::text("hello search"))
    );
}

#[tokio::test]
async fn committed_updates_and_deletes_reach_the_index() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    let mut tx = store.begin();
    tx.insert(&entity, post(1, "draft title", "draft body"));
    tx.insert(&entity, post(2, "doomed", "going away"));
    tx.commit(&sync).await.unwrap();

    let mut tx = store.begin();
    tx.update(&entity, post(1, "published title", "final body"));
    tx.delete(&entity, RecordSnapshot::new("post", 2_i64));
    let report = tx.commit(&sync).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.removed, 1);

    let (_, stale_total) = sync
        .search(&store, &entity, "title", "draft", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(stale_total, 0);

    let (_, gone_total) = sync
        .search(&store, &entity, "title", "doomed", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(gone_total, 0);

    let (records, total) = sync
        .search(&store, &entity, "title", "published", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(records[0].id, RecordId::from(1_i64));
}

#[tokio::test]
async fn abandoned_transaction_indexes_nothing() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    let mut tx = store.begin();
    tx.insert(&entity, post(1, "never committed", "rolled back"));
    tx.rollback();

    let (records, total) = sync
        .search(&store, &entity, "title", "never", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(records.is_empty());
}

#[tokio::test]
async fn failed_store_commit_indexes_nothing() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    // No ensure_table: the SQL apply fails and the outcome is rolled back.

    let mut tx = store.begin();
    tx.insert(&entity, post(1, "phantom", "no table"));
    assert!(tx.commit(&sync).await.is_err());

    let hits = sync
        .searcher()
        .query(&entity, "title", "phantom", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(hits.total, 0);
}

#[tokio::test]
async fn rolled_back_hook_sequence_clears_without_applying() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    // Drive the event pair directly: capture happens, the store commit fails,
    // and the after-commit handler discards the captured set.
    struct OneInsert(RecordSnapshot);
    impl searchsync::ChangeTracking for OneInsert {
        fn added(&self) -> searchsync::SyncResult<Vec<RecordSnapshot>> {
            Ok(vec![self.0.clone()])
        }
        fn modified(&self) -> searchsync::SyncResult<Vec<RecordSnapshot>> {
            Ok(Vec::new())
        }
        fn deleted(&self) -> searchsync::SyncResult<Vec<RecordSnapshot>> {
            Ok(Vec::new())
        }
    }

    let mut session = SyncSession::new();
    let tracker = OneInsert(post(9, "captured", "then discarded"));
    sync.before_commit(&mut session, &tracker).unwrap();
    assert!(session.has_pending());

    let report = sync.after_commit(&mut session, CommitOutcome::RolledBack).await;
    assert_eq!(report.upserted, 0);
    assert!(!session.has_pending());

    let hits = sync
        .searcher()
        .query(&entity, "title", "captured", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(hits.total, 0);
}

#[tokio::test]
async fn apply_failure_is_reported_while_the_rest_still_applies() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let posts = post_type();
    let notes = EntityType::new("note").with_field("title", FieldKind::Text);
    sync.register(posts.clone());
    sync.register(notes.clone());
    store.ensure_table(&posts).await.unwrap();
    store.ensure_table(&notes).await.unwrap();

    // Occupy the note index path with a regular file so the index can never
    // be created and the note's post-commit upsert fails.
    let index_root = tmp.path().join("indexes");
    std::fs::create_dir_all(&index_root).unwrap();
    std::fs::write(index_root.join("note"), b"in the way").unwrap();

    let mut tx = store.begin();
    tx.insert(&posts, post(1, "first survivor", "body"));
    tx.insert(
        &notes,
        RecordSnapshot::new("note", 5_i64).with_field("title", FieldValue::text("doomed")),
    );
    tx.insert(&posts, post(2, "second survivor", "body"));
    let report = tx.commit(&sync).await.unwrap();

    // Fail open: the one broken record is reported, the others went through.
    assert_eq!(report.upserted, 2);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        SyncError::PartialSync { entity, id, .. } => {
            assert_eq!(entity, "note");
            assert_eq!(id, "5");
        }
        other => panic!("expected PartialSync, got {other}"),
    }
    assert!(report.failures[0].needs_reindex());

    // The store commit stands for every record, including the failed one.
    assert_eq!(store.scan(&posts).await.unwrap().len(), 2);
    assert_eq!(store.scan(&notes).await.unwrap().len(), 1);

    let (_, total) = sync
        .search(&store, &posts, "title", "survivor", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn failed_capture_aborts_the_commit_and_applies_nothing() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    // Tracking whose state is already gone: capture must fail closed, before
    // any record write happens.
    struct BrokenTracking;
    impl searchsync::ChangeTracking for BrokenTracking {
        fn added(&self) -> searchsync::SyncResult<Vec<RecordSnapshot>> {
            Err(SyncError::Store("tracking state discarded".into()))
        }
        fn modified(&self) -> searchsync::SyncResult<Vec<RecordSnapshot>> {
            Ok(Vec::new())
        }
        fn deleted(&self) -> searchsync::SyncResult<Vec<RecordSnapshot>> {
            Ok(Vec::new())
        }
    }

    let mut session = SyncSession::new();
    let err = sync.before_commit(&mut session, &BrokenTracking).unwrap_err();
    assert!(err.aborts_commit());
    assert!(!session.has_pending());

    // The abort path still runs the post-commit handler; nothing applies and
    // no stale capture survives into the next transaction.
    let report = sync.after_commit(&mut session, CommitOutcome::RolledBack).await;
    assert_eq!(report.upserted, 0);
    assert!(report.is_clean());

    assert!(store.scan(&entity).await.unwrap().is_empty());
    let hits = sync
        .searcher()
        .query(&entity, "title", "discarded", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(hits.total, 0);
}

#[tokio::test]
async fn unregistered_types_are_ignored_by_the_apply() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let registered = post_type();
    let unregistered = EntityType::new("draft").with_field("title", FieldKind::Text);
    sync.register(registered.clone());
    store.ensure_table(&registered).await.unwrap();
    store.ensure_table(&unregistered).await.unwrap();

    let mut tx = store.begin();
    tx.insert(&registered, post(1, "indexed", "yes"));
    tx.insert(
        &unregistered,
        RecordSnapshot::new("draft", 1_i64).with_field("title", FieldValue::text("indexed")),
    );
    let report = tx.commit(&sync).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn search_preserves_rank_order_over_native_id_order() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    // Equal-length bodies with descending term frequency: relevance order is
    // 7, 2, 9 while the store's native order would be 2, 7, 9.
    let mut tx = store.begin();
    tx.insert(&entity, post(7, "a", "needle needle needle"));
    tx.insert(&entity, post(2, "b", "needle needle padding"));
    tx.insert(&entity, post(9, "c", "needle padding padding"));
    tx.commit(&sync).await.unwrap();

    let (records, total) = sync
        .search(&store, &entity, "body", "needle", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 3);
    let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            RecordId::from(7_i64),
            RecordId::from(2_i64),
            RecordId::from(9_i64)
        ]
    );
}

#[tokio::test]
async fn zero_match_search_returns_empty_selection_and_zero() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    let (records, total) = sync
        .search(&store, &entity, "title", "absent", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(records.is_empty());
}

#[tokio::test]
async fn paged_search_returns_the_page_and_the_full_total() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    let mut tx = store.begin();
    for i in 1..=25_i64 {
        tx.insert(&entity, post(i, "page fodder", "repeated body"));
    }
    tx.commit(&sync).await.unwrap();

    let (records, total) = sync
        .search(
            &store,
            &entity,
            "title",
            "fodder",
            ResultWindow::Page {
                page: 2,
                per_page: 10,
            },
        )
        .await
        .unwrap();
    assert_eq!(total, 25);
    assert_eq!(records.len(), 10);
}

#[tokio::test]
async fn reindex_rebuilds_from_current_store_contents() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity = post_type();
    sync.register(entity.clone());
    store.ensure_table(&entity).await.unwrap();

    let mut tx = store.begin();
    tx.insert(&entity, post(1, "kept record", "still here"));
    tx.commit(&sync).await.unwrap();

    // Plant a stale document for a record the store never held.
    let ghost = Document::new("ghost").with_field("title", FieldValue::text("kept record"));
    sync.searcher().upsert(&entity, ghost).await.unwrap();

    let (_, before_total) = sync
        .search(&store, &entity, "title", "kept", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(before_total, 2);

    let indexed = sync.reindex(&store, &entity).await.unwrap();
    assert_eq!(indexed, 1);

    let (records, total) = sync
        .search(&store, &entity, "title", "kept", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(records[0].id, RecordId::from(1_i64));
}

#[tokio::test]
async fn reindex_recovers_from_schema_drift() {
    let tmp = TempDir::new().unwrap();
    let (sync, store) = harness(&tmp).await;
    let entity_v1 = post_type();
    sync.register(entity_v1.clone());
    store.ensure_table(&entity_v1).await.unwrap();

    let mut tx = store.begin();
    tx.insert(&entity_v1, post(1, "before drift", "original body"));
    tx.commit(&sync).await.unwrap();

    // Release the first registry's writer lock before reopening the index.
    drop(sync);

    // Same index root, narrower declaration: open detects drift.
    let entity_v2 = EntityType::new("post").with_field("title", FieldKind::Text);
    let config = SyncConfig::builder()
        .index_root(tmp.path().join("indexes"))
        .build()
        .unwrap();
    let sync2 = Synchronizer::new(Searcher::new(config));
    sync2.register(entity_v2.clone());

    let err = sync2
        .search(&store, &entity_v2, "title", "drift", ResultWindow::All)
        .await
        .unwrap_err();
    assert!(err.needs_reindex());

    sync2.reindex(&store, &entity_v2).await.unwrap();
    let (records, total) = sync2
        .search(&store, &entity_v2, "title", "drift", ResultWindow::All)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(records[0].id, RecordId::from(1_i64));
}
