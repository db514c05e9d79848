//! End-to-end walkthrough: register an entity type, commit records through a
//! store transaction, and run ranked, paginated searches over them.
//!
//! Run with `cargo run --example blog_search`.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use searchsync::{
    EntityType, FieldKind, FieldValue, RecordSnapshot, ResultWindow, Searcher, SqliteRecordStore,
    SyncConfig, Synchronizer,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tantivy=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = tempfile::tempdir()?;
    let config = SyncConfig::builder()
        .index_root(data_dir.path().join("indexes"))
        .build()?;
    let sync = Synchronizer::new(Searcher::new(config));

    let post = EntityType::new("post")
        .with_field("title", FieldKind::Text)
        .with_field("body", FieldKind::Text)
        .with_field("tags", FieldKind::Keywords);
    sync.register(post.clone());

    let store = SqliteRecordStore::open(&data_dir.path().join("records.sqlite")).await?;
    store.ensure_table(&post).await?;

    let mut tx = store.begin();
    tx.insert(
        &post,
        RecordSnapshot::new("post", 1_i64)
            .with_field("title", FieldValue::text("Ranked search over records"))
            .with_field("body", FieldValue::text("search search search"))
            .with_field("tags", FieldValue::keywords(["search", "indexing"])),
    );
    tx.insert(
        &post,
        RecordSnapshot::new("post", 2_i64)
            .with_field("title", FieldValue::text("Keeping indexes in sync"))
            .with_field("body", FieldValue::text("search once, then commit"))
            .with_field("tags", FieldValue::keywords(["sync"])),
    );
    let report = tx.commit(&sync).await?;
    tracing::info!(upserted = report.upserted, "Records committed and indexed");

    let (records, total) = sync
        .search(&store, &post, "body", "search", ResultWindow::page(1))
        .await?;
    println!("{total} matches, best first:");
    for record in &records {
        let title = record
            .field("title")
            .map(FieldValue::to_text)
            .unwrap_or_default();
        println!("  #{} {title}", record.id);
    }

    Ok(())
}
