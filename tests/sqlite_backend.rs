//! Embedded-backend integration tests.
//!
//! Each test opens a fresh store on a scratch file. Rows are backdated with a
//! direct connection where a test needs events older than the clock allows.

use chrono::Utc;
use nosh_analytics::{
    AnalyticsConfig, AnalyticsError, AnalyticsStore, EventPayload, ANONYMOUS_USER,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("analytics.db")
}

async fn open_store(dir: &TempDir) -> AnalyticsStore {
    let path = db_path(dir);
    let config = AnalyticsConfig::embedded(path.to_str().unwrap());
    AnalyticsStore::connect(&config).await.unwrap()
}

async fn raw_pool(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new().filename(path);
    SqlitePool::connect_with(options).await.unwrap()
}

/// Shift one row's `created_at` by a SQLite date modifier (e.g. "-2 hours").
async fn backdate(path: &Path, id: i64, modifier: &str) {
    let pool = raw_pool(path).await;
    sqlx::query(
        "UPDATE discover_web_events
         SET created_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?)
         WHERE id = ?",
    )
    .bind(modifier)
    .bind(id)
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;
}

async fn corrupt_payload(path: &Path, id: i64, raw: &str) {
    let pool = raw_pool(path).await;
    sqlx::query("UPDATE discover_web_events SET payload = ? WHERE id = ?")
        .bind(raw)
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}

#[tokio::test]
async fn insert_and_read_back_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let payload = EventPayload::surface_switch("web", "mobile");
    let id = store
        .insert_event("u1", "surface_switch", "web", &payload)
        .await
        .unwrap();
    assert!(id > 0);

    let events = store.recent_events(Some(1)).await.unwrap();
    assert_eq!(events.len(), 1);

    let recent = &events[0];
    assert_eq!(recent.event.id, id);
    assert_eq!(recent.event.user_id, "u1");
    assert_eq!(recent.event.event_type, "surface_switch");
    assert_eq!(recent.event.surface, "web");
    assert_eq!(recent.event.payload, payload);
    assert_eq!(recent.sequence, 1);

    // created_at is stamped by the storage engine, close to now
    let age = Utc::now() - recent.event.created_at;
    assert!(age.num_seconds().abs() < 60, "unexpected created_at age: {age}");

    store.close().await;
}

#[tokio::test]
async fn recent_events_returns_newest_first_with_limit() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let mut ids = Vec::new();
    for n in 0..5 {
        let id = store
            .insert_event(ANONYMOUS_USER, "view", "web", &EventPayload::feed_view(n))
            .await
            .unwrap();
        ids.push(id);
    }

    let events = store.recent_events(Some(3)).await.unwrap();
    let returned: Vec<i64> = events.iter().map(|e| e.event.id).collect();
    assert_eq!(returned, vec![ids[4], ids[3], ids[2]]);

    store.close().await;
}

#[tokio::test]
async fn sequence_ranks_within_user_and_type_partition() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let empty = EventPayload::empty();
    let first_view = store.insert_event("u1", "view", "web", &empty).await.unwrap();
    let second_view = store.insert_event("u1", "view", "web", &empty).await.unwrap();
    let click = store.insert_event("u1", "click", "web", &empty).await.unwrap();
    let other_user = store.insert_event("u2", "view", "mobile", &empty).await.unwrap();

    let events = store.recent_events(None).await.unwrap();
    assert_eq!(events.len(), 4);

    let sequence_of = |id: i64| {
        events
            .iter()
            .find(|e| e.event.id == id)
            .map(|e| e.sequence)
            .unwrap()
    };

    // newest row of each partition ranks 1, older rows count up
    assert_eq!(sequence_of(second_view), 1);
    assert_eq!(sequence_of(first_view), 2);
    assert_eq!(sequence_of(click), 1);
    assert_eq!(sequence_of(other_user), 1);

    store.close().await;
}

#[tokio::test]
async fn windowed_stats_counts_groups_and_distinct_users() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let empty = EventPayload::empty();
    store.insert_event("u1", "view", "web", &empty).await.unwrap();
    store.insert_event("u1", "click", "web", &empty).await.unwrap();
    store.insert_event("u1", "view", "web", &empty).await.unwrap();
    store.insert_event("u2", "view", "web", &empty).await.unwrap();

    let stats = store.event_stats(None).await.unwrap();

    assert_eq!(stats.total_events, 4);
    assert_eq!(stats.unique_users, 2);

    let view = &stats.by_event_type["view"];
    assert_eq!(view.total, 3);
    assert_eq!(view.by_surface["web"].count, 3);
    assert_eq!(view.by_surface["web"].unique_users, 2);

    let click = &stats.by_event_type["click"];
    assert_eq!(click.total, 1);
    assert_eq!(click.by_surface["web"].unique_users, 1);

    let web = &stats.by_surface["web"];
    assert_eq!(web.total, 4);
    assert_eq!(web.by_event_type["view"].count, 3);

    assert_eq!(stats.event_type_breakdown.len(), 2);

    store.close().await;
}

#[tokio::test]
async fn window_excludes_events_older_than_cutoff() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let empty = EventPayload::empty();
    store.insert_event("u1", "view", "web", &empty).await.unwrap();
    let old = store.insert_event("u1", "view", "web", &empty).await.unwrap();
    backdate(&db_path(&dir), old, "-2 hours").await;

    let narrow = store.event_stats(Some(1)).await.unwrap();
    assert_eq!(narrow.total_events, 1);

    let wide = store.event_stats(Some(3)).await.unwrap();
    assert_eq!(wide.total_events, 2);

    // default window (24h) also spans the backdated event
    let default = store.event_stats(None).await.unwrap();
    assert_eq!(default.total_events, 2);

    store.close().await;
}

#[tokio::test]
async fn cleanup_deletes_old_events_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let empty = EventPayload::empty();
    let keep = store.insert_event("u1", "view", "web", &empty).await.unwrap();
    let old_a = store.insert_event("u1", "view", "web", &empty).await.unwrap();
    let old_b = store.insert_event("u2", "click", "web", &empty).await.unwrap();
    backdate(&db_path(&dir), old_a, "-40 days").await;
    backdate(&db_path(&dir), old_b, "-40 days").await;

    // a cutoff beyond the oldest rows removes nothing
    assert_eq!(store.cleanup_old_events(Some(60)).await.unwrap(), 0);

    // default cutoff (30 days) removes the backdated rows
    assert_eq!(store.cleanup_old_events(None).await.unwrap(), 2);

    // second pass with no intervening inserts removes nothing
    assert_eq!(store.cleanup_old_events(None).await.unwrap(), 0);

    let remaining = store.recent_events(None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].event.id, keep);

    store.close().await;
}

#[tokio::test]
async fn malformed_payload_degrades_to_empty_object() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let garbled = store
        .insert_event("u1", "view", "web", &EventPayload::feed_view(3))
        .await
        .unwrap();
    let non_object = store
        .insert_event("u1", "view", "web", &EventPayload::feed_view(4))
        .await
        .unwrap();
    corrupt_payload(&db_path(&dir), garbled, "{not valid json").await;
    corrupt_payload(&db_path(&dir), non_object, "[1, 2, 3]").await;

    // the read succeeds and the broken payloads come back empty
    let events = store.recent_events(None).await.unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.event.payload, EventPayload::empty());
    }

    store.close().await;
}

#[tokio::test]
async fn failed_initialization_gates_every_operation() {
    // a regular file where a directory is needed makes schema init fail
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let path = blocker.join("sub").join("analytics.db");
    let config = AnalyticsConfig::embedded(path.to_str().unwrap());
    let store = AnalyticsStore::connect(&config).await.unwrap();

    let insert = store
        .insert_event("u1", "view", "web", &EventPayload::empty())
        .await;
    assert!(matches!(insert, Err(AnalyticsError::Init(_))));

    // every subsequent operation observes the same failure
    assert!(matches!(
        store.event_stats(None).await,
        Err(AnalyticsError::Init(_))
    ));
    assert!(matches!(
        store.recent_events(None).await,
        Err(AnalyticsError::Init(_))
    ));
    assert!(matches!(
        store.cleanup_old_events(None).await,
        Err(AnalyticsError::Init(_))
    ));

    // close still completes
    store.close().await;
}

#[tokio::test]
async fn close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .insert_event("u1", "view", "web", &EventPayload::empty())
        .await
        .unwrap();

    store.close().await;
    store.close().await;

    // operations after close fail instead of hanging
    assert!(store
        .insert_event("u1", "view", "web", &EventPayload::empty())
        .await
        .is_err());
}

#[tokio::test]
async fn clones_share_the_store() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let clone = store.clone();

    clone
        .insert_event("u1", "view", "web", &EventPayload::empty())
        .await
        .unwrap();

    let events = store.recent_events(None).await.unwrap();
    assert_eq!(events.len(), 1);

    store.close().await;
}
