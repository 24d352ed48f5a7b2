use chrono::Utc;
use origin_cache::cache::{Entry, Info, MemorySink, OpContext, OriginCache, TraceRecord};
use origin_cache::config::CacheConfig;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_one_record_per_statement() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let cache =
        OriginCache::open_with_sink(dir.path(), &CacheConfig::default(), sink.clone()).unwrap();
    assert!(!sink.records().is_empty(), "schema creation is traced");
    sink.clear();

    let ctx = OpContext::background();
    let info = Info::new(10, "f1", Utc::now());
    cache
        .upsert(&ctx, &Entry::object("/a/b.txt", &info).unwrap())
        .unwrap();
    cache.get(&ctx, "/a/b.txt").unwrap();
    assert!(cache.get(&ctx, "/a/nope").is_err());
    cache.delete(&ctx, "/a/b.txt").unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 4);

    let upsert = &records[0];
    assert!(upsert.sql.starts_with("INSERT INTO item_list"));
    assert!(upsert.sql.contains("'/a/'"));
    assert!(upsert.sql.contains("'b.txt'"));
    assert!(!upsert.sql.contains("?1"));
    assert_eq!(upsert.rows_affected, 1);
    assert!(upsert.error_str.is_none());
    assert!(upsert.stack.contains("database.rs"), "{}", upsert.stack);

    assert_eq!(records[1].rows_affected, 1);
    assert_eq!(records[2].rows_affected, 0);
    assert!(records[2].error_str.is_none(), "a miss is not a statement error");
    assert_eq!(records[3].rows_affected, 1);
    assert!(records.iter().all(|r| r.cost_seconds >= 0.0 && r.timestamp > 0));
}

#[test]
fn test_failed_statement_records_error() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let cache =
        OriginCache::open_with_sink(dir.path(), &CacheConfig::default(), sink.clone()).unwrap();
    sink.clear();

    let fields = origin_cache::cache::Fields::new().set("missing_column", 1i64);
    assert!(cache
        .modify(&OpContext::background(), "/a", &fields)
        .is_err());

    let records: Vec<TraceRecord> = sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].error_str.is_some());
    assert_eq!(records[0].rows_affected, 0);
}

#[test]
fn test_disabled_tracing_still_works() {
    let dir = tempdir().unwrap();
    let config = CacheConfig {
        trace: false,
        ..CacheConfig::default()
    };
    let cache = OriginCache::open(dir.path(), &config).unwrap();
    let ctx = OpContext::background();
    cache.upsert(&ctx, &Entry::directory("/d")).unwrap();
    assert_eq!(cache.count(&ctx).unwrap(), 1);
}
