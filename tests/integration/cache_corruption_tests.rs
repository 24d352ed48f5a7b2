use chrono::Utc;
use origin_cache::cache::{
    CacheError, DataError, Entry, Fields, Info, OpContext, OriginCache, DATABASE_FILE_NAME,
};
use origin_cache::config::CacheConfig;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_open_corrupted_database() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(DATABASE_FILE_NAME), b"not a sqlite database at all, really").unwrap();

    let err = OriginCache::open(dir.path(), &CacheConfig::default()).unwrap_err();
    assert!(matches!(err, CacheError::OpenFailed { .. }), "got {err:?}");
}

#[test]
fn test_recovery_on_corruption() {
    let dir = tempdir().unwrap();
    let db = dir.path().join(DATABASE_FILE_NAME);
    fs::write(&db, vec![0xAB; 8192]).unwrap();

    let config = CacheConfig {
        recreate_if_corrupt: true,
        ..CacheConfig::default()
    };
    let cache = OriginCache::open(dir.path(), &config).unwrap();
    let ctx = OpContext::background();
    assert_eq!(cache.count(&ctx).unwrap(), 0);

    let info = Info::new(1, "f", Utc::now());
    cache.upsert(&ctx, &Entry::object("/a", &info).unwrap()).unwrap();
    assert_eq!(cache.get(&ctx, "/a").unwrap().size, 1);
}

#[test]
fn test_corrupt_info_blob_is_reported_on_read_only_when_decoded() {
    let dir = tempdir().unwrap();
    let cache = OriginCache::open(dir.path(), &CacheConfig::default()).unwrap();
    let ctx = OpContext::background();

    let info = Info::new(1, "f", Utc::now());
    cache.upsert(&ctx, &Entry::object("/a", &info).unwrap()).unwrap();
    cache
        .modify(&ctx, "/a", &Fields::new().set("info", b"{broken".to_vec()))
        .unwrap();

    let entry = cache.get(&ctx, "/a").unwrap();
    assert!(matches!(entry.decode_info(), Err(DataError::InvalidPayload(_))));
}

#[test]
fn test_unopenable_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain-file");
    fs::write(&file, b"x").unwrap();

    let err = OriginCache::open(&file, &CacheConfig::default()).unwrap_err();
    assert!(matches!(err, CacheError::Io { .. }), "got {err:?}");
}

#[cfg(unix)]
#[test]
fn test_cache_on_readonly_directory() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let sub = dir.path().join("ro");
    fs::create_dir(&sub).unwrap();
    fs::set_permissions(&sub, fs::Permissions::from_mode(0o555)).unwrap();

    // Root ignores permission bits; nothing to check in that case.
    if fs::write(sub.join("probe"), b"x").is_ok() {
        return;
    }

    let err = OriginCache::open(&sub, &CacheConfig::default()).unwrap_err();
    assert!(matches!(err, CacheError::OpenFailed { .. }), "got {err:?}");

    fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();
}
