use chrono::Utc;
use origin_cache::cache::{Entry, EntryType, Fields, Info, OpContext, OriginCache};
use origin_cache::config::CacheConfig;
use tempfile::{tempdir, TempDir};

fn open() -> (TempDir, OriginCache) {
    let dir = tempdir().unwrap();
    let cache = OriginCache::open(dir.path(), &CacheConfig::default()).unwrap();
    (dir, cache)
}

fn object(path: &str, size: i64, fingerprint: &str) -> Entry {
    Entry::object(path, &Info::new(size, fingerprint, Utc::now())).unwrap()
}

#[test]
fn test_upsert_refresh_scenario() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();

    cache.upsert(&ctx, &object("/a/b.txt", 10, "f1")).unwrap();
    let first = cache.get(&ctx, "/a/b.txt").unwrap();
    assert_eq!(first.size, 10);

    cache.upsert(&ctx, &object("/a/b.txt", 20, "f2")).unwrap();
    let second = cache.get(&ctx, "/a/b.txt").unwrap();
    assert_eq!(second.size, 20);
    assert_eq!(second.content_hash, "f2");
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
}

#[test]
fn test_repeated_identical_upsert_is_stable() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();
    let entry = object("/x/y", 7, "fp");

    cache.upsert(&ctx, &entry).unwrap();
    let first = cache.get(&ctx, "/x/y").unwrap();
    cache.upsert(&ctx, &entry).unwrap();
    let second = cache.get(&ctx, "/x/y").unwrap();

    assert_eq!(second.size, first.size);
    assert_eq!(second.content_hash, first.content_hash);
    assert_eq!(second.info, first.info);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(cache.count(&ctx).unwrap(), 1);
}

#[test]
fn test_rename_over_existing_scenario() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();

    cache.upsert(&ctx, &object("/a/b.txt", 10, "fb")).unwrap();
    cache.upsert(&ctx, &object("/a/c.txt", 99, "fc")).unwrap();
    cache.rename(&ctx, "/a/b.txt", "/a/c.txt").unwrap();

    let all = cache.get_all(&ctx).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "c.txt");
    assert_eq!(all[0].size, 10);
    assert_eq!(all[0].content_hash, "fb");
    assert!(cache.get(&ctx, "/a/b.txt").unwrap_err().is_not_found());
}

#[test]
fn test_rename_across_directories() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();

    cache.upsert(&ctx, &object("/src/file", 3, "f")).unwrap();
    cache.rename(&ctx, "/src/file", "/dst/deeper/file2").unwrap();

    assert!(cache.list_dir(&ctx, "/src").unwrap().is_empty());
    let moved = cache.list_dir(&ctx, "/dst/deeper/").unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].path(), "/dst/deeper/file2");
}

#[test]
fn test_delete_all_then_get_all_empty() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();
    let paths = ["/a", "/b/c", "/b/d/e"];
    for p in paths {
        cache.upsert(&ctx, &object(p, 1, "f")).unwrap();
    }

    cache.delete_all(&ctx).unwrap();

    assert!(cache.get_all(&ctx).unwrap().is_empty());
    for p in paths {
        assert!(cache.get(&ctx, p).unwrap_err().is_not_found());
    }
}

#[test]
fn test_directories_and_objects_share_namespace() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();

    cache.upsert(&ctx, &Entry::directory("/photos")).unwrap();
    cache.upsert(&ctx, &object("/photos/a.jpg", 2048, "f")).unwrap();

    let root = cache.list_dir(&ctx, "/").unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].entry_type, EntryType::Directory);

    let photos = cache.list_dir(&ctx, "/photos").unwrap();
    assert_eq!(photos.len(), 1);
    assert!(photos[0].is_object());
}

#[test]
fn test_modify_then_upsert_keeps_state() {
    let (_dir, cache) = open();
    let ctx = OpContext::background();

    cache.upsert(&ctx, &object("/a", 1, "f")).unwrap();
    cache
        .modify(&ctx, "/a", &Fields::new().set("state", 4))
        .unwrap();
    cache.upsert(&ctx, &object("/a", 2, "g")).unwrap();

    let got = cache.get(&ctx, "/a").unwrap();
    assert_eq!(got.state, 4);
    assert_eq!(got.size, 2);
}

#[test]
fn test_info_ranges_survive_roundtrip() {
    use origin_cache::cache::Range;

    let (_dir, cache) = open();
    let ctx = OpContext::background();

    let mut info = Info::new(4096, "fp", Utc::now());
    info.ranges.insert(Range::new(0, 1024));
    info.ranges.insert(Range::new(2048, 1024));
    cache
        .upsert(&ctx, &Entry::object("/big", &info).unwrap())
        .unwrap();

    let decoded = cache
        .get(&ctx, "/big")
        .unwrap()
        .decode_info()
        .unwrap()
        .unwrap();
    assert_eq!(decoded.ranges.covered_bytes(), 2048);
    assert_eq!(
        decoded.ranges.missing(Range::new(0, 4096)),
        vec![Range::new(1024, 1024), Range::new(3072, 1024)]
    );
}

#[test]
fn test_data_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let ctx = OpContext::background();
    {
        let cache = OriginCache::open(dir.path(), &CacheConfig::default()).unwrap();
        cache.upsert(&ctx, &object("/kept", 5, "f")).unwrap();
        cache.close().unwrap();
    }

    let cache = OriginCache::open(dir.path(), &CacheConfig::default()).unwrap();
    assert_eq!(cache.get(&ctx, "/kept").unwrap().size, 5);
}
