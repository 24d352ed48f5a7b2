use clap::Parser;
use origin_cache::cache::{CacheError, OpContext, OriginCache};
use origin_cache::cli::Cli;
use origin_cache::config::CacheConfig;
use origin_cache::error::ExitCode;
use std::path::Path;
use tempfile::tempdir;

fn run(dir: &Path, args: &[&str]) -> anyhow::Result<ExitCode> {
    let config = dir.join("no-such-config.toml");
    let mut argv = vec![
        "origin-cache".to_string(),
        "--dir".to_string(),
        dir.to_str().unwrap().to_string(),
        "--config".to_string(),
        config.to_str().unwrap().to_string(),
    ];
    argv.extend(args.iter().map(|a| a.to_string()));
    origin_cache::run_app(Cli::try_parse_from(argv).unwrap())
}

fn reopen(dir: &Path) -> OriginCache {
    OriginCache::open(dir, &CacheConfig::default()).unwrap()
}

#[test]
fn test_put_and_get() {
    let dir = tempdir().unwrap();
    let code = run(
        dir.path(),
        &["put", "/a/b.txt", "--size", "10", "--fingerprint", "f1", "--state", "2"],
    )
    .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(run(dir.path(), &["get", "/a/b.txt"]).unwrap(), ExitCode::Success);
    assert_eq!(run(dir.path(), &["--json", "get", "/a/b.txt"]).unwrap(), ExitCode::Success);

    let entry = reopen(dir.path()).get(&OpContext::background(), "/a/b.txt").unwrap();
    assert_eq!(entry.size, 10);
    assert_eq!(entry.content_hash, "f1");
    assert_eq!(entry.state, 2);
}

#[test]
fn test_get_missing_maps_to_not_found_exit_code() {
    let dir = tempdir().unwrap();
    let err = run(dir.path(), &["get", "/missing"]).unwrap_err();
    assert!(err
        .downcast_ref::<CacheError>()
        .is_some_and(CacheError::is_not_found));
    assert_eq!(ExitCode::for_error(&err), ExitCode::NotFound);
}

#[test]
fn test_mv_rm_and_set() {
    let dir = tempdir().unwrap();
    run(dir.path(), &["put", "/a", "--size", "1"]).unwrap();
    run(dir.path(), &["put", "/b", "--size", "2"]).unwrap();
    run(dir.path(), &["mv", "/a", "/b"]).unwrap();
    run(dir.path(), &["set", "/b", "state=5", "sha1=manual"]).unwrap();

    {
        let cache = reopen(dir.path());
        let ctx = OpContext::background();
        let all = cache.get_all(&ctx).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].size, 1);
        assert_eq!(all[0].state, 5);
        assert_eq!(all[0].content_hash, "manual");
    }

    run(dir.path(), &["rm", "/b"]).unwrap();
    assert_eq!(reopen(dir.path()).count(&OpContext::background()).unwrap(), 0);
}

#[test]
fn test_set_unknown_column_fails() {
    let dir = tempdir().unwrap();
    run(dir.path(), &["put", "/a"]).unwrap();
    let err = run(dir.path(), &["set", "/a", "bogus=1"]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_list_and_stats() {
    let dir = tempdir().unwrap();
    run(dir.path(), &["put", "/docs", "--directory"]).unwrap();
    run(dir.path(), &["put", "/docs/a", "--size", "100"]).unwrap();

    let cases: [&[&str]; 5] = [
        &["list"],
        &["list", "/docs"],
        &["--json", "list", "/"],
        &["stats"],
        &["--json", "stats"],
    ];
    for args in cases {
        assert_eq!(run(dir.path(), args).unwrap(), ExitCode::Success, "{args:?}");
    }
}

#[test]
fn test_clear_requires_confirmation() {
    let dir = tempdir().unwrap();
    run(dir.path(), &["put", "/a"]).unwrap();

    assert!(run(dir.path(), &["clear"]).is_err());
    assert_eq!(reopen(dir.path()).count(&OpContext::background()).unwrap(), 1);

    run(dir.path(), &["clear", "--yes"]).unwrap();
    assert_eq!(reopen(dir.path()).count(&OpContext::background()).unwrap(), 0);
}
