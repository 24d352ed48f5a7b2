use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use origin_cache::config::CacheConfig;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(CacheConfig::default()));
    let config: CacheConfig = figment.extract().unwrap();
    assert_eq!(config, CacheConfig::default());
    assert_eq!(config.max_idle_readers, 4);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("ORIGIN_CACHE_TEST_ENV_BATCH_SIZE", "7");
    std::env::set_var("ORIGIN_CACHE_TEST_ENV_TRACE", "false");

    let figment = Figment::from(Serialized::defaults(CacheConfig::default()))
        .merge(Env::prefixed("ORIGIN_CACHE_TEST_ENV_").split("__"));
    let config: CacheConfig = figment.extract().unwrap();

    assert_eq!(config.batch_size, 7);
    assert!(!config.trace);

    std::env::remove_var("ORIGIN_CACHE_TEST_ENV_BATCH_SIZE");
    std::env::remove_var("ORIGIN_CACHE_TEST_ENV_TRACE");
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
dir = "/srv/origin"
op_timeout_ms = 1500
recreate_if_corrupt = true
"#,
    )
    .unwrap();

    let config = CacheConfig::load_from(Some(&path)).unwrap();
    assert_eq!(config.dir, Some(PathBuf::from("/srv/origin")));
    assert_eq!(config.op_timeout(), Duration::from_millis(1500));
    assert!(config.recreate_if_corrupt);
    assert_eq!(config.scan_timeout(), Duration::from_secs(60));
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::load_from(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.op_timeout_ms, CacheConfig::default().op_timeout_ms);
}

#[test]
fn test_config_invalid_toml_is_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "batch_size = \"lots\"").unwrap();
    assert!(CacheConfig::load_from(Some(&path)).is_err());
}

#[test]
fn test_config_zero_batch_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "batch_size = 0").unwrap();
    assert!(CacheConfig::load_from(Some(&path)).is_err());
}

#[test]
fn test_config_save_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let config = CacheConfig {
        dir: Some(dir.path().join("cache")),
        batch_size: 250,
        trace: false,
        ..CacheConfig::default()
    };
    config.save(&path).unwrap();

    let loaded: CacheConfig = Figment::from(Serialized::defaults(CacheConfig::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();
    assert_eq!(loaded, config);
}

