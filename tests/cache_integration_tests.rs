//! Integration Tests for the Cache Facade
//!
//! Drives the public API end to end: driver selection, key prefixing and the
//! lazy expiry of the file backend.

use std::sync::Arc;

use serde_json::json;
use stashpoint::cache::ManualClock;
use stashpoint::config::FileConfig;
use stashpoint::{Cache, CacheConfig, CacheDriver, CacheError};
use tempfile::TempDir;

// == Helper Functions ==

const START: i64 = 1_700_000_000;

fn file_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        driver: CacheDriver::File,
        file: FileConfig {
            cache_path: Some(dir.path().to_path_buf()),
            app_root: None,
        },
        ..CacheConfig::default()
    }
}

// == File Backend Scenarios ==

#[tokio::test]
async fn test_file_greeting_expires_and_file_is_removed() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = Cache::open_with_clock(&file_config(&dir), clock.clone()).await;
    assert_eq!(cache.driver(), CacheDriver::File);

    assert!(cache.save("greeting", json!("hello"), Some(2)).await);
    assert_eq!(cache.get("greeting").await, Some(json!("hello")));
    assert!(dir.path().join("greeting").exists());

    clock.advance(3);

    assert_eq!(cache.get("greeting").await, None);
    assert!(!dir.path().join("greeting").exists());
}

#[tokio::test]
async fn test_file_prefix_names_the_file() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        key_prefix: "site1_".to_string(),
        ..file_config(&dir)
    };
    let cache = Cache::open(&config).await;

    assert!(cache.save("menu", json!(["home", "about"]), Some(0)).await);
    assert!(dir.path().join("site1_menu").exists());
    assert_eq!(cache.get("menu").await, Some(json!(["home", "about"])));
    assert!(cache.get_metadata("menu").await.is_some());
    assert!(cache.delete("menu").await);
    assert!(!dir.path().join("site1_menu").exists());
}

#[tokio::test]
async fn test_file_clean_leaves_unrelated_storage_alone() {
    let root = TempDir::new().unwrap();
    let cache_dir = root.path().join("cache");
    std::fs::create_dir(&cache_dir).unwrap();
    std::fs::write(root.path().join("keep.txt"), "outside").unwrap();

    let config = CacheConfig {
        file: FileConfig {
            cache_path: None,
            app_root: Some(root.path().to_path_buf()),
        },
        ..CacheConfig::default()
    };
    let cache = Cache::open(&config).await;
    assert_eq!(cache.driver(), CacheDriver::File);

    assert!(cache.save("a", json!(1), None).await);
    assert!(cache.clean().await);

    assert_eq!(cache.get("a").await, None);
    assert!(cache_dir.is_dir());
    assert!(root.path().join("keep.txt").exists());
}

#[tokio::test]
async fn test_file_metadata_expire() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let cache = Cache::open_with_clock(&file_config(&dir), clock).await;

    assert!(cache.get_metadata("never").await.is_none());
    assert!(cache.save("k", json!({"v": true}), Some(45)).await);

    let meta = cache.get_metadata("k").await.unwrap();
    assert_eq!(meta.expire, Some(START + 45));
    assert_eq!(meta.mtime, Some(START));
}

// == Driver Selection ==

#[tokio::test]
async fn test_unsupported_primary_binds_backup() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(&dir);
    config.file.cache_path = Some(dir.path().join("does-not-exist"));
    config.backup = Some(CacheDriver::Wincache);

    let cache = Cache::open(&config).await;

    assert_eq!(cache.driver(), CacheDriver::Wincache);
    assert!(cache.save("k", json!(1), None).await);
    assert_eq!(cache.get("k").await, Some(json!(1)));
}

#[tokio::test]
async fn test_unsupported_without_backup_binds_dummy() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(&dir);
    config.file.cache_path = Some(dir.path().join("does-not-exist"));

    let result = Cache::with_driver(
        CacheDriver::File,
        &config,
        Arc::new(ManualClock::new(START)),
    )
    .await;
    assert!(matches!(
        result,
        Err(CacheError::Unsupported {
            driver: CacheDriver::File,
            fallback: CacheDriver::Dummy
        })
    ));

    let cache = Cache::open(&config).await;
    assert_eq!(cache.driver(), CacheDriver::Dummy);
}

#[tokio::test]
async fn test_config_file_selects_driver() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("cache.toml");
    std::fs::write(
        &config_path,
        "driver = \"apc\"\nbackup = \"file\"\nkey_prefix = \"it_config_\"\ndefault_ttl = 30\n",
    )
    .unwrap();

    let config = CacheConfig::from_file(&config_path).unwrap();
    let cache = Cache::open(&config).await;

    assert_eq!(cache.driver(), CacheDriver::Apc);
    assert_eq!(cache.default_ttl(), 30);
    assert!(cache.save("k", json!("v"), None).await);
    assert_eq!(cache.get("k").await, Some(json!("v")));
    assert!(cache.clean().await);
    assert_eq!(cache.get("k").await, None);
}

// == Dummy Backend ==

#[tokio::test]
async fn test_dummy_scenario() {
    let config = CacheConfig {
        driver: CacheDriver::Dummy,
        ..CacheConfig::default()
    };
    let cache = Cache::open(&config).await;

    assert!(cache.save("x", json!(1), None).await);
    assert_eq!(cache.get("x").await, None);
    assert!(cache.delete("x").await);
    assert!(cache.clean().await);
    assert!(cache.cache_info(None).await.is_none());
    assert!(cache.get_metadata("x").await.is_none());
}

// == Shared Memory Backend ==

#[tokio::test]
async fn test_apc_is_shared_across_instances() {
    let config = CacheConfig {
        driver: CacheDriver::Apc,
        key_prefix: "it_shared_".to_string(),
        ..CacheConfig::default()
    };
    let writer = Cache::open(&config).await;
    let reader = Cache::open(&config).await;

    assert!(writer.save("session", json!({"user": 42}), Some(0)).await);
    assert_eq!(reader.get("session").await, Some(json!({"user": 42})));
    assert!(reader.delete("session").await);
    assert_eq!(writer.get("session").await, None);
}
