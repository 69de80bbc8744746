//! Integration tests for the row store, exercising a real on-disk database.

use cache_store::{CorruptionPolicy, Store, StoreConfig, SyncLevel};
use protocol_mesh::{auth, Row};
use std::io::Write;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("cache.db"))
}

fn row(key: &[u8], value: &[u8], now: u32, expires: u32) -> Row {
    Row::new(key, value, now, expires).unwrap()
}

#[test]
fn test_open_fresh_and_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    assert!(store.get(b"missing").unwrap().is_none());

    let r = row(b"grey:192.0.2.1", b"1", 100, 700);
    store.put(&r).unwrap();

    let got = store.get(b"grey:192.0.2.1").unwrap().unwrap();
    assert_eq!(got.value, b"1");
    assert_eq!(got.hits, 1);
    assert_eq!(got.created, 100);
    assert_eq!(got.touched, 100);
    assert_eq!(got.expires, 700);
    assert_eq!(got.digest, auth::content_digest(b"1"));
}

#[test]
fn test_replace_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    store.put(&row(b"k", b"old", 10, 100)).unwrap();
    let mut updated = row(b"k", b"new", 20, 200);
    updated.created = 10;
    updated.hits = 2;
    store.put(&updated).unwrap();

    let got = store.get(b"k").unwrap().unwrap();
    assert_eq!(got.value, b"new");
    assert_eq!(got.hits, 2);
    assert_eq!(got.created, 10);
    assert_eq!(got.touched, 20);
}

#[test]
fn test_delete() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    store.put(&row(b"k", b"v", 1, 10)).unwrap();
    assert!(store.delete(b"k").unwrap());
    assert!(store.get(b"k").unwrap().is_none());
    assert!(!store.delete(b"k").unwrap());
}

#[test]
fn test_expire_before_sweeps_only_expired() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    store.put(&row(b"a", b"1", 0, 50)).unwrap();
    store.put(&row(b"b", b"2", 0, 100)).unwrap();
    store.put(&row(b"c", b"3", 0, 150)).unwrap();

    assert_eq!(store.expire_before(100).unwrap(), 2);
    assert!(store.get(b"a").unwrap().is_none());
    assert!(store.get(b"b").unwrap().is_none());
    assert!(store.get(b"c").unwrap().is_some());

    assert_eq!(store.expire_before(100).unwrap(), 0);
}

#[test]
fn test_truncate() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    store.put(&row(b"a", b"1", 0, 10)).unwrap();
    store.put(&row(b"b", b"2", 0, 10)).unwrap();
    store.truncate().unwrap();
    assert!(store.get(b"a").unwrap().is_none());
    assert!(store.get(b"b").unwrap().is_none());
}

#[test]
fn test_rows_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let store = Store::open(&config).unwrap();
        store.put(&row(b"durable", b"yes", 5, 500)).unwrap();
    }

    let store = Store::open(&config).unwrap();
    let got = store.get(b"durable").unwrap().unwrap();
    assert_eq!(got.value, b"yes");
}

#[test]
fn test_explicit_transaction_rollback() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    store.begin().unwrap();
    store.put(&row(b"tx", b"v", 0, 10)).unwrap();
    store.rollback().unwrap();
    assert!(store.get(b"tx").unwrap().is_none());
}

#[test]
fn test_explicit_transaction_commit() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&config_in(&dir)).unwrap();

    store.begin().unwrap();
    store.put(&row(b"a", b"1", 0, 10)).unwrap();
    store.put(&row(b"b", b"2", 0, 10)).unwrap();
    store.commit().unwrap();
    assert!(store.get(b"a").unwrap().is_some());
    assert!(store.get(b"b").unwrap().is_some());
}

#[test]
fn test_corrupt_file_renamed_aside() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.corruption = CorruptionPolicy::Rename;

    let mut f = std::fs::File::create(&config.path).unwrap();
    f.write_all(b"this is definitely not a database file, not even close")
        .unwrap();
    drop(f);

    let store = Store::open(&config).unwrap();
    assert!(store.get(b"anything").unwrap().is_none());

    let aside = dir.path().join("cache.db.corrupt");
    assert!(aside.exists(), "damaged file should survive under {:?}", aside);
    assert!(config.path.exists());
}

#[test]
fn test_corrupt_file_replaced() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.corruption = CorruptionPolicy::Replace;

    std::fs::write(&config.path, b"garbage garbage garbage garbage garbage").unwrap();

    let store = Store::open(&config).unwrap();
    assert!(store.get(b"anything").unwrap().is_none());

    assert!(!dir.path().join("cache.db.corrupt").exists());
}

#[test]
fn test_sync_levels_open() {
    for sync in [SyncLevel::Off, SyncLevel::Normal, SyncLevel::Full] {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.sync = sync;
        let store = Store::open(&config).unwrap();
        store.put(&row(b"k", b"v", 0, 10)).unwrap();
        assert!(store.get(b"k").unwrap().is_some());
    }
}

#[test]
fn test_read_only_open() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let store = Store::open(&config).unwrap();
        store.put(&row(b"k", b"v", 0, 10)).unwrap();
    }

    let mut ro = config.clone();
    ro.read_only = true;
    let store = Store::open(&ro).unwrap();
    assert_eq!(store.get(b"k").unwrap().unwrap().value, b"v");
    assert!(store.put(&row(b"k2", b"v2", 0, 10)).is_err());
}
