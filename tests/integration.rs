//! End-to-end engine scenarios driven through the public API only.

use std::time::Duration;

use tempfile::TempDir;

use stratumdb::engine::{Engine, EngineConfig, EngineError};

fn config(path: &std::path::Path) -> EngineConfig {
    EngineConfig {
        path: path.to_path_buf(),
        memdb_size: 64 << 10,
        data_block_size: 4 << 10,
        // Idle workers: the tests trigger compaction explicitly.
        minor_compact_interval: Duration::from_secs(3600),
        major_compact_interval: Duration::from_secs(3600),
    }
}

fn key(i: usize) -> Vec<u8> {
    format!("{i:08}").into_bytes()
}

fn put(engine: &Engine, key: &[u8], value: &[u8]) {
    match engine.put(key, value) {
        Ok(()) => {}
        Err(EngineError::WriteStopped) => {
            engine.minor_compact().expect("drain immutable queue");
            engine.put(key, value).expect("put after drain");
        }
        Err(e) => panic!("put failed: {e}"),
    }
}

#[test]
fn round_trip_20k_keys_through_compactions() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::open(config(tmp.path())).unwrap();

    const N: usize = 20_000;
    for i in 0..N {
        let k = key(i);
        put(&engine, &k, &k);
    }

    for i in 0..N {
        let k = key(i);
        assert_eq!(engine.get(&k).unwrap(), Some(k.clone()), "key {i} before compaction");
    }

    engine.minor_compact().unwrap();
    for _ in 0..5 {
        engine.major_compact().unwrap();
    }

    for i in 0..N {
        let k = key(i);
        assert_eq!(engine.get(&k).unwrap(), Some(k.clone()), "key {i} after compaction");
    }
    assert_eq!(engine.get(&key(N)).unwrap(), None);

    engine.close().unwrap();
}

#[test]
fn overwrite_and_delete_through_lifecycle() {
    let tmp = TempDir::new().unwrap();

    {
        let engine = Engine::open(config(tmp.path())).unwrap();

        engine.put(b"k", b"v1").unwrap();
        engine.put(b"k", b"v2").unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));

        engine.put(b"gone", b"soon").unwrap();
        engine.delete(b"gone").unwrap();

        engine.minor_compact().unwrap();
        engine.major_compact().unwrap();

        assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(engine.get(b"gone").unwrap(), None);

        engine.close().unwrap();
    }

    // The directory alone reconstructs the same view.
    let engine = Engine::open(config(tmp.path())).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(engine.get(b"gone").unwrap(), None);
    engine.close().unwrap();
}

#[test]
fn reopen_preserves_bulk_data() {
    let tmp = TempDir::new().unwrap();

    const N: usize = 5_000;
    {
        let engine = Engine::open(config(tmp.path())).unwrap();
        for i in 0..N {
            let k = key(i);
            put(&engine, &k, &k);
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(config(tmp.path())).unwrap();
    for i in (0..N).step_by(37) {
        let k = key(i);
        assert_eq!(engine.get(&k).unwrap(), Some(k.clone()), "key {i} after reopen");
    }
    assert_eq!(engine.get(&key(N + 1)).unwrap(), None);
    engine.close().unwrap();
}
