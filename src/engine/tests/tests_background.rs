#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use tempfile::TempDir;

    use crate::engine::tests::helpers::{background_config, manual_config, numbered_key};
    use crate::engine::{Engine, EngineError, WriteAheadLog};
    use crate::memdb::ValueType;

    #[test]
    fn test_background_workers_flush_and_compact() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(background_config(tmp.path())).unwrap();

        for i in 0..1200 {
            let k = numbered_key(i);
            loop {
                match engine.put(&k, &k) {
                    Ok(()) => break,
                    // The minor worker will drain the queue shortly.
                    Err(EngineError::WriteStopped) => thread::sleep(Duration::from_millis(5)),
                    Err(e) => panic!("put failed: {e}"),
                }
            }
        }

        // Wait for the workers to move the rotated memdbs onto disk.
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let stats = engine.stats().unwrap();
            if stats.immutable_count == 0 && stats.total_table_size > 0 {
                break;
            }
            assert!(Instant::now() < deadline, "background flush never happened");
            thread::sleep(Duration::from_millis(20));
        }

        for i in 0..1200 {
            let k = numbered_key(i);
            assert_eq!(engine.get(&k).unwrap(), Some(k.clone()), "key {i}");
        }

        engine.close().unwrap();
    }

    #[test]
    fn test_close_stops_workers_and_flushes() {
        let tmp = TempDir::new().unwrap();

        {
            let engine = Engine::open(background_config(tmp.path())).unwrap();
            engine.put(b"k", b"v").unwrap();
            engine.close().unwrap();
        }

        // Everything reached disk; a reopen with idle workers sees it.
        let engine = Engine::open(manual_config(tmp.path())).unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
        engine.close().unwrap();
    }

    #[test]
    fn test_dropped_engine_winds_down_workers() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(background_config(tmp.path())).unwrap();
        engine.put(b"k", b"v").unwrap();

        // No close: dropping the last handle must still let the worker
        // threads exit rather than spin forever on a dead engine.
        drop(engine);
        thread::sleep(Duration::from_millis(200));
    }

    struct RecordingWal {
        appends: AtomicUsize,
        tombstones: AtomicUsize,
        synced: AtomicBool,
    }

    impl WriteAheadLog for RecordingWal {
        fn append(&self, _key: &[u8], _value: &[u8], meta: ValueType) -> io::Result<()> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            if meta == ValueType::Tombstone {
                self.tombstones.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn sync(&self) -> io::Result<()> {
            self.synced.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// The engine invokes the WAL hook on every mutation and syncs it
    /// on close; `Arc` lets the test observe the box it handed over.
    struct SharedWal(Arc<RecordingWal>);

    impl WriteAheadLog for SharedWal {
        fn append(&self, key: &[u8], value: &[u8], meta: ValueType) -> io::Result<()> {
            self.0.append(key, value, meta)
        }

        fn sync(&self) -> io::Result<()> {
            self.0.sync()
        }
    }

    #[test]
    fn test_wal_hook_sees_every_mutation() {
        let tmp = TempDir::new().unwrap();
        let wal = Arc::new(RecordingWal {
            appends: AtomicUsize::new(0),
            tombstones: AtomicUsize::new(0),
            synced: AtomicBool::new(false),
        });

        let engine = Engine::open_with_wal(
            manual_config(tmp.path()),
            Some(Box::new(SharedWal(Arc::clone(&wal)))),
        )
        .unwrap();

        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.delete(b"a").unwrap();
        engine.close().unwrap();

        assert_eq!(wal.appends.load(Ordering::SeqCst), 3);
        assert_eq!(wal.tombstones.load(Ordering::SeqCst), 1);
        assert!(wal.synced.load(Ordering::SeqCst));
    }
}
