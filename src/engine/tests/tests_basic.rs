#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::engine::Engine;
    use crate::engine::tests::helpers::{manual_config, numbered_key, put_riding_backpressure};

    #[test]
    fn test_put_and_get() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        engine.put(b"hello", b"world").unwrap();
        assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
        assert_eq!(engine.get(b"absent").unwrap(), None);

        engine.close().unwrap();
    }

    #[test]
    fn test_overwrite_wins() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        engine.put(b"k", b"v1").unwrap();
        engine.put(b"k", b"v2").unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));

        // Still v2 once the write has moved through flush + compaction.
        engine.minor_compact().unwrap();
        engine.major_compact().unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));

        engine.close().unwrap();
    }

    #[test]
    fn test_delete_resolves_to_none() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        engine.put(b"k", b"v").unwrap();
        engine.delete(b"k").unwrap();
        assert_eq!(engine.get(b"k").unwrap(), None);

        // Deleting an absent key is a plain tombstone write.
        engine.delete(b"never-existed").unwrap();
        assert_eq!(engine.get(b"never-existed").unwrap(), None);

        engine.close().unwrap();
    }

    #[test]
    fn test_rotation_keeps_data_readable() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        // Enough entries to rotate the 16 KiB memdb several times.
        for i in 0..600 {
            let k = numbered_key(i);
            put_riding_backpressure(&engine, &k, &k);
        }

        let stats = engine.stats().unwrap();
        assert!(
            stats.immutable_count > 0 || stats.tables_per_level[0] > 0,
            "writes must have rotated out of the active memdb"
        );

        // Reads resolve across active + immutable memdbs.
        for i in 0..600 {
            let k = numbered_key(i);
            assert_eq!(engine.get(&k).unwrap(), Some(k.clone()), "key {i}");
        }

        engine.close().unwrap();
    }

    #[test]
    fn test_overwrite_across_rotation() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        engine.put(b"target", b"old").unwrap();

        // Force at least one rotation between the two writes.
        for i in 0..400 {
            let k = numbered_key(i);
            put_riding_backpressure(&engine, &k, &k);
        }
        engine.put(b"target", b"new").unwrap();

        assert_eq!(engine.get(b"target").unwrap(), Some(b"new".to_vec()));

        engine.minor_compact().unwrap();
        engine.major_compact().unwrap();
        assert_eq!(engine.get(b"target").unwrap(), Some(b"new".to_vec()));

        engine.close().unwrap();
    }

    #[test]
    fn test_clone_shares_state() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();
        let clone = engine.clone();

        engine.put(b"k", b"v").unwrap();
        assert_eq!(clone.get(b"k").unwrap(), Some(b"v".to_vec()));

        clone.close().unwrap();
    }
}
