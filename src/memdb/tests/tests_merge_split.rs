#[cfg(test)]
mod tests {
    use crate::memdb::{MemDb, PutOutcome, ValueType};

    fn numeric_db(cap: usize, start: usize, end: usize) -> MemDb {
        let mut db = MemDb::new(cap);
        for i in start..end {
            let k = i.to_string().into_bytes();
            assert_eq!(db.put(&k, &k, ValueType::Value), PutOutcome::Inserted);
        }
        db
    }

    #[test]
    fn test_merge_non_overlapping() {
        let a = numeric_db(1 << 20, 1000, 5000);
        let b = numeric_db(1 << 20, 2000, 6000);

        let merged = MemDb::merge([&a, &b]).expect("merge");

        assert_eq!(merged.min_key().unwrap(), b"1000");
        assert_eq!(merged.max_key().unwrap(), b"5999");
        assert_eq!(merged.len(), 5000);

        let (value, _) = merged.get(b"3000").expect("key from the overlap");
        assert_eq!(value, b"3000");
    }

    #[test]
    fn test_merge_later_source_wins() {
        let mut old = MemDb::new(4096);
        old.put(b"k", b"old", ValueType::Value);
        old.put(b"only-old", b"1", ValueType::Value);

        let mut new = MemDb::new(4096);
        new.put(b"k", b"new", ValueType::Value);

        // Sources ordered oldest -> newest.
        let merged = MemDb::merge([&old, &new]).expect("merge");
        assert_eq!(merged.get(b"k").unwrap().0, b"new");
        assert_eq!(merged.get(b"only-old").unwrap().0, b"1");
    }

    #[test]
    fn test_merge_tombstone_overrides_value() {
        let mut old = MemDb::new(4096);
        old.put(b"k", b"v", ValueType::Value);

        let mut new = MemDb::new(4096);
        new.put(b"k", b"", ValueType::Tombstone);

        let merged = MemDb::merge([&old, &new]).expect("merge");
        let (_, meta) = merged.get(b"k").expect("tombstone survives the merge");
        assert_eq!(meta, ValueType::Tombstone);
    }

    #[test]
    fn test_merge_accepts_full_sources() {
        // Fill a small DB to the brim; the merge slack must still
        // guarantee acceptance of every entry.
        let mut a = MemDb::new(2048);
        let mut i = 0usize;
        loop {
            let k = format!("{i:04}").into_bytes();
            if a.put(&k, &k, ValueType::Value) == PutOutcome::Full {
                break;
            }
            i += 1;
        }
        assert!(a.len() > 0);

        let b = numeric_db(2048, 100, 110);
        let merged = MemDb::merge([&a, &b]).expect("slack covers both sources");
        assert!(merged.len() >= a.len());
    }

    #[test]
    fn test_split_preserves_all_entries() {
        let src = {
            let mut db = MemDb::new(1 << 20);
            for i in 0..5000usize {
                let k = format!("{i:08}").into_bytes();
                db.put(&k, &k, ValueType::Value);
            }
            db
        };

        let mut total = 0usize;
        let mut chunks = 0usize;
        let mut last_max: Option<Vec<u8>> = None;
        src.split_each::<()>(16 << 10, |chunk| {
            assert!(!chunk.is_empty());
            assert_eq!(chunk.capacity(), 16 << 10);

            // Chunks arrive in ascending, non-overlapping key order.
            if let Some(prev_max) = &last_max {
                assert!(prev_max.as_slice() < chunk.min_key().unwrap());
            }
            last_max = Some(chunk.max_key().unwrap().to_vec());

            total += chunk.len();
            chunks += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(total, src.len());
        assert!(chunks > 1, "expected the source to shard into several chunks");
    }

    #[test]
    fn test_split_single_chunk_when_it_fits() {
        let src = numeric_db(1 << 20, 0, 10);

        let mut chunks = 0usize;
        src.split_each::<()>(1 << 20, |chunk| {
            assert_eq!(chunk.len(), src.len());
            chunks += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(chunks, 1);
    }

    #[test]
    fn test_split_propagates_callback_error() {
        let src = numeric_db(1 << 20, 0, 100);

        let res = src.split_each(256, |_| Err("stop"));
        assert_eq!(res, Err("stop"));
    }
}
