#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::engine::tests::helpers::{init_tracing, manual_config, numbered_key};
    use crate::engine::{Engine, EngineConfig, EngineError};

    #[test]
    fn test_empty_key_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        assert!(engine.put(b"", b"v").is_err());
        assert!(engine.delete(b"").is_err());

        engine.close().unwrap();
    }

    #[test]
    fn test_oversize_input_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        let huge = vec![b'x'; (u16::MAX as usize) + 1];
        assert!(matches!(
            engine.put(&huge, b"v"),
            Err(EngineError::InputTooLarge)
        ));
        assert!(matches!(
            engine.put(b"k", &huge),
            Err(EngineError::InputTooLarge)
        ));

        // The engine stays usable after the rejection.
        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn test_entry_exceeding_arena_is_rejected() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(EngineConfig {
            path: tmp.path().to_path_buf(),
            memdb_size: 512,
            data_block_size: 256,
            minor_compact_interval: Duration::from_secs(3600),
            major_compact_interval: Duration::from_secs(3600),
        })
        .unwrap();

        // Passes the input cap but cannot fit even an empty arena.
        let value = vec![b'v'; 4096];
        assert!(matches!(
            engine.put(b"k", &value),
            Err(EngineError::InputTooLarge)
        ));

        engine.close().unwrap();
    }

    #[test]
    fn test_write_stopped_backpressure() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(EngineConfig {
            path: tmp.path().to_path_buf(),
            memdb_size: 1 << 10,
            data_block_size: 256,
            minor_compact_interval: Duration::from_secs(3600),
            major_compact_interval: Duration::from_secs(3600),
        })
        .unwrap();

        // With a 1 KiB memdb and the minor worker idle, the immutable
        // queue must fill up and push back.
        let mut stopped = false;
        for i in 0..10_000 {
            let k = numbered_key(i);
            match engine.put(&k, &k) {
                Ok(()) => {}
                Err(EngineError::WriteStopped) => {
                    stopped = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(stopped, "back-pressure never engaged");

        // Draining the queue unblocks writes.
        engine.minor_compact().unwrap();
        engine.put(b"after", b"drain").unwrap();

        engine.close().unwrap();
    }

    #[test]
    fn test_closed_engine_refuses_calls() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(manual_config(tmp.path())).unwrap();

        engine.put(b"k", b"v").unwrap();
        engine.close().unwrap();

        assert!(engine.put(b"k2", b"v").is_err());
        assert!(engine.get(b"k").is_err());
        assert!(engine.major_compact().is_err());

        // Closing twice is fine.
        engine.close().unwrap();
    }
}
