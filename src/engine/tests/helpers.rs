use std::path::Path;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineConfig, EngineError};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small memdbs, effectively disabled background workers: tests drive
/// rotation and compaction deterministically by hand.
pub fn manual_config(path: &Path) -> EngineConfig {
    init_tracing();
    EngineConfig {
        path: path.to_path_buf(),
        memdb_size: 16 << 10,
        data_block_size: 1 << 10,
        minor_compact_interval: Duration::from_secs(3600),
        major_compact_interval: Duration::from_secs(3600),
    }
}

/// Fast ticks: lets the background workers do the flushing.
pub fn background_config(path: &Path) -> EngineConfig {
    init_tracing();
    EngineConfig {
        path: path.to_path_buf(),
        memdb_size: 16 << 10,
        data_block_size: 1 << 10,
        minor_compact_interval: Duration::from_millis(20),
        major_compact_interval: Duration::from_millis(50),
    }
}

/// Put that rides out rotation back-pressure by draining the immutable
/// queue in place of the (idle) minor worker.
pub fn put_riding_backpressure(engine: &Engine, key: &[u8], value: &[u8]) {
    match engine.put(key, value) {
        Ok(()) => {}
        Err(EngineError::WriteStopped) => {
            engine.minor_compact().expect("drain immutable queue");
            engine.put(key, value).expect("put after drain");
        }
        Err(e) => panic!("put failed: {e}"),
    }
}

pub fn numbered_key(i: usize) -> Vec<u8> {
    format!("{i:08}").into_bytes()
}
