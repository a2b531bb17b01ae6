//! Background compaction workers.
//!
//! Two threads, each a `select!` loop over a periodic tick and the
//! engine's cancellation channel: the minor worker drains the immutable
//! queue into level-0 tables, the major worker runs a full compaction
//! sweep. The controller's single-slot gate serialises the two with
//! each other.
//!
//! Workers hold only a weak reference to the engine between ticks, so
//! an engine handle dropped without `close` still winds down: the
//! cancellation sender drops with the inner state and both loops exit.
//! In-flight work always completes before a worker observes shutdown.
//!
//! An unexpected error (corrupt table, I/O failure) is fatal for the
//! worker: it records the failure on the engine — visible to every
//! subsequent `put`/`get` — and exits.

use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, tick};
use crossbeam::select;
use tracing::{debug, error};

use super::{EngineError, EngineInner};

#[derive(Debug, Clone, Copy)]
enum Task {
    Minor,
    Major,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::Minor => "stratumdb-minor",
            Task::Major => "stratumdb-major",
        }
    }

    fn interval(self, inner: &EngineInner) -> Duration {
        match self {
            Task::Minor => inner.opt().minor_compact_interval,
            Task::Major => inner.opt().major_compact_interval,
        }
    }

    fn run(self, inner: &EngineInner) -> Result<(), EngineError> {
        match self {
            Task::Minor => inner.flush_immutables().map(|_| ()),
            Task::Major => inner.run_major(),
        }
    }
}

/// Spawn the minor and major workers for `inner`.
pub(super) fn spawn(
    inner: &Arc<EngineInner>,
    shutdown: Receiver<()>,
) -> io::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(2);
    for task in [Task::Minor, Task::Major] {
        let weak = Arc::downgrade(inner);
        let shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name(task.name().to_string())
            .spawn(move || run(task, weak, shutdown))?;
        handles.push(handle);
    }
    Ok(handles)
}

fn run(task: Task, inner: Weak<EngineInner>, shutdown: Receiver<()>) {
    let Some(strong) = inner.upgrade() else {
        return;
    };
    let ticker = tick(task.interval(&strong));
    drop(strong);

    loop {
        select! {
            recv(ticker) -> _ => {
                // The engine may have been dropped between ticks.
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if let Err(e) = task.run(&inner) {
                    error!(worker = task.name(), error = %e, "background worker failed, stopping");
                    inner.record_failure(&e);
                    break;
                }
            }
            recv(shutdown) -> _ => {
                break;
            }
        }
    }

    debug!(worker = task.name(), "background worker stopped");
}
