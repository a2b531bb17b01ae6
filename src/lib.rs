//! # StratumDB
//!
//! An embeddable, single-writer key-value storage engine built on a
//! **leveled Log-Structured Merge tree (LSM-tree)**. Designed for fast
//! writes over an arena-backed in-memory buffer, with durable state
//! held in immutable sorted table files.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                       Engine                           │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────┐   │
//! │  │  Active    │   │  Immutable   │   │   Tables    │   │
//! │  │  MemDb     │   │  MemDb queue │   │  (on disk,  │   │
//! │  │            │   │              │   │  7 levels)  │   │
//! │  └─────┬──────┘   └──────┬───────┘   └──────┬──────┘   │
//! │        │  rotate         │  minor           │          │
//! │        └────────►        └─────────►        │          │
//! │                                             │          │
//! │  ┌──────────────────────────────────────────┘          │
//! │  │  Major compaction: pick → merge → split → install   │
//! │  └────────────────────────────────────────────────────┐│
//! │                                                        │
//! │  directory of <id>.sst files — no manifest, the files ││
//! │  themselves are the source of truth on reopen          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Public lifecycle — open, put, get, delete, compact, close |
//! | [`memdb`] | Arena-backed skiplist write buffer with merge/split |
//! | [`table`] | Immutable sorted table files: writer, reader, ref counting |
//! | [`level`] | Per-level table indexes and the compaction controller |
//! | [`keyspan`] | Byte-key ordering and interval-overlap primitives |
//! | [`compress`] | Zstd façade for table data blocks |
//! | [`refmap`] | Shared reference counters keyed by file name |
//!
//! ## Key Properties
//!
//! - **Single-writer foreground** — one writer, any number of readers;
//!   `put` never waits on disk I/O.
//! - **Background compaction** — minor (memdb → level 0) and major
//!   (overlap-group merge) workers on independent timers, serialised by
//!   a single-slot gate.
//! - **Self-describing tables** — footer magic plus a CRC-32C over the
//!   index block; data blocks carry zstd frame checksums.
//! - **Reference-counted table lifetime** — files are unlinked only
//!   when the last holder releases them, so readers never race
//!   deletion.
//! - **Pluggable WAL hook** — per-write durability can be layered on
//!   via [`engine::WriteAheadLog`] without the engine owning a log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratumdb::engine::{Engine, EngineConfig};
//!
//! let config = EngineConfig {
//!     path: "/tmp/my_db".into(),
//!     ..EngineConfig::default()
//! };
//!
//! let engine = Engine::open(config).unwrap();
//!
//! // Write
//! engine.put(b"hello", b"world").unwrap();
//!
//! // Read
//! assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! // Delete
//! engine.delete(b"hello").unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), None);
//!
//! // Graceful shutdown
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod compress;
pub mod engine;
pub mod keyspan;
pub mod level;
pub mod memdb;
pub mod refmap;
pub mod table;
