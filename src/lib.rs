//! # BrowserDB
//!
//! An embeddable key-value storage engine for browser-local state —
//! navigation history, cookies, HTTP cache bodies, per-origin storage,
//! and user settings — built on a **Log-Structured Merge Tree
//! (LSM-tree)** over a custom append-only container format (`.bdb`).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────────────────┐  │
//! │  │ Hot cache │  │ Memtable  │  │  Levels 0..9          │  │
//! │  │ (by heat) │  │ (write    │  │  of sealed .bdb       │  │
//! │  │           │  │  buffer)  │  │  sstables             │  │
//! │  └─────┬─────┘  └─────┬─────┘  └───────────┬───────────┘  │
//! │        │  read-through │  flush            │              │
//! │        └──────────►    └─────────►         │              │
//! │                                            │              │
//! │  ┌─────────────────────────────────────────┘              │
//! │  │  Compaction (leveled / size-tiered / hybrid)           │
//! │  └────────────────────────────────────────────────────────│
//! │                                                           │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │   Heat tracker (decayed access frequency)           │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Core storage engine — open, read, write, range, flush, compact |
//! | [`container`] | The `.bdb` on-disk format: header, log entries, footer, CRCs |
//! | [`memtable`] | In-memory write buffer with tombstones and a flush threshold |
//! | [`sstable`] | Immutable, sorted, memory-mapped tables with bloom filters |
//! | [`mapped`] | Bounds-checked memory-mapped file views |
//! | [`heat`] | Per-key access counters with time decay and hot-set extraction |
//! | [`cache`] | Bounded heat-ordered value cache in front of the read path |
//! | [`compaction`] | Leveled, size-tiered, and hybrid merges on a worker pool |
//!
//! ## Key Features
//!
//! - **Append-only containers** — every file is a versioned, CRC-checked
//!   `.bdb` with a statistics footer; single corrupt entries read as
//!   counted misses while the rest of the file keeps serving.
//! - **Ten-level LSM tree** — writes land in the memtable, flush to
//!   Level 0, and migrate deeper through compaction; non-zero levels
//!   stay range-disjoint.
//! - **Bloom-gated reads** — each sstable carries a bloom filter for
//!   fast negative lookups.
//! - **Heat-driven caching** — a decayed access-frequency tracker admits
//!   proven-hot keys into a bounded value cache.
//! - **Crash-safe recovery** — files failing validation are quarantined,
//!   never deleted; partial builds are swept; compaction backs inputs up
//!   before unlinking them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use browserdb::{CompactionStrategy, DbConfig, Engine, TableType};
//!
//! let config = DbConfig {
//!     memtable_max_bytes: 4 * 1024 * 1024,
//!     ..DbConfig::default()
//! };
//!
//! let engine = Engine::open("/tmp/profile/history-db", TableType::History, config).unwrap();
//!
//! // Write
//! engine.put(b"example.org/index".to_vec(), b"visited".to_vec()).unwrap();
//!
//! // Read
//! assert_eq!(
//!     engine.get(b"example.org/index").unwrap(),
//!     Some(b"visited".to_vec())
//! );
//!
//! // Delete
//! engine.delete(b"example.org/index".to_vec()).unwrap();
//! assert_eq!(engine.get(b"example.org/index").unwrap(), None);
//!
//! // Range scan
//! engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
//! engine.put(b"b".to_vec(), b"2".to_vec()).unwrap();
//! let pairs: Vec<_> = engine.range(b"a", b"z").unwrap().collect();
//!
//! // Maintenance
//! engine.flush().unwrap();
//! engine.compact(CompactionStrategy::Hybrid, 0).unwrap();
//!
//! // Graceful shutdown
//! engine.close().unwrap();
//! ```

pub mod cache;
pub mod compaction;
pub mod container;
pub mod engine;
pub mod heat;
pub mod mapped;
pub mod memtable;
pub mod sstable;

pub use compaction::{CompactionError, CompactionStrategy};
pub use container::{ContainerError, EntryKind, TableType};
pub use engine::{DbConfig, Engine, EngineError, EngineStats};
