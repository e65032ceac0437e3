//! Tunables shared across the engine. `EngineConfig` defaults come from here.

use std::time::Duration;

/// How often the engine drains the collector.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);
/// How often a full reindex logs its progress.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(15);
/// Rows per repository page during a full reindex.
pub const DEFAULT_REINDEX_PAGE_SIZE: usize = 1_000;
/// Scene ids extracted per commit by the batch indexer.
pub const DEFAULT_SCENE_CHUNK_SIZE: usize = 1_000;
/// Hits fetched per page when reverse-looking-up a deleted entity in the index.
pub const DEFAULT_REVERSE_LOOKUP_BATCH: usize = 1_000;
/// Memory budget handed to the tantivy writer.
pub const DEFAULT_WRITER_HEAP_BYTES: usize = 50_000_000;
/// Depth of the bus queue in front of fan-out. Kept at 1 so publishers feel
/// backpressure from slow subscribers.
pub const DEFAULT_BUS_QUEUE_DEPTH: usize = 1;
/// Buffer of each subscriber channel created through `EventBus::subscribe`.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Name of the index directory created under the configured search path.
pub const INDEX_DIR_NAME: &str = "index.tantivy";
