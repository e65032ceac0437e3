//! Engine configuration with a fluent builder.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUS_QUEUE_DEPTH, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REINDEX_PAGE_SIZE,
    DEFAULT_REVERSE_LOOKUP_BATCH, DEFAULT_SCENE_CHUNK_SIZE, DEFAULT_SUBSCRIBER_CAPACITY,
    DEFAULT_TICK_INTERVAL, DEFAULT_WRITER_HEAP_BYTES,
};
use crate::error::{IndexError, Result};

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

fn default_progress_interval() -> Duration {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_reindex_page_size() -> usize {
    DEFAULT_REINDEX_PAGE_SIZE
}

fn default_scene_chunk_size() -> usize {
    DEFAULT_SCENE_CHUNK_SIZE
}

fn default_reverse_lookup_batch() -> usize {
    DEFAULT_REVERSE_LOOKUP_BATCH
}

fn default_writer_heap_bytes() -> usize {
    DEFAULT_WRITER_HEAP_BYTES
}

fn default_bus_queue_depth() -> usize {
    DEFAULT_BUS_QUEUE_DEPTH
}

fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}

/// Tunables for the search engine and its background loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Working directory; the index lives in `INDEX_DIR_NAME` below it.
    pub search_path: PathBuf,
    #[serde(default = "default_tick_interval")]
    pub tick_interval: Duration,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: Duration,
    #[serde(default = "default_reindex_page_size")]
    pub reindex_page_size: usize,
    #[serde(default = "default_scene_chunk_size")]
    pub scene_chunk_size: usize,
    #[serde(default = "default_reverse_lookup_batch")]
    pub reverse_lookup_batch: usize,
    #[serde(default = "default_writer_heap_bytes")]
    pub writer_heap_bytes: usize,
    /// Depth of the bus queue ahead of fan-out.
    #[serde(default = "default_bus_queue_depth")]
    pub bus_queue_depth: usize,
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Run a full reindex as soon as a fresh index directory is created.
    #[serde(default = "default_true")]
    pub reindex_on_create: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_path: PathBuf::from("search"),
            tick_interval: DEFAULT_TICK_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            reindex_page_size: DEFAULT_REINDEX_PAGE_SIZE,
            scene_chunk_size: DEFAULT_SCENE_CHUNK_SIZE,
            reverse_lookup_batch: DEFAULT_REVERSE_LOOKUP_BATCH,
            writer_heap_bytes: DEFAULT_WRITER_HEAP_BYTES,
            bus_queue_depth: DEFAULT_BUS_QUEUE_DEPTH,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            reindex_on_create: true,
        }
    }
}

impl EngineConfig {
    /// Start a fluent builder for `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("reindex_page_size", self.reindex_page_size),
            ("scene_chunk_size", self.scene_chunk_size),
            ("reverse_lookup_batch", self.reverse_lookup_batch),
            ("bus_queue_depth", self.bus_queue_depth),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(IndexError::InvalidConfig {
                reason: format!("{name} must be greater than zero"),
            });
        }
        if self.tick_interval.is_zero() || self.progress_interval.is_zero() {
            return Err(IndexError::InvalidConfig {
                reason: "tick and progress intervals must be non-zero".into(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.search_path.join(crate::constants::INDEX_DIR_NAME)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.search_path = path.into();
        self
    }

    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.inner.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.inner.progress_interval = interval;
        self
    }

    #[must_use]
    pub fn reindex_page_size(mut self, size: usize) -> Self {
        self.inner.reindex_page_size = size;
        self
    }

    #[must_use]
    pub fn scene_chunk_size(mut self, size: usize) -> Self {
        self.inner.scene_chunk_size = size;
        self
    }

    #[must_use]
    pub fn reverse_lookup_batch(mut self, size: usize) -> Self {
        self.inner.reverse_lookup_batch = size;
        self
    }

    #[must_use]
    pub fn writer_heap_bytes(mut self, bytes: usize) -> Self {
        self.inner.writer_heap_bytes = bytes;
        self
    }

    #[must_use]
    pub fn bus_queue_depth(mut self, depth: usize) -> Self {
        self.inner.bus_queue_depth = depth;
        self
    }

    #[must_use]
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.inner.subscriber_capacity = capacity;
        self
    }

    #[must_use]
    pub fn reindex_on_create(mut self, enabled: bool) -> Self {
        self.inner.reindex_on_create = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.inner
    }
}
