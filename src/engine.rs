//! The engine owns the index and runs the background maintenance loop.
//!
//! [`Engine::start`] opens (or creates) the index under the configured search
//! path, subscribes a [`Collector`] to the bus and spawns the loop thread. Each
//! tick takes the collected change set, expands it with the [`Preprocessor`]
//! and writes it with the [`BatchIndexer`]; a full reindex runs on the same
//! thread when requested, while new events keep accumulating in the collector.

use std::fs;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use tracing::instrument;

use crate::bus::EventBus;
use crate::cancel::CancellationToken;
use crate::collector::Collector;
use crate::error::{IndexError, Result};
use crate::index::{self, SearchIndex, SearchPage, SharedIndex};
use crate::indexer::BatchIndexer;
use crate::loader::LoaderSet;
use crate::preprocess::Preprocessor;
use crate::reindex::FullReindexer;
use crate::repository::TransactionManager;
use crate::types::{EngineConfig, Report};

/// Search index maintenance over a store reachable through `M`.
#[derive(Debug)]
pub struct Engine<M> {
    txn: Arc<M>,
    config: EngineConfig,
}

impl<M: TransactionManager + 'static> Engine<M> {
    #[must_use]
    pub fn new(txn: Arc<M>, config: EngineConfig) -> Self {
        Self { txn, config }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start an event bus sized by this engine's configuration.
    pub fn event_bus(&self, cancel: &CancellationToken) -> Result<EventBus> {
        EventBus::with_options(
            self.config.bus_queue_depth,
            self.config.subscriber_capacity,
            cancel,
        )
    }

    /// Open the index and start collecting from `bus`. The loop stops when
    /// `cancel` fires.
    #[instrument(
        target = "media_index::engine",
        skip_all,
        fields(path = %self.config.search_path.display())
    )]
    pub fn start(&self, bus: &EventBus, cancel: &CancellationToken) -> Result<EngineHandle> {
        self.config.validate()?;
        fs::create_dir_all(&self.config.search_path)?;

        let (index, created) =
            SearchIndex::open_or_create(&self.config.index_path(), self.config.writer_heap_bytes)?;
        let index = index.into_shared();

        let (reindex, reindex_rx) = bounded(1);
        if created && self.config.reindex_on_create {
            tracing::info!("new search index created, scheduling full reindex");
            // The channel is fresh, so this cannot be full.
            let _ = reindex.try_send(());
        }

        let collector = Collector::start(bus, cancel)?;
        let stats = Arc::new(Mutex::new(Report::default()));
        let worker = EngineLoop {
            txn: Arc::clone(&self.txn),
            index: Arc::clone(&index),
            config: self.config.clone(),
            collector,
            reindex: reindex_rx,
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
        };
        let worker = thread::Builder::new()
            .name("search-engine".into())
            .spawn(move || worker.run())?;

        Ok(EngineHandle {
            index,
            stats,
            reindex,
            worker: Some(worker),
            cancel: cancel.clone(),
        })
    }
}

/// Control surface of a running engine.
#[derive(Debug)]
pub struct EngineHandle {
    index: SharedIndex,
    stats: Arc<Mutex<Report>>,
    reindex: Sender<()>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl EngineHandle {
    /// Queue a full reindex on the engine loop. Requests made while one is
    /// already queued are merged into it.
    pub fn reindex(&self) -> Result<()> {
        match self.reindex.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(IndexError::Cancelled),
        }
    }

    /// Totals over every run since start.
    #[must_use]
    pub fn stats(&self) -> Report {
        match self.stats.lock() {
            Ok(stats) => *stats,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn index(&self) -> SharedIndex {
        Arc::clone(&self.index)
    }

    /// Free-text search against the committed index.
    pub fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchPage> {
        index::read(&self.index)?.search(query, limit, offset)
    }

    /// Cancel the engine's scope and wait for the loop to exit.
    pub fn stop(self) {
        self.cancel.cancel();
        self.join();
    }

    /// Wait for the loop to exit after the cancellation token fired.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("search engine thread panicked");
            }
        }
    }
}

struct EngineLoop<M> {
    txn: Arc<M>,
    index: SharedIndex,
    config: EngineConfig,
    collector: Collector,
    reindex: Receiver<()>,
    stats: Arc<Mutex<Report>>,
    cancel: CancellationToken,
}

impl<M: TransactionManager> EngineLoop<M> {
    fn run(self) {
        let ticker = crossbeam_channel::tick(self.config.tick_interval);
        let never = crossbeam_channel::never();
        let mut reindex_open = true;

        tracing::info!(
            interval_ms = self.config.tick_interval.as_millis() as u64,
            "search engine started"
        );

        loop {
            let reindex = if reindex_open { &self.reindex } else { &never };
            select! {
                recv(ticker) -> _ => self.tick(),
                recv(reindex) -> msg => match msg {
                    Ok(()) => self.full_reindex(),
                    Err(_) => reindex_open = false,
                },
                recv(self.cancel.done()) -> _ => break,
            }
        }

        let stats = self.current_stats();
        self.collector.join();
        tracing::info!(%stats, "search engine stopped");
    }

    fn tick(&self) {
        let mut changes = match self.collector.take_batch() {
            Ok(changes) => changes,
            Err(err) => {
                if !self.cancel.is_cancelled() {
                    tracing::warn!(error = %err, "could not take change batch");
                }
                return;
            }
        };
        if changes.is_empty() {
            return;
        }

        let txn = self.txn.as_ref();
        let mut loaders = LoaderSet::new();
        Preprocessor::new(txn, &self.index, self.config.reverse_lookup_batch)
            .expand(&mut changes, &mut loaders);

        let report = BatchIndexer::new(txn, &self.index, self.config.scene_chunk_size)
            .process(&mut changes, &mut loaders);
        tracing::debug!(%report, "incremental update applied");
        self.record(report);
    }

    fn full_reindex(&self) {
        match FullReindexer::new(self.txn.as_ref(), &self.index, &self.config).run(&self.cancel) {
            Ok(report) => self.record(report),
            Err(err) if err.is_cancelled() => tracing::info!("full reindex cancelled"),
            Err(err) => tracing::error!(error = %err, "full reindex failed"),
        }
    }

    fn record(&self, report: Report) {
        match self.stats.lock() {
            Ok(mut stats) => *stats += report,
            Err(poisoned) => *poisoned.into_inner() += report,
        }
    }

    fn current_stats(&self) -> Report {
        match self.stats.lock() {
            Ok(stats) => *stats,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
