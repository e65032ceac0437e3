//! Paginated rebuild of the whole index from the store.

use std::collections::VecDeque;
use std::mem;
use std::time::{Duration, Instant};

use tracing::instrument;

use crate::cancel::CancellationToken;
use crate::changeset::ChangeSet;
use crate::error::Result;
use crate::index::SharedIndex;
use crate::indexer::BatchIndexer;
use crate::loader::LoaderSet;
use crate::repository::{Page, TransactionManager};
use crate::types::{EngineConfig, EntityType, Report};

/// Visits every indexed entity page by page and feeds each page to the indexer.
///
/// No preprocessing happens: every scene is visited anyway, so embedded members
/// are picked up when their scene is rebuilt.
#[derive(Debug)]
pub struct FullReindexer<'a, M> {
    txn: &'a M,
    index: &'a SharedIndex,
    config: &'a EngineConfig,
}

impl<'a, M: TransactionManager> FullReindexer<'a, M> {
    #[must_use]
    pub fn new(txn: &'a M, index: &'a SharedIndex, config: &'a EngineConfig) -> Self {
        Self { txn, index, config }
    }

    /// Rebuild everything, Tag, Performer, Studio, then Scene.
    ///
    /// A page shorter than the page size exhausts its type. Store failures and
    /// cancellation abort the run; pages committed before that stay in the index.
    /// Progress lines count the work done since the previous line; the final
    /// line and the returned report cover the whole run.
    #[instrument(target = "media_index::reindex", skip_all)]
    pub fn run(&self, cancel: &CancellationToken) -> Result<Report> {
        let page_size = self.config.reindex_page_size.max(1);
        let indexer = BatchIndexer::new(self.txn, self.index, self.config.scene_chunk_size);
        let mut loaders = LoaderSet::new();
        let mut worklist: VecDeque<EntityType> = EntityType::INDEXED.into_iter().collect();
        let mut page = 0;
        let mut pages = 0usize;
        let mut report = Report::default();
        let mut progress = Progress::new(self.config.progress_interval);

        tracing::info!(page_size, "full reindex started");

        while let Some(&ty) = worklist.front() {
            cancel.check()?;

            let cursor = Page::new(page, page_size);
            let ids = self.txn.with_read_txn(|repo| repo.query_ids(ty, cursor))?;
            let fetched = ids.len();

            let mut changes = ChangeSet::new();
            for id in ids {
                changes.track_id(ty, id);
            }
            let page_report = indexer.process(&mut changes, &mut loaders);
            report += page_report;
            pages += 1;

            if fetched < page_size {
                tracing::debug!(entity = %ty, pages = page + 1, "entity type exhausted");
                worklist.pop_front();
                page = 0;
            } else {
                loaders.reset();
                page += 1;
            }

            if let Some(recent) = progress.record(page_report) {
                log::info!("reindexing progress: {recent}");
            }
        }

        log::info!("reindexing finished, progress: {report}");
        tracing::info!(pages, "full reindex finished");
        Ok(report)
    }
}

/// Work accumulated since the last progress line.
#[derive(Debug)]
struct Progress {
    interval: Duration,
    last: Instant,
    pending: Report,
}

impl Progress {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
            pending: Report::default(),
        }
    }

    /// Add `report`. Once the interval has elapsed, returns the pending work
    /// and starts a new interval.
    fn record(&mut self, report: Report) -> Option<Report> {
        self.pending += report;
        if self.last.elapsed() < self.interval {
            return None;
        }
        self.last = Instant::now();
        Some(mem::take(&mut self.pending))
    }
}
