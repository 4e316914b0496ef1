//! One fetch → build → compare → persist → notify cycle.

use crate::builder::{ColumnMapping, MalformedSource, build, ensure_min_regions};
use crate::config::Config;
use crate::diff::{diff, needs_notification, removed_regions};
use crate::notify::{
    MESSAGE_LIMIT, Notifier, NotifyError, TelegramNotifier, render_fault, render_pages,
    render_report,
};
use crate::source::{Fetch, ScraperError, TableLayout, WebScraper, parse_rows};
use crate::store::{SnapshotStore, StoreError};
use crate::types::Snapshot;

/// A failure that ends the cycle and is reported on the fault channel.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Failed to fetch source: {0}")]
    Fetch(#[from] ScraperError),
    #[error("Malformed source: {0}")]
    Malformed(#[from] MalformedSource),
    #[error("Snapshot store failure: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error(transparent)]
    Notifier(#[from] NotifyError),
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// No previous snapshot existed; the new one was stored without a report.
    FirstRun,
    /// Fetched data matched the stored snapshot exactly.
    Unchanged,
    /// The snapshot changed and a report was sent.
    Notified { changed_regions: usize },
    Faulted(CycleError),
}

pub struct Orchestrator<F, N> {
    fetcher: F,
    notifier: N,
    store: SnapshotStore,
    layout: TableLayout,
    mapping: ColumnMapping,
    min_regions: usize,
}

impl Orchestrator<WebScraper, TelegramNotifier> {
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        let fetcher = WebScraper::new(config.source.url.clone(), config.source.timeout)?;
        let notifier = TelegramNotifier::new(&config.telegram)?;

        let mut store = SnapshotStore::new(&config.store_path);
        if let Some(dir) = &config.archive_dir {
            store = store.with_archive_dir(dir);
        }

        Ok(Self::new(
            fetcher,
            notifier,
            store,
            config.source.layout.clone(),
            config.source.mapping.clone(),
            config.min_regions,
        ))
    }
}

impl<F: Fetch, N: Notifier> Orchestrator<F, N> {
    pub fn new(
        fetcher: F,
        notifier: N,
        store: SnapshotStore,
        layout: TableLayout,
        mapping: ColumnMapping,
        min_regions: usize,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            store,
            layout,
            mapping,
            min_regions,
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Runs a full cycle. Failures are reported on the fault channel and returned as
    /// [`CycleOutcome::Faulted`]; the stored snapshot is left untouched in that case.
    pub async fn run(&self) -> CycleOutcome {
        match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Cycle failed: {}", e);
                self.notifier.send(&render_fault(&e), true).await;
                CycleOutcome::Faulted(e)
            }
        }
    }

    /// Renders the report the next cycle would send, without storing or sending anything.
    pub async fn preview(&self) -> Result<String, CycleError> {
        let current = self.fetch_snapshot().await?;
        let previous = self.store.load()?;
        Ok(render_report(&diff(previous.as_ref(), &current)))
    }

    async fn cycle(&self) -> Result<CycleOutcome, CycleError> {
        let current = self.fetch_snapshot().await?;
        let previous = self.store.load()?;

        let annotated = diff(previous.as_ref(), &current);
        for region in removed_regions(previous.as_ref(), &current) {
            log::info!("Region '{}' is no longer listed", region);
        }

        let changed = needs_notification(previous.as_ref(), &current);
        self.store.persist(&current, changed)?;

        if previous.is_none() {
            log::info!("First run, stored baseline without notifying");
            return Ok(CycleOutcome::FirstRun);
        }
        if !changed {
            log::info!("No changes since the last snapshot");
            return Ok(CycleOutcome::Unchanged);
        }

        let changed_regions = annotated.iter().filter(|r| r.changed).count();
        log::info!("{} region(s) changed, sending report", changed_regions);

        for page in render_pages(&annotated, MESSAGE_LIMIT) {
            self.notifier.send(&page, false).await;
        }

        Ok(CycleOutcome::Notified { changed_regions })
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot, CycleError> {
        let text = self.fetcher.fetch().await?;

        let rows = parse_rows(&text, &self.layout).map_err(MalformedSource::Parse)?;
        let snapshot = build(rows, &self.mapping);
        log::info!("Built snapshot with {} region(s)", snapshot.len());

        ensure_min_regions(&snapshot, self.min_regions)?;
        Ok(snapshot)
    }
}
