//! Orchestrates full index builds and single-page reindexing.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use search_core::config::{Config, SiteConfig};
use search_core::error::{self, Rejection};
use search_core::fields::FieldExtractor;
use search_core::store::{Record, Store};
use search_core::tokenizer::LemmaExtractor;
use search_core::{Page, Site, SiteStatus};
use search_crawler::{reindex_records, Crawler, Fetcher, LemmaCache, LinkManager, Pipeline};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

const STOPPED_BY_USER: &str = "Indexing stopped by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    BuildingIndex,
    Stopping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStatistics {
    pub sites: u64,
    pub pages: u64,
    pub lemmas: u64,
    pub is_indexing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatistics {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: String,
    pub error: Option<String>,
    pub pages: u64,
    pub lemmas: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<SiteStatistics>,
}

struct Inner {
    config: Config,
    store: Arc<dyn Store>,
    extractor: Arc<LemmaExtractor>,
    fields: Arc<FieldExtractor>,
    fetcher: Arc<Fetcher>,
    state: watch::Sender<LaunchState>,
    /// Token of the current or last build. Locked across every state change.
    cancel: Mutex<CancellationToken>,
}

/// Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct IndexBuilder {
    inner: Arc<Inner>,
}

impl IndexBuilder {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let extractor = Arc::new(LemmaExtractor::from_config(&config)?);
        Self::with_extractor(config, store, extractor)
    }

    pub fn with_extractor(config: Config, store: Arc<dyn Store>, extractor: Arc<LemmaExtractor>) -> Result<Self> {
        config.validate()?;
        let fields = Arc::new(FieldExtractor::new(&config.fields, extractor.clone())?);
        let fetcher = Arc::new(Fetcher::new(&config.crawler)?);
        let (state, _) = watch::channel(LaunchState::Idle);
        let inner = Inner {
            config,
            store,
            extractor,
            fields,
            fetcher,
            state,
            cancel: Mutex::new(CancellationToken::new()),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn extractor(&self) -> &Arc<LemmaExtractor> {
        &self.inner.extractor
    }

    pub fn state(&self) -> LaunchState {
        *self.inner.state.borrow()
    }

    pub fn is_indexing(&self) -> bool {
        self.state() != LaunchState::Idle
    }

    /// Starts a full rebuild of every configured site in the background.
    pub fn start(&self) -> Result<(), Rejection> {
        let mut current = self.inner.cancel.lock();
        let mut rejection = None;
        self.inner.state.send_if_modified(|state| match state {
            LaunchState::Idle => {
                *state = LaunchState::BuildingIndex;
                true
            }
            LaunchState::BuildingIndex => {
                rejection = Some(Rejection::AlreadyRunning);
                false
            }
            LaunchState::Stopping => {
                rejection = Some(Rejection::StillStopping);
                false
            }
        });
        if let Some(rejection) = rejection {
            return Err(rejection);
        }
        *current = CancellationToken::new();
        let cancel = current.clone();
        drop(current);

        tracing::info!(sites = self.inner.config.sites.len(), "index build started");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.clone().build(cancel).await;
            inner.state.send_replace(LaunchState::Idle);
            tracing::info!("index build finished");
        });
        Ok(())
    }

    /// Asks the running build to stop. Returns without waiting for it; see
    /// [`IndexBuilder::wait_idle`].
    pub fn stop(&self) -> Result<(), Rejection> {
        let current = self.inner.cancel.lock();
        let mut rejection = None;
        self.inner.state.send_if_modified(|state| match state {
            LaunchState::BuildingIndex => {
                *state = LaunchState::Stopping;
                true
            }
            LaunchState::Idle => {
                rejection = Some(Rejection::NotRunning);
                false
            }
            LaunchState::Stopping => {
                rejection = Some(Rejection::AlreadyStopping);
                false
            }
        });
        if let Some(rejection) = rejection {
            return Err(rejection);
        }
        current.cancel();
        tracing::info!("index build stopping");
        Ok(())
    }

    pub async fn wait_idle(&self) {
        let mut state = self.inner.state.subscribe();
        // the sender lives in `inner`, which `self` keeps alive
        let _ = state.wait_for(|s| *s == LaunchState::Idle).await;
    }

    /// Fetches one page of a configured site again and replaces its lemmas.
    /// Not excluded against a running build of the same site.
    pub async fn index_page(&self, url: &str) -> error::Result<()> {
        let parsed = Url::parse(url).map_err(|_| Rejection::PageOutOfScope)?;
        let config = self
            .inner
            .config
            .sites
            .iter()
            .find(|site| LinkManager::new(&site.url).map_or(false, |links| links.in_scope(url)))
            .ok_or(Rejection::PageOutOfScope)?;
        let store = &self.inner.store;
        let site = self.inner.ensure_site(config)?;

        let Some(fetched) = self.inner.fetcher.fetch(&parsed).await? else {
            tracing::info!(url, "page is not html, nothing to index");
            return Ok(());
        };
        let id = match store.find_page(site.id, &fetched.path)? {
            Some(existing) => existing.id,
            None => store.next_id(),
        };
        let page = Page { id, site_id: site.id, path: fetched.path, code: fetched.code, content: fetched.content };
        let scores = if page.is_indexable() {
            let fields = self.inner.fields.clone();
            let content = page.content.clone();
            tokio::task::spawn_blocking(move || fields.extract(&content)).await.context("extracting lemmas")?
        } else {
            HashMap::new()
        };

        let mut batch = vec![Record::Page(page.clone())];
        batch.extend(reindex_records(store.as_ref(), &page, &scores)?);
        store.write(batch).with_context(|| format!("reindexing {url}"))?;
        store.flush()?;
        tracing::info!(url, code = page.code, lemmas = scores.len(), "page reindexed");
        Ok(())
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let store = &self.inner.store;
        let sites = store.sites()?;
        let mut detailed = Vec::with_capacity(sites.len());
        for site in &sites {
            detailed.push(SiteStatistics {
                url: site.url.clone(),
                name: site.name.clone(),
                status: site.status,
                status_time: site.status_time.format(&Rfc3339).unwrap_or_default(),
                error: site.last_error.clone(),
                pages: store.count_pages(Some(site.id))?,
                lemmas: store.count_words(Some(site.id))?,
            });
        }
        let total = TotalStatistics {
            sites: sites.len() as u64,
            pages: store.count_pages(None)?,
            lemmas: store.count_words(None)?,
            is_indexing: self.is_indexing(),
        };
        Ok(Statistics { total, detailed })
    }
}

impl Inner {
    async fn build(self: Arc<Self>, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.crawler.max_parallel_sites));
        let mut runs = JoinSet::new();
        for config in self.config.sites.clone() {
            let inner = self.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            runs.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else { return };
                inner.index_site(&config, cancel).await;
            });
        }
        while let Some(joined) = runs.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "site task failed");
            }
        }
        if let Err(err) = self.store.flush() {
            tracing::error!(error = %err, "failed to flush the store");
        }
    }

    /// Stored row of a configured site, created when missing.
    fn ensure_site(&self, config: &SiteConfig) -> Result<Site> {
        if let Some(site) = self.store.find_site(&config.url)? {
            return Ok(site);
        }
        let mut site = Site::new(self.store.next_id(), config.url.clone(), config.name.clone());
        site.mark(SiteStatus::Indexed);
        self.store.upsert_site(&site)?;
        Ok(site)
    }

    async fn index_site(&self, config: &SiteConfig, cancel: CancellationToken) {
        let mut site = match self.store.find_site(&config.url) {
            Ok(Some(mut site)) => {
                site.name = config.name.clone();
                site.mark(SiteStatus::Indexing);
                site
            }
            Ok(None) => Site::new(self.store.next_id(), config.url.clone(), config.name.clone()),
            Err(err) => {
                tracing::error!(site = %config.url, error = %err, "cannot read site");
                return;
            }
        };
        if let Err(err) = self.store.upsert_site(&site) {
            tracing::error!(site = %config.url, error = %err, "cannot update site status");
            return;
        }

        match self.crawl_site(&site, &cancel).await {
            Ok(()) if cancel.is_cancelled() => site.fail(STOPPED_BY_USER),
            Ok(()) => site.mark(SiteStatus::Indexed),
            Err(err) => {
                tracing::error!(site = %site.url, error = %err, "site indexing failed");
                site.fail(err.root_cause().to_string());
            }
        }
        tracing::info!(site = %site.url, status = %site.status, "site finished");
        if let Err(err) = self.store.upsert_site(&site) {
            tracing::error!(site = %site.url, error = %err, "cannot update site status");
        }
    }

    async fn crawl_site(&self, site: &Site, cancel: &CancellationToken) -> Result<()> {
        let lemmas = Arc::new(LemmaCache::new(site.id));
        let pipeline = Pipeline::new(self.store.clone(), self.fields.clone(), lemmas, cancel.child_token())?;
        let crawler =
            Crawler::new(site.clone(), self.store.clone(), self.fetcher.clone(), pipeline.clone(), cancel.child_token())?;
        let crawled = crawler.run().await;
        let closed = pipeline.close().await;
        crawled?;
        closed
    }
}
