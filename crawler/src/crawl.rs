use crate::fetch::Fetcher;
use crate::links::LinkManager;
use crate::pipeline::Pipeline;
use anyhow::{Context as _, Result};
use futures::future::{BoxFuture, FutureExt};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use search_core::store::Store;
use search_core::{Page, Site};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("valid selector");
}

struct Context {
    site: Site,
    store: Arc<dyn Store>,
    fetcher: Arc<Fetcher>,
    links: LinkManager,
    pipeline: Pipeline,
    /// Bounds the requests in flight against the site.
    fetches: Semaphore,
    cancel: CancellationToken,
}

impl Context {
    fn halted(&self) -> bool {
        self.cancel.is_cancelled() || self.pipeline.is_failed()
    }
}

/// Full rebuild of one site: every reachable internal page is fetched once
/// and handed to the pipeline.
pub struct Crawler {
    ctx: Arc<Context>,
}

impl Crawler {
    pub fn new(
        site: Site,
        store: Arc<dyn Store>,
        fetcher: Arc<Fetcher>,
        pipeline: Pipeline,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let links = LinkManager::new(&site.url).with_context(|| format!("site {}", site.url))?;
        let fetches = Semaphore::new(fetcher.concurrency());
        Ok(Self { ctx: Arc::new(Context { site, store, fetcher, links, pipeline, fetches, cancel }) })
    }

    /// Drops the site's stored pages and lemmas, then crawls from the root.
    /// Returns once the whole crawl tree has finished.
    pub async fn run(self) -> Result<()> {
        let ctx = self.ctx;
        ctx.store.delete_site_content(ctx.site.id)?;
        let root = Url::parse(&ctx.site.url)?;
        tracing::info!(site = %ctx.site.url, "crawl started");
        visit(ctx.clone(), root).await;
        tracing::info!(
            site = %ctx.site.url,
            cancelled = ctx.cancel.is_cancelled(),
            failed = ctx.pipeline.is_failed(),
            "crawl finished"
        );
        Ok(())
    }
}

fn visit(ctx: Arc<Context>, url: Url) -> BoxFuture<'static, ()> {
    async move {
        if ctx.halted() {
            return;
        }
        let fetched = {
            let permit = tokio::select! {
                _ = ctx.cancel.cancelled() => return,
                permit = ctx.fetches.acquire() => permit,
            };
            let Ok(_permit) = permit else { return };
            if ctx.halted() {
                return;
            }
            match ctx.fetcher.fetch(&url).await {
                Ok(Some(fetched)) => fetched,
                Ok(None) => return,
                Err(err) => {
                    tracing::warn!(%url, error = %err, "fetch failed");
                    return;
                }
            }
        };
        let hrefs = outbound_links(&fetched.content, &url);
        let page = Page {
            id: ctx.store.next_id(),
            site_id: ctx.site.id,
            path: fetched.path,
            code: fetched.code,
            content: fetched.content,
        };
        let pipeline = ctx.pipeline.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || pipeline.run(page)).await {
            tracing::error!(%url, error = %err, "indexing task panicked");
        }

        if ctx.halted() {
            return;
        }
        let mut children = JoinSet::new();
        for next in ctx.links.claim(hrefs) {
            match Url::parse(&next) {
                Ok(next) => {
                    children.spawn(visit(ctx.clone(), next));
                }
                Err(err) => tracing::debug!(url = %next, error = %err, "unparsable link"),
            }
        }
        while let Some(joined) = children.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "crawl task failed");
            }
        }
    }
    .boxed()
}

/// Absolute targets of the page's anchors.
fn outbound_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(String::from)
        .collect()
}
