use anyhow::Result;
use rand::Rng;
use reqwest::{header, Client};
use search_core::config::CrawlerConfig;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// A fetched HTML document. Error statuses are kept, not turned into errors.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub path: String,
    pub code: u16,
    pub content: String,
}

pub struct Fetcher {
    client: Client,
    min_delay_ms: u64,
    max_delay_ms: u64,
    concurrency: usize,
}

impl Fetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::REFERER, header::HeaderValue::from_str(&config.referrer)?);
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
            concurrency: config.max_concurrent_fetches.max(1),
        })
    }

    /// How many requests one crawl may have in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn pause(&self) {
        let delay = if self.max_delay_ms > self.min_delay_ms {
            rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms)
        } else {
            self.min_delay_ms
        };
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
    }

    /// `Ok(None)` when the response is not an HTML document.
    pub async fn fetch(&self, url: &Url) -> Result<Option<Fetched>> {
        self.pause().await;
        let resp = self.client.get(url.clone()).send().await?;
        let code = resp.status().as_u16();
        let html = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map_or(true, |ct| ct.contains("text/html"));
        if !html {
            tracing::debug!(%url, "skipping non-html response");
            return Ok(None);
        }
        let bytes = resp.bytes().await?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Some(Fetched { path: url.path().to_string(), code, content }))
    }
}
