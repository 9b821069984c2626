use crate::morphology::Language;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    pub url: String,
    pub name: String,
}

/// A weighted region of a page, e.g. `title` counts more than `body`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub selector: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub referrer: String,
    /// Lower bound of the random pause taken before every request.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
    /// How many sites are crawled at the same time.
    pub max_parallel_sites: usize,
    /// Requests in flight at once within one site crawl.
    pub max_concurrent_fetches: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "LemmaSearchBot/1.0 (+https://example.com/bot)".into(),
            referrer: "https://www.google.com".into(),
            min_delay_ms: 500,
            max_delay_ms: 5000,
            timeout_secs: 12,
            max_parallel_sites: 4,
            max_concurrent_fetches: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Lemmas found on at least this share of a site's pages are ignored.
    pub common_term_percent: f32,
    /// Sites with fewer pages than this skip the common-term filter.
    pub small_site_pages: u64,
    /// Characters kept on each side of a match in a snippet.
    pub snippet_radius: usize,
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { common_term_percent: 90.0, small_site_pages: 3, snippet_radius: 20, default_limit: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sites: Vec<SiteConfig>,
    #[serde(default = "default_fields")]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Optional word-form dictionaries (`form<TAB>lemma<TAB>pos`) per language.
    #[serde(default)]
    pub lexicons: HashMap<Language, PathBuf>,
    /// Where the store snapshot lives. In-memory only when absent.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,
}

pub fn default_fields() -> Vec<Field> {
    vec![
        Field { name: "title".into(), selector: "title".into(), weight: 1.0 },
        Field { name: "body".into(), selector: "body".into(), weight: 0.8 },
    ]
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_sites(sites: Vec<SiteConfig>) -> Self {
        Self {
            sites,
            fields: default_fields(),
            crawler: CrawlerConfig::default(),
            search: SearchConfig::default(),
            lexicons: HashMap::new(),
            index_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for site in &self.sites {
            if !(site.url.starts_with("http://") || site.url.starts_with("https://")) {
                bail!("site {} has a non-http url {}", site.name, site.url);
            }
        }
        for field in &self.fields {
            if !field.weight.is_finite() || field.weight < 0.0 {
                bail!("field {} has an invalid weight {}", field.name, field.weight);
            }
        }
        if self.crawler.min_delay_ms > self.crawler.max_delay_ms {
            bail!(
                "crawler.min_delay_ms ({}) exceeds crawler.max_delay_ms ({})",
                self.crawler.min_delay_ms,
                self.crawler.max_delay_ms
            );
        }
        if self.crawler.max_parallel_sites == 0 {
            bail!("crawler.max_parallel_sites must be at least 1");
        }
        if self.crawler.max_concurrent_fetches == 0 {
            bail!("crawler.max_concurrent_fetches must be at least 1");
        }
        Ok(())
    }

    pub fn site(&self, url: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.url == url)
    }
}
