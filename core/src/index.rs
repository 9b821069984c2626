use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub type SiteId = u64;
pub type PageId = u64;
pub type WordId = u64;
pub type IndexId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Site {
    pub fn new(id: SiteId, url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            name: name.into(),
            status: SiteStatus::Indexing,
            status_time: OffsetDateTime::now_utc(),
            last_error: None,
        }
    }

    /// Moves the site to `status` and clears the last error.
    pub fn mark(&mut self, status: SiteStatus) {
        self.status = status;
        self.status_time = OffsetDateTime::now_utc();
        self.last_error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SiteStatus::Failed;
        self.status_time = OffsetDateTime::now_utc();
        self.last_error = Some(error.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Path relative to the site root, e.g. `/news/1`.
    pub path: String,
    pub code: u16,
    pub content: String,
}

impl Page {
    /// Pages answered with 404 or 500 are stored but never produce lemmas.
    pub fn is_indexable(&self) -> bool {
        !matches!(self.code, 404 | 500)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub id: WordId,
    pub site_id: SiteId,
    pub name: String,
    /// Number of distinct pages of the site containing the lemma.
    pub frequency: u32,
    /// Weighted score for the page currently being processed. Never persisted.
    #[serde(skip)]
    pub rank: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Posting {
    pub id: IndexId,
    pub word_id: WordId,
    pub page_id: PageId,
    pub rank: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPage {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: Option<String>,
    pub snippet: String,
    pub relevance: f32,
}
