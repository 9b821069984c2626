//! Persistence boundary. `Store` is what the crawler, the index builder and
//! the search client need from a transactional store; `MemoryStore` is the
//! bundled implementation, optionally snapshotted to an index directory.

use crate::persist::{load_snapshot, save_snapshot, IndexPaths, Snapshot};
use crate::{IndexId, Page, PageId, Posting, Site, SiteId, Word, WordId};
use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// One change inside a write batch.
#[derive(Debug, Clone)]
pub enum Record {
    Page(Page),
    Word(Word),
    Posting(Posting),
    DeleteWord(WordId),
    DeletePosting(IndexId),
}

pub trait Store: Send + Sync {
    fn next_id(&self) -> u64;

    /// Applies the whole batch or nothing.
    fn write(&self, batch: Vec<Record>) -> Result<()>;

    /// Makes previous writes durable, where the store supports it.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn upsert_site(&self, site: &Site) -> Result<()>;
    fn sites(&self) -> Result<Vec<Site>>;
    fn find_site(&self, url: &str) -> Result<Option<Site>>;
    /// Removes every page, word and posting of the site. The site row stays.
    fn delete_site_content(&self, site: SiteId) -> Result<()>;

    fn page(&self, id: PageId) -> Result<Option<Page>>;
    fn find_page(&self, site: SiteId, path: &str) -> Result<Option<Page>>;
    fn pages(&self, site: SiteId) -> Result<Vec<Page>>;
    /// Ids of the site's pages, without loading their content.
    fn page_ids(&self, site: SiteId) -> Result<Vec<PageId>>;

    fn word(&self, id: WordId) -> Result<Option<Word>>;
    fn find_word(&self, site: SiteId, name: &str) -> Result<Option<Word>>;

    fn postings_for_page(&self, page: PageId) -> Result<Vec<Posting>>;
    fn posting_rank(&self, page: PageId, word: WordId) -> Result<Option<f32>>;
    /// Ids of the site's pages holding a posting for the lemma `name`.
    fn pages_with_lemma(&self, site: SiteId, name: &str) -> Result<HashSet<PageId>>;

    fn count_pages(&self, site: Option<SiteId>) -> Result<u64>;
    fn count_words(&self, site: Option<SiteId>) -> Result<u64>;
}

enum Undo {
    Page(PageId, Option<Page>),
    Word(WordId, Option<Word>),
    Posting(IndexId, Option<Posting>),
}

#[derive(Default)]
struct Tables {
    sites: HashMap<SiteId, Site>,
    pages: HashMap<PageId, Page>,
    words: HashMap<WordId, Word>,
    postings: HashMap<IndexId, Posting>,
    page_keys: HashMap<(SiteId, String), PageId>,
    word_keys: HashMap<(SiteId, String), WordId>,
    posting_keys: HashMap<(WordId, PageId), IndexId>,
    by_page: HashMap<PageId, HashSet<IndexId>>,
    by_word: HashMap<WordId, HashSet<IndexId>>,
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut tables = Tables::default();
        for site in snapshot.sites {
            tables.sites.insert(site.id, site);
        }
        for page in snapshot.pages {
            tables.insert_page(page);
        }
        for word in snapshot.words {
            tables.insert_word(word);
        }
        for posting in snapshot.postings {
            tables.insert_posting(posting);
        }
        tables
    }

    fn snapshot(&self, next_id: u64) -> Snapshot {
        Snapshot {
            sites: self.sites.values().cloned().collect(),
            pages: self.pages.values().cloned().collect(),
            words: self.words.values().cloned().collect(),
            postings: self.postings.values().cloned().collect(),
            next_id,
        }
    }

    fn insert_page(&mut self, page: Page) {
        self.page_keys.insert((page.site_id, page.path.clone()), page.id);
        self.pages.insert(page.id, page);
    }

    fn remove_page(&mut self, id: PageId) -> Option<Page> {
        let page = self.pages.remove(&id)?;
        self.page_keys.remove(&(page.site_id, page.path.clone()));
        Some(page)
    }

    fn insert_word(&mut self, word: Word) {
        self.word_keys.insert((word.site_id, word.name.clone()), word.id);
        self.words.insert(word.id, word);
    }

    fn remove_word(&mut self, id: WordId) -> Option<Word> {
        let word = self.words.remove(&id)?;
        self.word_keys.remove(&(word.site_id, word.name.clone()));
        Some(word)
    }

    fn insert_posting(&mut self, posting: Posting) {
        self.posting_keys.insert((posting.word_id, posting.page_id), posting.id);
        self.by_page.entry(posting.page_id).or_default().insert(posting.id);
        self.by_word.entry(posting.word_id).or_default().insert(posting.id);
        self.postings.insert(posting.id, posting);
    }

    fn remove_posting(&mut self, id: IndexId) -> Option<Posting> {
        let posting = self.postings.remove(&id)?;
        self.posting_keys.remove(&(posting.word_id, posting.page_id));
        if let Some(ids) = self.by_page.get_mut(&posting.page_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_page.remove(&posting.page_id);
            }
        }
        if let Some(ids) = self.by_word.get_mut(&posting.word_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_word.remove(&posting.word_id);
            }
        }
        Some(posting)
    }

    fn apply(&mut self, record: Record, undo: &mut Vec<Undo>) -> Result<()> {
        match record {
            Record::Page(page) => {
                if let Some(&owner) = self.page_keys.get(&(page.site_id, page.path.clone())) {
                    if owner != page.id {
                        bail!("page {} of site {} is already stored as #{}", page.path, page.site_id, owner);
                    }
                }
                let id = page.id;
                let previous = self.remove_page(id);
                self.insert_page(page);
                undo.push(Undo::Page(id, previous));
            }
            Record::Word(word) => {
                if let Some(&owner) = self.word_keys.get(&(word.site_id, word.name.clone())) {
                    if owner != word.id {
                        bail!("lemma {} of site {} is already stored as #{}", word.name, word.site_id, owner);
                    }
                }
                let id = word.id;
                let previous = self.remove_word(id);
                self.insert_word(word);
                undo.push(Undo::Word(id, previous));
            }
            Record::Posting(posting) => {
                if !self.pages.contains_key(&posting.page_id) {
                    bail!("posting #{} refers to missing page #{}", posting.id, posting.page_id);
                }
                if !self.words.contains_key(&posting.word_id) {
                    bail!("posting #{} refers to missing lemma #{}", posting.id, posting.word_id);
                }
                if let Some(&owner) = self.posting_keys.get(&(posting.word_id, posting.page_id)) {
                    if owner != posting.id {
                        bail!(
                            "lemma #{} already has posting #{} on page #{}",
                            posting.word_id,
                            owner,
                            posting.page_id
                        );
                    }
                }
                let id = posting.id;
                let previous = self.remove_posting(id);
                self.insert_posting(posting);
                undo.push(Undo::Posting(id, previous));
            }
            Record::DeleteWord(id) => {
                let previous = self.remove_word(id);
                undo.push(Undo::Word(id, previous));
            }
            Record::DeletePosting(id) => {
                let previous = self.remove_posting(id);
                undo.push(Undo::Posting(id, previous));
            }
        }
        Ok(())
    }

    fn revert(&mut self, step: Undo) {
        match step {
            Undo::Page(id, previous) => {
                self.remove_page(id);
                if let Some(page) = previous {
                    self.insert_page(page);
                }
            }
            Undo::Word(id, previous) => {
                self.remove_word(id);
                if let Some(word) = previous {
                    self.insert_word(word);
                }
            }
            Undo::Posting(id, previous) => {
                self.remove_posting(id);
                if let Some(posting) = previous {
                    self.insert_posting(posting);
                }
            }
        }
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    paths: Option<IndexPaths>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::default()), next_id: AtomicU64::new(1), paths: None }
    }

    /// Store backed by a snapshot in `dir`, loaded now if one exists and
    /// rewritten on every [`Store::flush`].
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let (tables, next_id) = match load_snapshot(&paths)? {
            Some(snapshot) => {
                let next_id = snapshot.next_id.max(1);
                tracing::info!(
                    root = %paths.root.display(),
                    sites = snapshot.sites.len(),
                    pages = snapshot.pages.len(),
                    lemmas = snapshot.words.len(),
                    "snapshot loaded"
                );
                (Tables::from_snapshot(snapshot), next_id)
            }
            None => (Tables::default(), 1),
        };
        Ok(Self { tables: RwLock::new(tables), next_id: AtomicU64::new(next_id), paths: Some(paths) })
    }
}

impl Store for MemoryStore {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn write(&self, batch: Vec<Record>) -> Result<()> {
        let mut tables = self.tables.write();
        let mut undo = Vec::with_capacity(batch.len());
        for record in batch {
            if let Err(err) = tables.apply(record, &mut undo) {
                for step in undo.into_iter().rev() {
                    tables.revert(step);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let Some(paths) = &self.paths else { return Ok(()) };
        let snapshot = self.tables.read().snapshot(self.next_id.load(Ordering::Relaxed));
        save_snapshot(paths, &snapshot)?;
        tracing::debug!(root = %paths.root.display(), "snapshot saved");
        Ok(())
    }

    fn upsert_site(&self, site: &Site) -> Result<()> {
        self.tables.write().sites.insert(site.id, site.clone());
        Ok(())
    }

    fn sites(&self) -> Result<Vec<Site>> {
        let mut sites: Vec<Site> = self.tables.read().sites.values().cloned().collect();
        sites.sort_by_key(|s| s.id);
        Ok(sites)
    }

    fn find_site(&self, url: &str) -> Result<Option<Site>> {
        Ok(self.tables.read().sites.values().find(|s| s.url == url).cloned())
    }

    fn delete_site_content(&self, site: SiteId) -> Result<()> {
        let mut tables = self.tables.write();
        let pages: Vec<PageId> = tables.pages.values().filter(|p| p.site_id == site).map(|p| p.id).collect();
        let words: Vec<WordId> = tables.words.values().filter(|w| w.site_id == site).map(|w| w.id).collect();
        let mut postings: HashSet<IndexId> = HashSet::new();
        for page in &pages {
            postings.extend(tables.by_page.get(page).into_iter().flatten().copied());
        }
        for word in &words {
            postings.extend(tables.by_word.get(word).into_iter().flatten().copied());
        }
        for id in postings {
            tables.remove_posting(id);
        }
        for id in pages {
            tables.remove_page(id);
        }
        for id in words {
            tables.remove_word(id);
        }
        Ok(())
    }

    fn page(&self, id: PageId) -> Result<Option<Page>> {
        Ok(self.tables.read().pages.get(&id).cloned())
    }

    fn find_page(&self, site: SiteId, path: &str) -> Result<Option<Page>> {
        let tables = self.tables.read();
        Ok(tables.page_keys.get(&(site, path.to_string())).and_then(|id| tables.pages.get(id)).cloned())
    }

    fn pages(&self, site: SiteId) -> Result<Vec<Page>> {
        let mut pages: Vec<Page> = self.tables.read().pages.values().filter(|p| p.site_id == site).cloned().collect();
        pages.sort_by_key(|p| p.id);
        Ok(pages)
    }

    fn page_ids(&self, site: SiteId) -> Result<Vec<PageId>> {
        let tables = self.tables.read();
        let mut ids: Vec<PageId> =
            tables.page_keys.iter().filter(|((owner, _), _)| *owner == site).map(|(_, &id)| id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn word(&self, id: WordId) -> Result<Option<Word>> {
        Ok(self.tables.read().words.get(&id).cloned())
    }

    fn find_word(&self, site: SiteId, name: &str) -> Result<Option<Word>> {
        let tables = self.tables.read();
        Ok(tables.word_keys.get(&(site, name.to_string())).and_then(|id| tables.words.get(id)).cloned())
    }

    fn postings_for_page(&self, page: PageId) -> Result<Vec<Posting>> {
        let tables = self.tables.read();
        let mut postings: Vec<Posting> = tables
            .by_page
            .get(&page)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.postings.get(id))
            .cloned()
            .collect();
        postings.sort_by_key(|p| p.id);
        Ok(postings)
    }

    fn posting_rank(&self, page: PageId, word: WordId) -> Result<Option<f32>> {
        let tables = self.tables.read();
        Ok(tables.posting_keys.get(&(word, page)).and_then(|id| tables.postings.get(id)).map(|p| p.rank))
    }

    fn pages_with_lemma(&self, site: SiteId, name: &str) -> Result<HashSet<PageId>> {
        let tables = self.tables.read();
        let Some(word) = tables.word_keys.get(&(site, name.to_string())) else {
            return Ok(HashSet::new());
        };
        Ok(tables
            .by_word
            .get(word)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.postings.get(id))
            .map(|p| p.page_id)
            .collect())
    }

    fn count_pages(&self, site: Option<SiteId>) -> Result<u64> {
        let tables = self.tables.read();
        Ok(match site {
            Some(site) => tables.pages.values().filter(|p| p.site_id == site).count() as u64,
            None => tables.pages.len() as u64,
        })
    }

    fn count_words(&self, site: Option<SiteId>) -> Result<u64> {
        let tables = self.tables.read();
        Ok(match site {
            Some(site) => tables.words.values().filter(|w| w.site_id == site).count() as u64,
            None => tables.words.len() as u64,
        })
    }
}
