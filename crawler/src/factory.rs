//! Turns a page's weighted lemma map into Word and Posting rows.

use anyhow::Result;
use parking_lot::Mutex;
use search_core::store::{Record, Store};
use search_core::{Page, Posting, SiteId, Word, WordId};
use std::collections::HashMap;

fn sorted(scores: &HashMap<String, f32>) -> Vec<(&String, f32)> {
    let mut entries: Vec<(&String, f32)> = scores.iter().map(|(name, score)| (name, *score)).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Words of one site build, so a lemma seen on many pages stays one row
/// whose frequency counts those pages.
pub struct LemmaCache {
    site_id: SiteId,
    words: Mutex<HashMap<String, Word>>,
}

impl LemmaCache {
    pub fn new(site_id: SiteId) -> Self {
        Self { site_id, words: Mutex::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.words.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of every lemma of the page, with `rank` set to its
    /// score on that page.
    pub fn resolve(&self, store: &dyn Store, scores: &HashMap<String, f32>) -> Vec<Word> {
        let mut words = self.words.lock();
        sorted(scores)
            .into_iter()
            .map(|(name, score)| {
                let word = words.entry(name.clone()).or_insert_with(|| Word {
                    id: store.next_id(),
                    site_id: self.site_id,
                    name: name.clone(),
                    frequency: 0,
                    rank: 0.0,
                });
                word.frequency += 1;
                word.rank = score;
                word.clone()
            })
            .collect()
    }
}

/// One posting per word, ranked with the word's score on `page`.
pub fn postings_for(store: &dyn Store, page: &Page, words: &[Word]) -> Vec<Posting> {
    words
        .iter()
        .map(|word| Posting { id: store.next_id(), word_id: word.id, page_id: page.id, rank: word.rank })
        .collect()
}

/// Changes that move the stored lemmas of `page` to `scores`. The page row
/// itself is not part of the result. Word frequencies stay equal to the
/// number of pages linked to each word.
pub fn reindex_records(store: &dyn Store, page: &Page, scores: &HashMap<String, f32>) -> Result<Vec<Record>> {
    let mut linked: HashMap<String, (Posting, Word)> = HashMap::new();
    for posting in store.postings_for_page(page.id)? {
        if let Some(word) = store.word(posting.word_id)? {
            linked.insert(word.name.clone(), (posting, word));
        }
    }

    let mut words = Vec::new();
    let mut postings = Vec::new();
    for (name, score) in sorted(scores) {
        let (posting_id, mut word) = match linked.remove(name) {
            Some((posting, word)) => (posting.id, word),
            None => {
                let word = match store.find_word(page.site_id, name)? {
                    Some(mut word) => {
                        word.frequency += 1;
                        word
                    }
                    None => Word { id: store.next_id(), site_id: page.site_id, name: name.clone(), frequency: 1, rank: 0.0 },
                };
                (store.next_id(), word)
            }
        };
        word.rank = score;
        postings.push(Posting { id: posting_id, word_id: word.id, page_id: page.id, rank: score });
        words.push(word);
    }

    let mut records = Vec::with_capacity(words.len() + postings.len() + linked.len() * 2);
    let mut dropped: Vec<(Posting, Word)> = linked.into_values().collect();
    dropped.sort_by_key(|(posting, _)| posting.id);
    let mut emptied: Vec<WordId> = Vec::new();
    for (posting, mut word) in dropped {
        records.push(Record::DeletePosting(posting.id));
        word.frequency = word.frequency.saturating_sub(1);
        if word.frequency == 0 {
            emptied.push(word.id);
        } else {
            records.push(Record::Word(word));
        }
    }
    records.extend(emptied.into_iter().map(Record::DeleteWord));
    records.extend(words.into_iter().map(Record::Word));
    records.extend(postings.into_iter().map(Record::Posting));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_core::store::MemoryStore;

    fn page(id: u64, path: &str) -> Page {
        Page { id, site_id: 1, path: path.into(), code: 200, content: String::new() }
    }

    fn scores(entries: &[(&str, f32)]) -> HashMap<String, f32> {
        entries.iter().map(|(name, score)| (name.to_string(), *score)).collect()
    }

    fn write_page(store: &MemoryStore, page: &Page, entries: &[(&str, f32)]) {
        let mut batch = vec![Record::Page(page.clone())];
        batch.extend(reindex_records(store, page, &scores(entries)).unwrap());
        store.write(batch).unwrap();
    }

    #[test]
    fn cache_counts_pages_per_lemma() {
        let store = MemoryStore::new();
        let cache = LemmaCache::new(1);
        let first = cache.resolve(&store, &scores(&[("rust", 2.0), ("crab", 1.0)]));
        let second = cache.resolve(&store, &scores(&[("rust", 0.8)]));
        let rust = first.iter().find(|w| w.name == "rust").unwrap();
        assert_eq!(rust.frequency, 1);
        assert_eq!(second[0].id, rust.id);
        assert_eq!(second[0].frequency, 2);
        assert_eq!(second[0].rank, 0.8);
        assert_eq!(cache.len(), 2);

        let postings = postings_for(&store, &page(9, "/"), &second);
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].word_id, rust.id);
        assert_eq!(postings[0].rank, 0.8);
    }

    #[test]
    fn reindex_shares_words_between_pages() {
        let store = MemoryStore::new();
        let a = page(100, "/a");
        let b = page(200, "/b");
        write_page(&store, &a, &[("rust", 1.0), ("crab", 1.0)]);
        write_page(&store, &b, &[("rust", 2.0)]);
        assert_eq!(store.find_word(1, "rust").unwrap().unwrap().frequency, 2);
        assert_eq!(store.find_word(1, "crab").unwrap().unwrap().frequency, 1);
    }

    #[test]
    fn reindex_updates_ranks_and_reuses_postings() {
        let store = MemoryStore::new();
        let a = page(100, "/a");
        write_page(&store, &a, &[("rust", 1.0)]);
        let before = store.postings_for_page(a.id).unwrap();
        write_page(&store, &a, &[("rust", 3.0)]);
        let after = store.postings_for_page(a.id).unwrap();
        assert_eq!(before[0].id, after[0].id);
        assert_eq!(after[0].rank, 3.0);
        assert_eq!(store.find_word(1, "rust").unwrap().unwrap().frequency, 1);
    }

    #[test]
    fn reindexing_an_unchanged_page_keeps_its_postings() {
        let store = MemoryStore::new();
        let a = page(100, "/a");
        let entries = [("rust", 1.5), ("crab", 0.8)];
        write_page(&store, &a, &entries);
        let postings = |store: &MemoryStore| {
            let mut postings: Vec<(u64, u64, f32)> =
                store.postings_for_page(a.id).unwrap().into_iter().map(|p| (p.id, p.word_id, p.rank)).collect();
            postings.sort_by_key(|p| p.0);
            postings
        };
        let before = postings(&store);
        write_page(&store, &a, &entries);
        assert_eq!(postings(&store), before);
        assert_eq!(before.len(), 2);
        assert_eq!(store.find_word(1, "rust").unwrap().unwrap().frequency, 1);
        assert_eq!(store.find_word(1, "crab").unwrap().unwrap().frequency, 1);
    }

    #[test]
    fn reindex_releases_vanished_lemmas() {
        let store = MemoryStore::new();
        let a = page(100, "/a");
        let b = page(200, "/b");
        write_page(&store, &a, &[("rust", 1.0), ("crab", 1.0)]);
        write_page(&store, &b, &[("rust", 1.0)]);
        write_page(&store, &a, &[("ferris", 1.0)]);
        assert!(store.find_word(1, "crab").unwrap().is_none());
        assert_eq!(store.find_word(1, "rust").unwrap().unwrap().frequency, 1);
        assert_eq!(store.postings_for_page(a.id).unwrap().len(), 1);
        assert_eq!(store.pages_with_lemma(1, "rust").unwrap().len(), 1);
    }

    #[test]
    fn error_pages_lose_all_lemmas() {
        let store = MemoryStore::new();
        let mut a = page(100, "/a");
        write_page(&store, &a, &[("rust", 1.0)]);
        a.code = 404;
        write_page(&store, &a, &[]);
        assert!(store.postings_for_page(a.id).unwrap().is_empty());
        assert_eq!(store.count_words(Some(1)).unwrap(), 0);
    }
}
