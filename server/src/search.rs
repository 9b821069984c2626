//! Query path: lemmas of the query, candidate pages holding all of them,
//! relevance and snippets.

use anyhow::Result;
use rayon::prelude::*;
use search_core::config::SearchConfig;
use search_core::error::{self, Rejection};
use search_core::fields::{page_title, plain_text};
use search_core::lexeme::Lexeme;
use search_core::store::Store;
use search_core::tokenizer::{word_in, LemmaExtractor};
use search_core::{MatchedPage, Page, PageId, Site, SiteStatus, Word};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Restricts the search to the site with this url.
    pub site: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    /// Matches before pagination.
    pub count: usize,
    pub data: Vec<MatchedPage>,
}

pub struct SearchClient {
    store: Arc<dyn Store>,
    extractor: Arc<LemmaExtractor>,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(store: Arc<dyn Store>, extractor: Arc<LemmaExtractor>, config: SearchConfig) -> Self {
        Self { store, extractor, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn search(&self, request: &SearchRequest) -> error::Result<SearchResults> {
        if request.query.trim().is_empty() {
            return Err(Rejection::EmptyQuery.into());
        }
        let mut sites = self.store.sites()?;
        if let Some(url) = &request.site {
            sites.retain(|site| &site.url == url);
            if sites.is_empty() {
                return Err(Rejection::UnknownSite.into());
            }
        }
        if sites.iter().any(|site| site.status != SiteStatus::Indexed) {
            return Err(Rejection::NotIndexed.into());
        }

        let lemmas: Vec<String> = self.extractor.stats(&request.query).into_iter().map(|(lemma, _)| lemma).collect();
        let mut results = Vec::new();
        for site in &sites {
            results.extend(self.search_site(site, &lemmas)?);
        }

        let max = results.iter().map(|r| r.relevance).fold(0.0f32, f32::max);
        if max > 0.0 {
            for result in &mut results {
                result.relevance /= max;
            }
        }
        results.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));

        let count = results.len();
        let data = results.into_iter().skip(request.offset).take(request.limit).collect();
        tracing::debug!(query = %request.query, count, "search finished");
        Ok(SearchResults { count, data })
    }

    /// Matches of one site with their absolute relevance.
    fn search_site(&self, site: &Site, lemmas: &[String]) -> Result<Vec<MatchedPage>> {
        let words = match self.query_words(site, lemmas)? {
            Some(words) if !words.is_empty() => words,
            _ => return Ok(Vec::new()),
        };

        let mut candidates: HashSet<PageId> = self.store.page_ids(site.id)?.into_iter().collect();
        for word in &words {
            let holding = self.store.pages_with_lemma(site.id, &word.name)?;
            candidates.retain(|id| holding.contains(id));
            if candidates.is_empty() {
                return Ok(Vec::new());
            }
        }
        let mut ids: Vec<PageId> = candidates.into_iter().collect();
        ids.sort_unstable();
        let mut pages = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(page) = self.store.page(id)? {
                pages.push(page);
            }
        }

        pages.par_iter().map(|page| self.matched_page(site, page, &words)).collect()
    }

    /// Stored words of the query, rarest first, without over-common ones.
    /// `None` when a lemma is unknown to the site.
    fn query_words(&self, site: &Site, lemmas: &[String]) -> Result<Option<Vec<Word>>> {
        let pages = self.store.count_pages(Some(site.id))?;
        let mut words = Vec::with_capacity(lemmas.len());
        for lemma in lemmas {
            let Some(word) = self.store.find_word(site.id, lemma)? else {
                return Ok(None);
            };
            let percent = word.frequency as f32 / pages.max(1) as f32 * 100.0;
            if pages < self.config.small_site_pages || percent < self.config.common_term_percent {
                words.push(word);
            } else {
                tracing::debug!(site = %site.url, lemma = %word.name, percent, "too common, ignored");
            }
        }
        words.sort_by_key(|w| w.frequency);
        Ok(Some(words))
    }

    fn matched_page(&self, site: &Site, page: &Page, words: &[Word]) -> Result<MatchedPage> {
        let mut relevance = 0.0;
        for word in words {
            relevance += self.store.posting_rank(page.id, word.id)?.unwrap_or(0.0);
        }
        let text = plain_text(&page.content).to_lowercase();
        Ok(MatchedPage {
            site: site.url.clone(),
            site_name: site.name.clone(),
            uri: page.path.clone(),
            title: page_title(&page.content),
            snippet: self.snippet(&text, words, &page.path),
            relevance,
        })
    }

    fn snippet(&self, text: &str, words: &[Word], path: &str) -> String {
        let mut seen: Vec<&str> = Vec::new();
        let mut fragments: Vec<String> = Vec::new();
        for word in words {
            let Some((start, end)) = self.locate(text, &word.name) else {
                tracing::warn!(path, lemma = %word.name, "lemma not found in page text, fragment skipped");
                continue;
            };
            let matched = &text[start..end];
            if seen.iter().any(|fragment| fragment.contains(matched)) {
                continue;
            }
            let (from, to) = window(text, start, end, self.config.snippet_radius);
            seen.push(&text[from..to]);
            fragments.push(format!("{}<b>{}</b>{}", &text[from..start], matched, &text[end..to]));
        }
        if fragments.is_empty() {
            String::new()
        } else {
            format!("...{}...", fragments.join("..."))
        }
    }

    /// Byte span of the word standing for `lemma` in `text`: the first word
    /// containing the lemma verbatim, else the first word normalizing to it.
    fn locate(&self, text: &str, lemma: &str) -> Option<(usize, usize)> {
        if let Some(at) = text.find(lemma) {
            return Some(enclosing_word(text, at, at + lemma.len()));
        }
        let target = Lexeme::parse(lemma);
        let mut offset = 0;
        for token in text.split(' ') {
            if let Some(word) = word_in(token) {
                let found = self.extractor.normalize(word.as_str()).map_or(false, |lexeme| lexeme.matches(&target));
                if found {
                    return Some((offset + word.start(), offset + word.end()));
                }
            }
            offset += token.len() + 1;
        }
        None
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphabetic() || c == '-'
}

/// Grows `start..end` to the whole word around it.
fn enclosing_word(text: &str, start: usize, end: usize) -> (usize, usize) {
    let from = text[..start]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map_or(start, |(i, _)| i);
    let to = text[end..].char_indices().find(|(_, c)| !is_word_char(*c)).map_or(text.len(), |(i, _)| end + i);
    (from, to)
}

/// `start..end` widened by `radius` characters on each side.
fn window(text: &str, start: usize, end: usize, radius: usize) -> (usize, usize) {
    let from = text[..start].char_indices().rev().take(radius).last().map_or(start, |(i, _)| i);
    let to = text[end..].char_indices().nth(radius).map_or(text.len(), |(i, _)| end + i);
    (from, to)
}
