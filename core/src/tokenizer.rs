use crate::config::Config;
use crate::lexeme::Lexeme;
use crate::morphology::{Language, Lexicon, Morphology, StemmerMorphology};
use anyhow::Result;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[a-zA-Zа-яА-ЯёЁ]+-?[a-zA-Zа-яА-ЯёЁ]+").expect("valid regex");
}

/// First word-pattern match inside `token`, if any.
pub fn word_in(token: &str) -> Option<regex::Match<'_>> {
    WORD_RE.find(token)
}

/// Turns text into lemma frequencies using one dictionary per language.
pub struct LemmaExtractor {
    languages: Vec<Arc<dyn Morphology>>,
}

impl Default for LemmaExtractor {
    fn default() -> Self {
        Self::new(
            Language::ALL
                .iter()
                .map(|&l| Arc::new(StemmerMorphology::new(l)) as Arc<dyn Morphology>)
                .collect(),
        )
    }
}

impl LemmaExtractor {
    /// Languages are tried in the given order when detecting a word's language.
    pub fn new(languages: Vec<Arc<dyn Morphology>>) -> Self {
        Self { languages }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut languages: Vec<Arc<dyn Morphology>> = Vec::with_capacity(Language::ALL.len());
        for language in Language::ALL {
            let morphology: Arc<dyn Morphology> = match config.lexicons.get(&language) {
                Some(path) => Arc::new(Lexicon::load(language, path)?.with_fallback(StemmerMorphology::new(language))),
                None => Arc::new(StemmerMorphology::new(language)),
            };
            languages.push(morphology);
        }
        Ok(Self::new(languages))
    }

    fn known(&self, word: &str) -> bool {
        self.languages.iter().any(|m| m.check(word))
    }

    fn morphology_for(&self, word: &str) -> Option<&dyn Morphology> {
        self.languages.iter().find(|m| m.check(word)).map(|m| m.as_ref())
    }

    /// Lowercased words of `text`. A hyphenated word unknown to every
    /// dictionary is split into its parts.
    pub fn select_words(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>();
        let mut words = Vec::new();
        for mat in WORD_RE.find_iter(&normalized) {
            let word = mat.as_str().to_lowercase();
            if word.contains('-') && !self.known(&word) {
                words.extend(word.split('-').filter(|p| !p.is_empty()).map(str::to_string));
            } else {
                words.push(word);
            }
        }
        words
    }

    /// Dictionary form of a single lowercase word, `None` for unknown and
    /// function words.
    pub fn normalize(&self, word: &str) -> Option<Lexeme> {
        let morphology = self.morphology_for(word)?;
        Lexeme::normalize(word, morphology)
    }

    /// Lemma frequencies of `text`, most frequent first. Entries whose
    /// lexemes match are merged under the more specific name.
    pub fn stats(&self, text: &str) -> Vec<(String, u32)> {
        let words = self.select_words(text);
        let lexemes: Vec<Lexeme> = words.par_iter().filter_map(|w| self.normalize(w)).collect();

        let mut counts: Vec<(Lexeme, u32)> = Vec::new();
        for lexeme in lexemes {
            merge(&mut counts, lexeme);
        }

        let mut stats: Vec<(String, u32)> = counts.into_iter().map(|(l, c)| (l.name(), c)).collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1));
        stats
    }
}

fn merge(counts: &mut Vec<(Lexeme, u32)>, lexeme: Lexeme) {
    match counts.iter_mut().find(|(key, _)| key.matches(&lexeme)) {
        Some((key, count)) => {
            *count += 1;
            if lexeme.name().len() > key.name().len() {
                *key = lexeme;
            }
        }
        None => counts.push((lexeme, 1)),
    }
}
