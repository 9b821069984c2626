//! Morphological dictionaries: which word forms a language knows, and what
//! their dictionary forms and parts of speech are.

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Russian,
    English,
}

impl Language {
    /// Detection order used when a form is known to several dictionaries.
    pub const ALL: [Language; 2] = [Language::Russian, Language::English];

    pub fn owns(self, c: char) -> bool {
        match self {
            Language::English => c.is_ascii_alphabetic(),
            Language::Russian => matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё'),
        }
    }

    fn algorithm(self) -> Algorithm {
        match self {
            Language::English => Algorithm::English,
            Language::Russian => Algorithm::Russian,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Pronoun,
    Numeral,
    Preposition,
    Conjunction,
    Particle,
    Interjection,
    Predicative,
    Other,
}

impl PartOfSpeech {
    /// Grammatical words that carry no meaning worth indexing.
    pub fn is_function_word(self) -> bool {
        matches!(
            self,
            PartOfSpeech::Preposition
                | PartOfSpeech::Conjunction
                | PartOfSpeech::Particle
                | PartOfSpeech::Interjection
                | PartOfSpeech::Predicative
        )
    }

    /// Accepts English tag names and the usual Russian dictionary tags.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_uppercase().as_str() {
            "NOUN" | "N" | "С" => PartOfSpeech::Noun,
            "VERB" | "V" | "Г" | "ИНФИНИТИВ" => PartOfSpeech::Verb,
            "ADJ" | "ADJECTIVE" | "П" | "КР_ПРИЛ" => PartOfSpeech::Adjective,
            "ADV" | "ADVERB" | "Н" => PartOfSpeech::Adverb,
            "PRON" | "PRONOUN" | "МС" => PartOfSpeech::Pronoun,
            "NUM" | "NUMERAL" | "ЧИСЛ" => PartOfSpeech::Numeral,
            "PREP" | "PREPOSITION" | "ПРЕДЛ" => PartOfSpeech::Preposition,
            "CONJ" | "CONJUNCTION" | "СОЮЗ" => PartOfSpeech::Conjunction,
            "PART" | "PARTICLE" | "ЧАСТ" => PartOfSpeech::Particle,
            "INTJ" | "INTERJECTION" | "МЕЖД" => PartOfSpeech::Interjection,
            "PRED" | "PREDICATIVE" | "ПРЕДК" => PartOfSpeech::Predicative,
            _ => PartOfSpeech::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MorphInfo {
    pub normal_form: String,
    pub part_of_speech: PartOfSpeech,
}

pub trait Morphology: Send + Sync {
    fn language(&self) -> Language;

    /// Whether the form belongs to this dictionary at all.
    fn check(&self, form: &str) -> bool;

    /// One entry per valid analysis of the form; empty when unknown.
    fn morph_info(&self, form: &str) -> Vec<MorphInfo>;
}

lazy_static! {
    static ref ENGLISH_FUNCTION_WORDS: HashMap<&'static str, PartOfSpeech> = {
        let mut m = HashMap::new();
        let prepositions: &[&str] = &[
            "about","above","across","after","against","along","among","around","at","before","behind","below",
            "beneath","beside","besides","between","beyond","by","despite","down","during","except","for","from",
            "in","inside","into","near","of","off","on","onto","out","outside","over","past","per","since",
            "through","throughout","till","to","toward","towards","under","underneath","unlike","until","up",
            "upon","via","with","within","without",
        ];
        let conjunctions: &[&str] = &[
            "and","but","or","nor","yet","because","although","though","unless","whereas","whether","while",
            "if","than","either","neither","both","whenever","wherever",
        ];
        let particles: &[&str] = &["not","no"];
        let interjections: &[&str] = &["oh","ah","aha","alas","hey","wow","oops","ouch","hmm","hurray","ugh"];
        for w in prepositions { m.insert(*w, PartOfSpeech::Preposition); }
        for w in conjunctions { m.insert(*w, PartOfSpeech::Conjunction); }
        for w in particles { m.insert(*w, PartOfSpeech::Particle); }
        for w in interjections { m.insert(*w, PartOfSpeech::Interjection); }
        m
    };
    static ref RUSSIAN_FUNCTION_WORDS: HashMap<&'static str, PartOfSpeech> = {
        let mut m = HashMap::new();
        let prepositions: &[&str] = &[
            "в","во","на","по","за","из","от","до","для","без","под","над","при","про","через","о","об","обо",
            "к","ко","с","со","у","между","перед","около","вокруг","после","вместо","кроме","среди","сквозь",
            "ради","возле","из-за","из-под","вдоль","мимо","против","благодаря","согласно","навстречу","внутри",
        ];
        let conjunctions: &[&str] = &[
            "и","а","но","или","либо","да","что","чтобы","как","если","хотя","когда","потому","поэтому","также",
            "тоже","зато","однако","ибо","пока","будто","словно","причем","притом","итак",
        ];
        let particles: &[&str] = &[
            "не","ни","же","ли","бы","вот","вон","даже","лишь","только","уже","ещё","еще","разве","неужели",
            "пусть","ведь","именно","почти","всё-таки","-то",
        ];
        let interjections: &[&str] = &["ах","ох","ой","эх","ух","ага","увы","ура","эй","ну","ого","ай"];
        let predicatives: &[&str] = &["нельзя","можно","надо","нужно","жаль","пора"];
        for w in prepositions { m.insert(*w, PartOfSpeech::Preposition); }
        for w in conjunctions { m.insert(*w, PartOfSpeech::Conjunction); }
        for w in particles { m.insert(*w, PartOfSpeech::Particle); }
        for w in interjections { m.insert(*w, PartOfSpeech::Interjection); }
        for w in predicatives { m.insert(*w, PartOfSpeech::Predicative); }
        m
    };
}

fn function_words(language: Language) -> &'static HashMap<&'static str, PartOfSpeech> {
    match language {
        Language::English => &ENGLISH_FUNCTION_WORDS,
        Language::Russian => &RUSSIAN_FUNCTION_WORDS,
    }
}

/// Snowball stemmer standing in for a full dictionary: every form written in
/// the language's alphabet is known, and its stem is its only normal form.
pub struct StemmerMorphology {
    language: Language,
    stemmer: Stemmer,
}

impl StemmerMorphology {
    pub fn new(language: Language) -> Self {
        Self { language, stemmer: Stemmer::create(language.algorithm()) }
    }
}

impl Morphology for StemmerMorphology {
    fn language(&self) -> Language {
        self.language
    }

    fn check(&self, form: &str) -> bool {
        if form.is_empty() || form.starts_with('-') || form.ends_with('-') {
            return false;
        }
        form.chars().all(|c| c == '-' || self.language.owns(c))
    }

    fn morph_info(&self, form: &str) -> Vec<MorphInfo> {
        if !self.check(form) {
            return Vec::new();
        }
        if let Some(pos) = function_words(self.language).get(form) {
            return vec![MorphInfo { normal_form: form.to_string(), part_of_speech: *pos }];
        }
        vec![MorphInfo { normal_form: self.stemmer.stem(form).into_owned(), part_of_speech: PartOfSpeech::Other }]
    }
}

/// Explicit word-form dictionary. Forms listed several times are homonyms.
/// Forms it does not list are delegated to the fallback, if any.
pub struct Lexicon {
    language: Language,
    entries: HashMap<String, Vec<MorphInfo>>,
    fallback: Option<Box<dyn Morphology>>,
}

impl Lexicon {
    pub fn new(language: Language) -> Self {
        Self { language, entries: HashMap::new(), fallback: None }
    }

    pub fn with_fallback<M: Morphology + 'static>(mut self, fallback: M) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn insert(&mut self, form: &str, normal_form: &str, part_of_speech: PartOfSpeech) {
        let infos = self.entries.entry(form.to_lowercase()).or_default();
        let info = MorphInfo { normal_form: normal_form.to_lowercase(), part_of_speech };
        if !infos.contains(&info) {
            infos.push(info);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses `form<TAB>lemma<TAB>part-of-speech` lines. Blank lines and
    /// lines starting with `#` are skipped.
    pub fn parse(language: Language, text: &str) -> Result<Self> {
        let mut lexicon = Self::new(language);
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
            if cols.len() != 3 || cols.iter().any(|c| c.is_empty()) {
                bail!("line {}: expected form, lemma and part of speech separated by tabs", n + 1);
            }
            lexicon.insert(cols[0], cols[1], PartOfSpeech::from_tag(cols[2]));
        }
        Ok(lexicon)
    }

    pub fn load<P: AsRef<Path>>(language: Language, path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading lexicon {}", path.display()))?;
        let lexicon = Self::parse(language, &text).with_context(|| format!("parsing lexicon {}", path.display()))?;
        tracing::info!(?language, forms = lexicon.len(), path = %path.display(), "lexicon loaded");
        Ok(lexicon)
    }
}

impl Morphology for Lexicon {
    fn language(&self) -> Language {
        self.language
    }

    fn check(&self, form: &str) -> bool {
        self.entries.contains_key(form) || self.fallback.as_ref().map_or(false, |f| f.check(form))
    }

    fn morph_info(&self, form: &str) -> Vec<MorphInfo> {
        match self.entries.get(form) {
            Some(infos) => infos.clone(),
            None => self.fallback.as_ref().map(|f| f.morph_info(form)).unwrap_or_default(),
        }
    }
}
