use crate::morphology::Morphology;
use std::fmt;

/// The dictionary form(s) of a word. A homonym keeps every candidate, in
/// dictionary order, and is rendered pipe-delimited (`мой|мыть`).
///
/// Two lexemes match when the candidates of one include all candidates of the
/// other. The relation is not transitive, so `Lexeme` deliberately has no
/// `PartialEq`/`Hash`: collections of lexemes are searched linearly with
/// [`Lexeme::matches`].
#[derive(Debug, Clone)]
pub struct Lexeme {
    forms: Vec<String>,
}

impl Lexeme {
    /// `None` when the form is unknown or only analysable as a function word.
    pub fn normalize(form: &str, morphology: &dyn Morphology) -> Option<Self> {
        let mut forms: Vec<String> = Vec::new();
        for info in morphology.morph_info(form) {
            if info.part_of_speech.is_function_word() {
                continue;
            }
            if !forms.contains(&info.normal_form) {
                forms.push(info.normal_form);
            }
        }
        if forms.is_empty() {
            None
        } else {
            Some(Self { forms })
        }
    }

    /// Rebuilds a lexeme from a stored lemma name.
    pub fn parse(name: &str) -> Self {
        Self { forms: name.split('|').filter(|f| !f.is_empty()).map(str::to_string).collect() }
    }

    pub fn name(&self) -> String {
        self.forms.join("|")
    }

    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    pub fn is_homonym(&self) -> bool {
        self.forms.len() > 1
    }

    /// Every candidate of `other` is also a candidate of `self`.
    pub fn covers(&self, other: &Lexeme) -> bool {
        other.forms.iter().all(|f| self.forms.contains(f))
    }

    pub fn matches(&self, other: &Lexeme) -> bool {
        self.covers(other) || other.covers(self)
    }
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{Language, Lexicon, PartOfSpeech, StemmerMorphology};

    fn russian() -> Lexicon {
        let mut lexicon = Lexicon::new(Language::Russian);
        lexicon.insert("мой", "мой", PartOfSpeech::Pronoun);
        lexicon.insert("мой", "мыть", PartOfSpeech::Verb);
        lexicon.insert("мыть", "мыть", PartOfSpeech::Verb);
        lexicon.insert("под", "под", PartOfSpeech::Preposition);
        lexicon.insert("стали", "стать", PartOfSpeech::Verb);
        lexicon.insert("стали", "сталь", PartOfSpeech::Noun);
        lexicon.insert("стали", "стали", PartOfSpeech::Preposition);
        lexicon
    }

    #[test]
    fn homonyms_keep_all_candidates() {
        let lexeme = Lexeme::normalize("мой", &russian()).unwrap();
        assert!(lexeme.is_homonym());
        assert_eq!(lexeme.name(), "мой|мыть");
    }

    #[test]
    fn function_analyses_are_dropped() {
        assert!(Lexeme::normalize("под", &russian()).is_none());
        assert_eq!(Lexeme::normalize("стали", &russian()).unwrap().name(), "стать|сталь");
    }

    #[test]
    fn unknown_forms_are_discarded() {
        assert!(Lexeme::normalize("дом", &russian()).is_none());
    }

    #[test]
    fn matching_is_superset_either_way() {
        let broad = Lexeme::parse("мой|мыть");
        let narrow = Lexeme::normalize("мыть", &russian()).unwrap();
        assert!(broad.covers(&narrow));
        assert!(!narrow.covers(&broad));
        assert!(broad.matches(&narrow));
        assert!(narrow.matches(&broad));
        assert!(!Lexeme::parse("мой").matches(&Lexeme::parse("мыть")));
    }

    #[test]
    fn parse_round_trips_names() {
        assert_eq!(Lexeme::parse("a|b").name(), "a|b");
        assert_eq!(Lexeme::parse("run").forms(), ["run".to_string()]);
    }

    #[test]
    fn stems_plain_words() {
        let en = StemmerMorphology::new(Language::English);
        assert_eq!(Lexeme::normalize("runs", &en).unwrap().name(), "run");
    }
}
