use crate::config::Field;
use crate::tokenizer::LemmaExtractor;
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use rayon::prelude::*;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
}

/// Weighted lemma scores of a page, one weight per configured field.
pub struct FieldExtractor {
    fields: Vec<(Field, Selector)>,
    extractor: Arc<LemmaExtractor>,
}

impl FieldExtractor {
    pub fn new(fields: &[Field], extractor: Arc<LemmaExtractor>) -> Result<Self> {
        let fields = fields
            .iter()
            .map(|field| {
                let selector = Selector::parse(&field.selector)
                    .map_err(|e| anyhow!("field {}: invalid selector `{}`: {}", field.name, field.selector, e))?;
                Ok((field.clone(), selector))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields, extractor })
    }

    pub fn extractor(&self) -> &Arc<LemmaExtractor> {
        &self.extractor
    }

    /// Lemma → sum over fields of `frequency * weight`. Zero scores are dropped.
    pub fn extract(&self, html: &str) -> HashMap<String, f32> {
        let texts: Vec<(f32, String)> = {
            let document = Html::parse_document(html);
            self.fields
                .iter()
                .map(|(field, selector)| {
                    let mut text = String::new();
                    for element in document.select(selector) {
                        push_visible_text(element, &mut text);
                    }
                    (field.weight, text)
                })
                .collect()
        };

        let extractor = &self.extractor;
        let mut scores = texts
            .par_iter()
            .map(|(weight, text)| {
                extractor
                    .stats(text)
                    .into_iter()
                    .map(|(lemma, count)| (lemma, count as f32 * weight))
                    .collect::<Vec<_>>()
            })
            .fold(HashMap::new, |mut acc: HashMap<String, f32>, part| {
                for (lemma, score) in part {
                    *acc.entry(lemma).or_insert(0.0) += score;
                }
                acc
            })
            .reduce(HashMap::new, |mut acc, part| {
                for (lemma, score) in part {
                    *acc.entry(lemma).or_insert(0.0) += score;
                }
                acc
            });
        scores.retain(|_, score| *score > 0.0);
        scores
    }
}

/// Text of the `<title>` element, if the page has one.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = document.select(&TITLE).next()?;
    let mut text = String::new();
    push_visible_text(title, &mut text);
    Some(text)
}

/// All human-visible text of the page, whitespace collapsed to single spaces.
pub fn plain_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    push_visible_text(document.root_element(), &mut text);
    text
}

fn push_visible_text(root: ElementRef<'_>, out: &mut String) {
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .map_or(false, |el| matches!(el.name(), "script" | "style" | "noscript"));
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
}
