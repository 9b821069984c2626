use search_core::tokenizer::LemmaExtractor;

#[test]
fn it_selects_words_before_normalizing() {
    let extractor = LemmaExtractor::default();
    let words = extractor.select_words("Some people have long curly hair. Hello-World, телефон-Samsung!");
    assert_eq!(
        words,
        vec!["some", "people", "have", "long", "curly", "hair", "hello-world", "телефон", "samsung"]
    );
}

#[test]
fn it_returns_keys_that_normalize_to_themselves() {
    let extractor = LemmaExtractor::default();
    let stats = extractor.stats("hello-world it's night time");
    assert!(!stats.is_empty());
    for (lemma, _) in &stats {
        let again = extractor.stats(lemma);
        assert_eq!(again.len(), 1, "{lemma} split into {again:?}");
        assert_eq!(&again[0].0, lemma);
    }
}

#[test]
fn it_discards_words_no_dictionary_knows() {
    let extractor = LemmaExtractor::default();
    assert!(extractor.stats("шxвxт").is_empty());
    assert!(extractor.stats("").is_empty());
}

#[test]
fn it_counts_inflected_forms_together() {
    let extractor = LemmaExtractor::default();
    let stats = extractor.stats("Crawlers crawl. The crawler crawled; кошка и кошки");
    let count = |name: &str| stats.iter().find(|(l, _)| l == name).map(|(_, c)| *c);
    assert_eq!(count("crawl"), Some(2));
    assert_eq!(count("crawler"), Some(2));
    assert_eq!(count("кошк"), Some(2));
    assert_eq!(count("и"), None);
}
