use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use search_core::config::{Config, SiteConfig};
use search_core::error::{Error, Rejection};
use search_core::store::{MemoryStore, Store};
use search_core::SiteStatus;
use search_indexer::{IndexBuilder, LaunchState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const HOME: &str = r#"<html><head><title>Home</title></head><body>
    <p>Welcome to the garden</p>
    <a href="/missing">Missing page</a>
    <a href="/vegetables">Vegetables</a>
</body></html>"#;

const VEGETABLES: &str = r#"<html><head><title>Vegetables</title></head><body>
    <p>Carrots grow underground in the garden</p>
</body></html>"#;

fn fixture() -> Router {
    let hits = Arc::new(AtomicUsize::new(0));
    Router::new()
        .route("/", get(|| async { Html(HOME) }))
        .route("/vegetables", get(|| async { Html(VEGETABLES) }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, Html("<html><body>Tomatoes are gone</body></html>")) }))
        .route(
            "/news",
            get(move || {
                let first = hits.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    Html(if first {
                        "<html><body>Carrots and potatoes harvested</body></html>"
                    } else {
                        "<html><body>Potatoes harvested again</body></html>"
                    })
                }
            }),
        )
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn config(base: &str, delay_ms: u64) -> Config {
    let mut config = Config::with_sites(vec![SiteConfig { url: base.to_string(), name: "Garden".into() }]);
    config.crawler.min_delay_ms = delay_ms;
    config.crawler.max_delay_ms = delay_ms;
    config
}

fn builder(config: Config) -> (IndexBuilder, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (IndexBuilder::new(config, store.clone()).unwrap(), store)
}

#[tokio::test(flavor = "multi_thread")]
async fn builds_the_index_of_every_site() {
    let base = serve(fixture()).await;
    let (builder, store) = builder(config(&base, 0));

    builder.start().unwrap();
    assert!(builder.is_indexing());
    builder.wait_idle().await;
    assert_eq!(builder.state(), LaunchState::Idle);

    let site = store.find_site(&base).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert!(site.last_error.is_none());
    assert_eq!(store.count_pages(Some(site.id)).unwrap(), 3);
    assert!(store.find_word(site.id, "tomato").unwrap().is_none());
    assert_eq!(store.find_word(site.id, "garden").unwrap().unwrap().frequency, 2);
    assert_eq!(store.pages_with_lemma(site.id, "carrot").unwrap().len(), 1);

    let stats = serde_json::to_value(builder.statistics().unwrap()).unwrap();
    assert_eq!(stats["total"]["sites"], 1);
    assert_eq!(stats["total"]["pages"], 3);
    assert_eq!(stats["total"]["isIndexing"], false);
    assert_eq!(stats["detailed"][0]["status"], "INDEXED");
    assert_eq!(stats["detailed"][0]["name"], "Garden");
    assert!(stats["detailed"][0]["statusTime"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuilds_replace_previous_content() {
    let base = serve(fixture()).await;
    let (builder, store) = builder(config(&base, 0));
    for _ in 0..2 {
        builder.start().unwrap();
        builder.wait_idle().await;
    }
    assert_eq!(store.sites().unwrap().len(), 1);
    assert_eq!(store.count_pages(None).unwrap(), 3);
    let site = store.find_site(&base).unwrap().unwrap();
    assert_eq!(store.find_word(site.id, "garden").unwrap().unwrap().frequency, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_invalid_state_changes() {
    let base = serve(fixture()).await;
    let (builder, store) = builder(config(&base, 300));

    assert_eq!(builder.stop(), Err(Rejection::NotRunning));
    builder.start().unwrap();
    assert_eq!(builder.start(), Err(Rejection::AlreadyRunning));
    builder.stop().unwrap();
    assert_eq!(builder.state(), LaunchState::Stopping);
    assert_eq!(builder.stop(), Err(Rejection::AlreadyStopping));
    assert_eq!(builder.start(), Err(Rejection::StillStopping));

    builder.wait_idle().await;
    assert_eq!(builder.stop(), Err(Rejection::NotRunning));
    let site = store.find_site(&base).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Failed);
    assert_eq!(site.last_error.as_deref(), Some("Indexing stopped by user"));
    assert_eq!(store.count_pages(None).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn reindexes_single_pages() {
    let base = serve(fixture()).await;
    let (builder, store) = builder(config(&base, 0));

    builder.index_page(&format!("{base}/news")).await.unwrap();
    let site = store.find_site(&base).unwrap().unwrap();
    let page = store.find_page(site.id, "/news").unwrap().unwrap();
    assert_eq!(store.find_word(site.id, "carrot").unwrap().unwrap().frequency, 1);

    builder.index_page(&format!("{base}/news")).await.unwrap();
    assert_eq!(store.find_page(site.id, "/news").unwrap().unwrap().id, page.id);
    assert!(store.find_word(site.id, "carrot").unwrap().is_none());
    assert_eq!(store.find_word(site.id, "potato").unwrap().unwrap().frequency, 1);
    assert_eq!(store.find_word(site.id, "harvest").unwrap().unwrap().frequency, 1);
    assert_eq!(store.postings_for_page(page.id).unwrap().len(), 3);

    builder.index_page(&format!("{base}/missing")).await.unwrap();
    let missing = store.find_page(site.id, "/missing").unwrap().unwrap();
    assert_eq!(missing.code, 404);
    assert!(store.postings_for_page(missing.id).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_pages_of_unknown_sites() {
    let base = serve(fixture()).await;
    let (builder, store) = builder(config(&base, 0));
    for url in ["https://elsewhere.example/news", "not a url"] {
        match builder.index_page(url).await {
            Err(Error::Rejected(rejection)) => assert_eq!(rejection, Rejection::PageOutOfScope),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert!(store.sites().unwrap().is_empty());
}
