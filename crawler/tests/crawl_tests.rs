use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use search_core::config::{default_fields, CrawlerConfig};
use search_core::fields::FieldExtractor;
use search_core::store::{MemoryStore, Record, Store};
use search_core::tokenizer::LemmaExtractor;
use search_core::{Page, Site};
use search_crawler::{Crawler, Fetcher, LemmaCache, Pipeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const HOME: &str = r#"<html><head><title>Home</title></head><body>
    <p>Welcome to the garden</p>
    <a href="/missing">Missing page</a>
    <a href="/vegetables">Vegetables</a>
    <a href="/vegetables#top">Vegetables again</a>
    <a href="http://localhost:9/elsewhere">Elsewhere</a>
    <a href="/picture.png">Picture</a>
</body></html>"#;

const VEGETABLES: &str = r#"<html><head><title>Vegetables</title></head><body>
    <p>Carrots grow underground in the garden</p><a href="/">Home</a>
</body></html>"#;

fn fixture() -> Router {
    Router::new()
        .route("/", get(|| async { Html(HOME) }))
        .route("/vegetables", get(|| async { Html(VEGETABLES) }))
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, Html("<html><body>Tomatoes are gone</body></html>")) }),
        )
        .route("/picture.png", get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0u8, 1, 2, 3]) }))
}

/// A root page linking to many slow leaves. Tracks how many requests the
/// server sees at once.
#[derive(Default)]
struct Wide {
    home: String,
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

fn wide_fixture(leaves: usize) -> (Router, Arc<Wide>) {
    let links: String = (0..leaves).map(|i| format!(r#"<a href="/leaf/{i}">Leaf {i}</a>"#)).collect();
    let wide = Arc::new(Wide {
        home: format!("<html><head><title>Leaves</title></head><body><p>Garden leaves</p>{links}</body></html>"),
        ..Wide::default()
    });
    let app = Router::new().route("/", get(wide_home)).route("/leaf/:id", get(wide_leaf)).with_state(wide.clone());
    (app, wide)
}

async fn wide_home(State(wide): State<Arc<Wide>>) -> Html<String> {
    wide.requests.fetch_add(1, Ordering::SeqCst);
    Html(wide.home.clone())
}

async fn wide_leaf(State(wide): State<Arc<Wide>>, Path(id): Path<usize>) -> Html<String> {
    wide.requests.fetch_add(1, Ordering::SeqCst);
    let now = wide.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    wide.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    wide.in_flight.fetch_sub(1, Ordering::SeqCst);
    Html(format!("<html><body><p>Leaf number {id} of the garden</p></body></html>"))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn fetcher() -> Arc<Fetcher> {
    limited_fetcher(CrawlerConfig::default().max_concurrent_fetches)
}

fn limited_fetcher(max_concurrent_fetches: usize) -> Arc<Fetcher> {
    let config = CrawlerConfig { min_delay_ms: 0, max_delay_ms: 0, max_concurrent_fetches, ..CrawlerConfig::default() };
    Arc::new(Fetcher::new(&config).unwrap())
}

fn pipeline(store: Arc<MemoryStore>, site: &Site, cancel: &CancellationToken) -> Pipeline {
    let fields = FieldExtractor::new(&default_fields(), Arc::new(LemmaExtractor::default())).unwrap();
    Pipeline::new(store, Arc::new(fields), Arc::new(LemmaCache::new(site.id)), cancel.child_token()).unwrap()
}

async fn crawl_with(
    store: Arc<MemoryStore>,
    site: &Site,
    fetcher: Arc<Fetcher>,
    pipeline: Pipeline,
    cancel: CancellationToken,
) {
    let crawler = Crawler::new(site.clone(), store, fetcher, pipeline, cancel.child_token()).unwrap();
    crawler.run().await.unwrap();
}

async fn crawl(store: Arc<MemoryStore>, site: &Site, cancel: CancellationToken) {
    let pipeline = pipeline(store.clone(), site, &cancel);
    crawl_with(store, site, fetcher(), pipeline.clone(), cancel).await;
    pipeline.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn crawls_every_internal_html_page_once() {
    let base = serve(fixture()).await;
    let store = Arc::new(MemoryStore::new());
    let site = Site::new(store.next_id(), &base, "Garden");
    store.upsert_site(&site).unwrap();
    store
        .write(vec![Record::Page(Page {
            id: store.next_id(),
            site_id: site.id,
            path: "/stale".into(),
            code: 200,
            content: String::new(),
        })])
        .unwrap();

    crawl(store.clone(), &site, CancellationToken::new()).await;

    let paths: Vec<String> = store.pages(site.id).unwrap().into_iter().map(|p| p.path).collect();
    assert_eq!(paths.len(), 3, "{paths:?}");
    for path in ["/", "/missing", "/vegetables"] {
        assert!(paths.iter().any(|p| p == path), "{path} not crawled");
    }
    assert_eq!(store.find_page(site.id, "/missing").unwrap().unwrap().code, 404);

    assert!(store.find_word(site.id, "tomato").unwrap().is_none());
    let carrot = store.find_word(site.id, "carrot").unwrap().unwrap();
    assert_eq!(carrot.frequency, 1);
    let vegetables = store.find_page(site.id, "/vegetables").unwrap().unwrap();
    assert_eq!(store.pages_with_lemma(site.id, "carrot").unwrap().into_iter().collect::<Vec<_>>(), vec![vegetables.id]);
    assert_eq!(store.find_word(site.id, "garden").unwrap().unwrap().frequency, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_crawls_fetch_nothing() {
    let base = serve(fixture()).await;
    let store = Arc::new(MemoryStore::new());
    let site = Site::new(store.next_id(), &base, "Garden");
    let cancel = CancellationToken::new();
    cancel.cancel();
    crawl(store.clone(), &site, cancel).await;
    assert_eq!(store.count_pages(None).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_in_flight_stay_within_the_limit() {
    let (app, wide) = wide_fixture(30);
    let base = serve(app).await;
    let store = Arc::new(MemoryStore::new());
    let site = Site::new(store.next_id(), &base, "Leaves");
    store.upsert_site(&site).unwrap();
    let cancel = CancellationToken::new();
    let pipeline = pipeline(store.clone(), &site, &cancel);

    crawl_with(store.clone(), &site, limited_fetcher(4), pipeline.clone(), cancel).await;
    pipeline.close().await.unwrap();

    assert_eq!(store.count_pages(Some(site.id)).unwrap(), 31);
    assert_eq!(wide.requests.load(Ordering::SeqCst), 31);
    let peak = wide.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "{peak} requests in flight");
    assert!(peak >= 2, "leaves were fetched one by one");
}

#[tokio::test(flavor = "multi_thread")]
async fn crawls_stop_once_the_pipeline_has_failed() {
    let (app, wide) = wide_fixture(5);
    let base = serve(app).await;
    let store = Arc::new(MemoryStore::new());
    let site = Site::new(store.next_id(), &base, "Leaves");
    store.upsert_site(&site).unwrap();
    let cancel = CancellationToken::new();
    let pipeline = pipeline(store.clone(), &site, &cancel);
    // one path under two ids violates the page key
    for id in [1000, 2000] {
        pipeline.run(Page { id, site_id: site.id, path: "/taken".into(), code: 200, content: String::new() });
    }
    assert!(pipeline.close().await.is_err());

    crawl_with(store.clone(), &site, fetcher(), pipeline.clone(), cancel).await;

    assert_eq!(wide.requests.load(Ordering::SeqCst), 0);
    assert_eq!(store.count_pages(Some(site.id)).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetcher_keeps_error_pages_and_skips_other_content() {
    let base = Url::parse(&serve(fixture()).await).unwrap();
    let fetcher = fetcher();

    let missing = fetcher.fetch(&base.join("/missing").unwrap()).await.unwrap().unwrap();
    assert_eq!(missing.code, 404);
    assert_eq!(missing.path, "/missing");
    assert!(fetcher.fetch(&base.join("/picture.png").unwrap()).await.unwrap().is_none());
    assert!(fetcher.fetch(&Url::parse("http://127.0.0.1:9/").unwrap()).await.is_err());
}
