pub mod crawl;
pub mod factory;
pub mod fetch;
pub mod links;
pub mod pipeline;

pub use crawl::Crawler;
pub use factory::{postings_for, reindex_records, LemmaCache};
pub use fetch::{Fetched, Fetcher};
pub use links::LinkManager;
pub use pipeline::Pipeline;
