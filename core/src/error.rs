use thiserror::Error;

/// A request refused because of the current state or its own arguments.
/// Never a crawl or index failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Indexing is already running")]
    AlreadyRunning,
    #[error("Indexing is still stopping")]
    StillStopping,
    #[error("Indexing is not running")]
    NotRunning,
    #[error("Indexing is already stopping")]
    AlreadyStopping,
    #[error("The page is outside of the sites listed in the configuration")]
    PageOutOfScope,
    #[error("The site is not present in the index")]
    UnknownSite,
    #[error("Not all sites are indexed")]
    NotIndexed,
    #[error("The search query is empty")]
    EmptyQuery,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
