//! Persistence side of a site crawl. Crawl tasks hand pages over and move
//! on; a single blocking worker writes the queued records in batches.

use crate::factory::{postings_for, LemmaCache};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use search_core::fields::FieldExtractor;
use search_core::store::{Record, Store};
use search_core::Page;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct Shared {
    store: Arc<dyn Store>,
    queue: Mutex<VecDeque<Record>>,
    /// `true` while a worker run is active. Only changed with `queue` held.
    busy: watch::Sender<bool>,
    failure: Mutex<Option<anyhow::Error>>,
    /// Set by the first failed batch. Nothing is queued afterwards.
    failed: AtomicBool,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
    fields: Arc<FieldExtractor>,
    lemmas: Arc<LemmaCache>,
    runtime: Handle,
}

impl Pipeline {
    /// Must be called from within a tokio runtime; the worker runs on its
    /// blocking pool.
    pub fn new(
        store: Arc<dyn Store>,
        fields: Arc<FieldExtractor>,
        lemmas: Arc<LemmaCache>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let (busy, _) = watch::channel(false);
        let shared = Shared {
            store,
            queue: Mutex::new(VecDeque::new()),
            busy,
            failure: Mutex::new(None),
            failed: AtomicBool::new(false),
            cancel,
        };
        Ok(Self { shared: Arc::new(shared), fields, lemmas, runtime })
    }

    /// Queues the page, then its lemmas and postings. Blocks on lemma
    /// extraction, so async callers should go through `spawn_blocking`.
    pub fn run(&self, page: Page) {
        if self.shared.cancel.is_cancelled() || self.is_failed() {
            return;
        }
        let indexable = page.is_indexable();
        let scores = if indexable { Some(self.fields.extract(&page.content)) } else { None };

        let mut queue = self.shared.queue.lock();
        queue.push_back(Record::Page(page.clone()));
        match scores {
            Some(scores) => {
                let words = self.lemmas.resolve(self.shared.store.as_ref(), &scores);
                let postings = postings_for(self.shared.store.as_ref(), &page, &words);
                tracing::trace!(path = %page.path, lemmas = words.len(), "page queued");
                queue.extend(words.into_iter().map(Record::Word));
                queue.extend(postings.into_iter().map(Record::Posting));
            }
            None => tracing::debug!(path = %page.path, code = page.code, "page declined due to status code"),
        }
        self.schedule(&mut queue);
    }

    fn schedule(&self, _queue: &mut VecDeque<Record>) {
        if *self.shared.busy.borrow() {
            return;
        }
        self.shared.busy.send_replace(true);
        let shared = self.shared.clone();
        self.runtime.spawn_blocking(move || drain(&shared));
    }

    /// Waits until no worker run is active and reports the first failed
    /// batch, if it was not reported yet.
    pub async fn close(&self) -> Result<()> {
        let mut idle = self.shared.busy.subscribe();
        idle.wait_for(|busy| !*busy).await.map_err(|_| anyhow!("pipeline worker vanished"))?;
        match self.shared.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Set once a batch failed; later pages are dropped.
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

fn drain(shared: &Shared) {
    loop {
        let batch = {
            let mut queue = shared.queue.lock();
            let size = queue.len();
            if size == 0 || shared.cancel.is_cancelled() {
                shared.busy.send_replace(false);
                return;
            }
            let mut batch = Vec::with_capacity(size);
            while batch.len() < size && !shared.cancel.is_cancelled() {
                match queue.pop_front() {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }
            batch
        };
        let len = batch.len();
        if let Err(err) = shared.store.write(batch) {
            tracing::error!(error = %err, records = len, "batch write failed");
            let mut queue = shared.queue.lock();
            queue.clear();
            shared.failure.lock().get_or_insert(err);
            shared.failed.store(true, Ordering::Release);
            shared.busy.send_replace(false);
            return;
        }
        tracing::debug!(records = len, "batch committed");
    }
}
