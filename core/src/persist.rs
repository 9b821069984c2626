use crate::{Page, Posting, Site, Word};
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub sites: usize,
    pub pages: usize,
    pub words: usize,
    pub postings: usize,
    pub next_id: u64,
    pub created_at: String,
    pub version: u32,
}

/// Full content of a store, as written to and read from an index directory.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub sites: Vec<Site>,
    pub pages: Vec<Page>,
    pub words: Vec<Word>,
    pub postings: Vec<Posting>,
    pub next_id: u64,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn sites(&self) -> PathBuf { self.root.join("sites.bin") }
    fn pages(&self) -> PathBuf { self.root.join("pages.bin") }
    fn words(&self) -> PathBuf { self.root.join("words.bin") }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("bin.tmp");
    let mut f = File::create(&tmp)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let value = bincode::deserialize(&buf).with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}

/// Writes every table, then `meta.json` last so a torn write is never loaded.
pub fn save_snapshot(paths: &IndexPaths, snapshot: &Snapshot) -> Result<()> {
    create_dir_all(&paths.root)?;
    save_bin(&paths.sites(), &snapshot.sites)?;
    save_bin(&paths.pages(), &snapshot.pages)?;
    save_bin(&paths.words(), &snapshot.words)?;
    save_bin(&paths.postings(), &snapshot.postings)?;
    let meta = MetaFile {
        sites: snapshot.sites.len(),
        pages: snapshot.pages.len(),
        words: snapshot.words.len(),
        postings: snapshot.postings.len(),
        next_id: snapshot.next_id,
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        version: SNAPSHOT_VERSION,
    };
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(&meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// `None` when the directory holds no snapshot yet.
pub fn load_snapshot(paths: &IndexPaths) -> Result<Option<Snapshot>> {
    if !paths.meta().exists() {
        return Ok(None);
    }
    let meta = load_meta(paths)?;
    if meta.version != SNAPSHOT_VERSION {
        bail!("snapshot version {} is not supported (expected {})", meta.version, SNAPSHOT_VERSION);
    }
    let snapshot = Snapshot {
        sites: load_bin(&paths.sites())?,
        pages: load_bin(&paths.pages())?,
        words: load_bin(&paths.words())?,
        postings: load_bin(&paths.postings())?,
        next_id: meta.next_id,
    };
    if snapshot.pages.len() != meta.pages || snapshot.postings.len() != meta.postings {
        bail!("snapshot tables disagree with meta.json");
    }
    Ok(Some(snapshot))
}
