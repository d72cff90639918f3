#![forbid(unsafe_code)]

//! Remote catalog access: the paginated "latest maps" listing, lookups by
//! content hash and archive downloads.

use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;

use crate::error::{BsmhError, Result};

/// Entries per listing page. Only the last page of the feed may be shorter.
pub const PAGE_SIZE: usize = 10;

const LATEST_PATH: &str = "maps/latest";
const BY_HASH_PATH: &str = "maps/by-hash";
const DOWNLOAD_PATH: &str = "download/hash";

/// One map as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawListingEntry")]
pub struct ListingEntry {
    pub content_hash: String,
    pub display_name: String,
    pub key: String,
    pub uploaded_at: DateTime<Utc>,
    pub author_name: String,
}

/// Wire shape of a listing entry. `key` and `levelAuthorName` are absent on
/// some records; they decode as empty strings.
#[derive(Deserialize)]
struct RawListingEntry {
    hash: String,
    name: String,
    #[serde(default)]
    key: String,
    uploaded: DateTime<Utc>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Default, Deserialize)]
struct RawMetadata {
    #[serde(default, rename = "levelAuthorName")]
    level_author_name: String,
}

impl From<RawListingEntry> for ListingEntry {
    fn from(raw: RawListingEntry) -> Self {
        Self {
            content_hash: raw.hash,
            display_name: raw.name,
            key: raw.key,
            uploaded_at: raw.uploaded,
            author_name: raw.metadata.level_author_name,
        }
    }
}

#[derive(Deserialize)]
struct ListingBody {
    #[serde(default)]
    docs: Vec<ListingEntry>,
}

/// One page of the listing, newest first.
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub entries: Vec<ListingEntry>,
}

impl Page {
    /// A short page means the remote feed has nothing older to offer.
    pub fn is_last(&self) -> bool {
        self.entries.len() < PAGE_SIZE
    }
}

/// Everything the pipeline needs from the remote service.
pub trait Catalog {
    fn fetch_page(&self, index: usize) -> Result<Page>;

    /// Looks up a single map. A map that was deleted remotely yields
    /// [`BsmhError::NotFound`] rather than a transport error.
    fn fetch_by_hash(&self, hash: &str) -> Result<ListingEntry>;

    /// Streams the zip archive of a map into `sink`, returning the byte count.
    fn download_archive(&self, hash: &str, sink: &mut dyn Write) -> Result<u64>;
}

/// Blocking HTTP client for the BeatSaver API.
pub struct BeatSaverClient {
    agent: ureq::Agent,
    base_url: String,
}

impl BeatSaverClient {
    pub fn new(base_url: &str, user_agent: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(user_agent)
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(60))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str, tail: &str) -> String {
        format!("{}/{}/{}", self.base_url, path, tail)
    }

    fn get(&self, url: &str) -> std::result::Result<ureq::Response, ureq::Error> {
        debug!("GET {url}");
        self.agent.get(url).call()
    }
}

fn describe(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            format!("status {code} {}", response.status_text())
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

impl Catalog for BeatSaverClient {
    fn fetch_page(&self, index: usize) -> Result<Page> {
        let url = self.url(LATEST_PATH, &index.to_string());
        let response = self
            .get(&url)
            .map_err(|err| BsmhError::remote(&url, describe(err)))?;
        let body: ListingBody = response
            .into_json()
            .map_err(|err| BsmhError::remote(&url, format!("malformed listing: {err}")))?;
        debug!("page {index}: {} entries", body.docs.len());
        Ok(Page {
            index,
            entries: body.docs,
        })
    }

    fn fetch_by_hash(&self, hash: &str) -> Result<ListingEntry> {
        let url = self.url(BY_HASH_PATH, hash);
        let response = match self.get(&url) {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                return Err(BsmhError::NotFound {
                    hash: hash.to_string(),
                });
            }
            Err(err) => return Err(BsmhError::remote(&url, describe(err))),
        };
        let entry: Option<ListingEntry> = response
            .into_json()
            .map_err(|err| BsmhError::remote(&url, format!("malformed entry: {err}")))?;
        entry.ok_or_else(|| BsmhError::NotFound {
            hash: hash.to_string(),
        })
    }

    fn download_archive(&self, hash: &str, sink: &mut dyn Write) -> Result<u64> {
        let url = self.url(DOWNLOAD_PATH, hash);
        let response = self
            .get(&url)
            .map_err(|err| BsmhError::remote(&url, describe(err)))?;
        let mut reader = response.into_reader();
        io::copy(&mut reader, sink).map_err(|err| BsmhError::remote(&url, err))
    }
}
