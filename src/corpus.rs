//! Request corpus for randomized request parameters.
//!
//! A corpus is loaded from a JSON file in one of two shapes:
//!
//! ```json
//! ["{\"id\":1}", "{\"id\":2}"]
//! ```
//!
//! ```json
//! [["http://host/a", "{\"id\":1}"], ["", "{\"id\":2}"]]
//! ```
//!
//! The first shape carries bodies only. In the second, an empty URL means
//! "use the default target URL", and a one-element inner array is a body-only
//! entry. Each request draws one entry uniformly at random.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when loading a request corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Failed to read corpus file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corpus is not a JSON array of strings or of [url, body] arrays: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Corpus entry {index} has {len} elements, expected 1 or 2")]
    InvalidEntry { index: usize, len: usize },
}

/// URL and body for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub url: String,
    pub body: String,
}

/// One corpus entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusEntry {
    /// Body only; the request goes to the default URL.
    Body(String),

    /// URL and body. An empty URL falls back to the default URL.
    Pair { url: String, body: String },
}

impl CorpusEntry {
    fn to_spec(&self, default_url: &str) -> RequestSpec {
        match self {
            CorpusEntry::Body(body) => RequestSpec {
                url: default_url.to_string(),
                body: body.clone(),
            },
            CorpusEntry::Pair { url, body } if url.is_empty() => RequestSpec {
                url: default_url.to_string(),
                body: body.clone(),
            },
            CorpusEntry::Pair { url, body } => RequestSpec {
                url: url.clone(),
                body: body.clone(),
            },
        }
    }
}

/// On-disk layouts accepted by the loader.
#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Pairs(Vec<Vec<String>>),
    Bodies(Vec<String>),
}

/// In-memory request corpus. Immutable once loaded, shared by all workers.
#[derive(Debug, Clone, Default)]
pub struct RequestCorpus {
    entries: Vec<CorpusEntry>,
}

impl RequestCorpus {
    fn from_entries(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    /// Parse a corpus from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, CorpusError> {
        let entries = match serde_json::from_str::<CorpusFile>(json)? {
            CorpusFile::Bodies(bodies) => bodies.into_iter().map(CorpusEntry::Body).collect(),
            CorpusFile::Pairs(pairs) => pairs
                .into_iter()
                .enumerate()
                .map(|(index, pair)| normalize_pair(index, pair))
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Self::from_entries(entries))
    }

    /// Load a corpus from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path_ref = path.as_ref();
        info!(path = ?path_ref, "Loading request corpus");

        let contents = fs::read_to_string(path_ref)?;
        let corpus = Self::from_json_str(&contents)?;

        info!(path = ?path_ref, entries = corpus.len(), "Request corpus loaded");
        Ok(corpus)
    }

    /// Load a corpus, degrading to an empty one when the file is unusable.
    ///
    /// An empty corpus sends every request to the default URL with an empty
    /// body, so a bad file never stops the run.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        let path_ref = path.as_ref();
        match Self::from_file(path_ref) {
            Ok(corpus) => corpus,
            Err(e) => {
                warn!(
                    path = ?path_ref,
                    error = %e,
                    "Unable to load request corpus, falling back to default URL with empty body"
                );
                Self::default()
            }
        }
    }

    /// Draw the parameters for one request.
    pub fn sample<R: Rng + ?Sized>(&self, default_url: &str, rng: &mut R) -> RequestSpec {
        match self.entries.choose(rng) {
            Some(entry) => entry.to_spec(default_url),
            None => RequestSpec {
                url: default_url.to_string(),
                body: String::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_pair(index: usize, mut pair: Vec<String>) -> Result<CorpusEntry, CorpusError> {
    match pair.len() {
        1 => Ok(CorpusEntry::Body(pair.remove(0))),
        2 => {
            let body = pair.remove(1);
            let url = pair.remove(0);
            Ok(CorpusEntry::Pair { url, body })
        }
        len => Err(CorpusError::InvalidEntry { index, len }),
    }
}
