//! Self-evolving glossary backed by an append-only `source=target` file.
//!
//! Lookups take a read lock and may run concurrently; reloads and inserts
//! take the write lock. An insert appends to the file first and only then
//! becomes visible in memory.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Conventional XUnity glossary file name.
pub const GLOSSARY_FILE: &str = "_Substitutions.txt";

/// Header of the hint block appended to the system prompt.
pub const KNOWN_TERMS_HEADER: &str = "【已知术语/Known Terms】:";

const DELIMITER: char = '=';
const MIN_SOURCE_CHARS: usize = 2;

/// Errors from loading a glossary file.
#[derive(Debug, Error)]
pub enum GlossaryError {
    #[error("Failed to read glossary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a validated insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The term was stored.
    Inserted,
    /// The source phrase is already known; nothing changed.
    Duplicate,
    /// The candidate broke a term invariant.
    Rejected,
    /// The append to the backing file failed; memory is unchanged.
    WriteFailed,
}

impl InsertOutcome {
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    target: String,
    folded: String,
}

#[derive(Debug, Default)]
struct Index {
    path: Option<PathBuf>,
    terms: BTreeMap<String, Entry>,
}

/// Concurrent glossary store.
#[derive(Debug, Default)]
pub struct GlossaryStore {
    index: RwLock<Index>,
}

impl GlossaryStore {
    /// A store with no backing file. Inserts only update memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading any existing terms.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GlossaryError> {
        let store = Self::default();
        store.reload(path)?;
        Ok(store)
    }

    /// Replace the whole in-memory index with the contents of `path`.
    ///
    /// On a read error the current index and backing path are kept.
    ///
    /// A missing file yields an empty glossary; the file is created on the
    /// first learned term. Invalid UTF-8 is decoded lossily so one bad line
    /// does not cost the rest of the file.
    pub fn reload(&self, path: impl Into<PathBuf>) -> Result<usize, GlossaryError> {
        let path = path.into();
        let terms = match fs::read(&path) {
            Ok(bytes) => parse_terms(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(GlossaryError::Read { path, source }),
        };
        let count = terms.len();
        debug!(terms = count, "Loaded glossary from {}", path.display());

        let mut index = self.index.write();
        index.path = Some(path);
        index.terms = terms;
        Ok(count)
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.index.read().path.clone()
    }

    pub fn len(&self) -> usize {
        self.index.read().terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().terms.is_empty()
    }

    /// Target phrase for an exact source phrase.
    pub fn get(&self, source: &str) -> Option<String> {
        self.index
            .read()
            .terms
            .get(source)
            .map(|e| e.target.clone())
    }

    /// All terms whose source occurs in `text`, ignoring case.
    pub fn matching_terms(&self, text: &str) -> Vec<(String, String)> {
        let folded_text = text.to_lowercase();
        self.index
            .read()
            .terms
            .iter()
            .filter(|(_, entry)| folded_text.contains(&entry.folded))
            .map(|(source, entry)| (source.clone(), entry.target.clone()))
            .collect()
    }

    /// Hint block listing every term found in `text`, or an empty string.
    pub fn context_prompt(&self, text: &str) -> String {
        format_hint_block(&self.matching_terms(text))
    }

    /// Insert a learned term, enforcing the term invariants.
    ///
    /// Never fails loudly: violations and duplicates are reported through the
    /// returned outcome only.
    pub fn learn(&self, source: &str, target: &str) -> InsertOutcome {
        if !is_valid_term(source, target) {
            return InsertOutcome::Rejected;
        }

        let mut index = self.index.write();
        if index.terms.contains_key(source) {
            return InsertOutcome::Duplicate;
        }
        if let Some(path) = index.path.as_deref() {
            if let Err(e) = append_line(path, source, target) {
                warn!("Failed to append term to {}: {e}", path.display());
                return InsertOutcome::WriteFailed;
            }
        }
        index.terms.insert(
            source.to_string(),
            Entry {
                target: target.to_string(),
                folded: source.to_lowercase(),
            },
        );
        InsertOutcome::Inserted
    }
}

fn is_valid_term(source: &str, target: &str) -> bool {
    let forbidden = |s: &str| s.contains(DELIMITER) || s.contains('\n') || s.contains('\r');
    source.chars().count() >= MIN_SOURCE_CHARS
        && !target.is_empty()
        && !forbidden(source)
        && !forbidden(target)
}

fn parse_terms(content: &str) -> BTreeMap<String, Entry> {
    let mut terms = BTreeMap::new();
    for line in content.lines() {
        let Some((source, target)) = line.split_once(DELIMITER) else {
            continue;
        };
        let (source, target) = (source.trim(), target.trim());
        if source.is_empty() || target.is_empty() {
            continue;
        }
        terms.entry(source.to_string()).or_insert_with(|| Entry {
            target: target.to_string(),
            folded: source.to_lowercase(),
        });
    }
    terms
}

fn append_line(path: &Path, source: &str, target: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{source}{DELIMITER}{target}")
}

/// Format matched terms as the known-terms block, or an empty string.
pub fn format_hint_block(terms: &[(String, String)]) -> String {
    if terms.is_empty() {
        return String::new();
    }
    let mut block = String::from(KNOWN_TERMS_HEADER);
    block.push('\n');
    for (source, target) in terms {
        block.push_str(source);
        block.push_str(" = ");
        block.push_str(target);
        block.push('\n');
    }
    block
}
