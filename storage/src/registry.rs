//! NIM image registry backed by a line-oriented text file

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Registry file used when no path is configured
pub const DEFAULT_REGISTRY_PATH: &str = "nim_list.txt";

const SEPARATOR: char = '|';

/// Model identifier served by an image
///
/// The digest and tag are dropped and the namespace segment is kept:
/// `nvcr.io/nim/meta/llama3-8b-instruct:latest` serves
/// `meta/llama3-8b-instruct`.
pub fn derive_model_id(image: &str) -> String {
    let image = image.trim();
    let without_digest = image.split('@').next().unwrap_or(image);

    let mut segments = without_digest.rsplit('/');
    let last = segments.next().unwrap_or_default();
    let model = match last.rfind(':') {
        Some(pos) => &last[..pos],
        None => last,
    };

    match segments.next() {
        Some(namespace) if !namespace.is_empty() => format!("{namespace}/{model}"),
        _ => model.to_string(),
    }
}

/// One registered image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NimEntry {
    /// Name shown in menus, stored verbatim
    pub name: String,
    /// Full image reference passed to the container runtime
    pub image: String,
}

impl NimEntry {
    /// Create an entry, trimming both fields
    pub fn new(name: impl AsRef<str>, image: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            image: image.as_ref().trim().to_string(),
        }
    }

    /// Model identifier sent in benchmark requests
    pub fn model_id(&self) -> String {
        derive_model_id(&self.image)
    }

    /// Name to show; falls back to the model id when none was stored
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.model_id()
        } else {
            self.name.clone()
        }
    }

    fn to_line(&self) -> String {
        format!("{}{SEPARATOR}{}", self.name, self.image)
    }
}

impl fmt::Display for NimEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.image)
    }
}

/// Result of [`NimRegistry::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was appended
    Added,
    /// The image was already registered; its name was replaced
    Updated,
}

/// Ordered list of registered images with its backing file
#[derive(Debug, Clone)]
pub struct NimRegistry {
    path: PathBuf,
    entries: Vec<NimEntry>,
}

impl NimRegistry {
    /// Load the registry at `path`; a missing file is an empty registry
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No registry file yet");
                Vec::new()
            }
            Err(e) => return Err(StoreError::io("read", &path, e)),
        };
        tracing::debug!(path = %path.display(), count = entries.len(), "Loaded NIM registry");
        Ok(Self { path, entries })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order
    pub fn entries(&self) -> &[NimEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no image is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a 1-based menu position
    pub fn get(&self, position: usize) -> Option<&NimEntry> {
        position.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Resolve a 1-based position, display name, model id or image reference
    pub fn find(&self, query: &str) -> StoreResult<&NimEntry> {
        let query = query.trim();
        if let Ok(position) = query.parse::<usize>() {
            if let Some(entry) = self.get(position) {
                return Ok(entry);
            }
        }
        self.entries
            .iter()
            .find(|e| e.name == query || e.image == query)
            .or_else(|| self.entries.iter().find(|e| e.model_id() == query))
            .ok_or_else(|| StoreError::NotFound(query.to_string()))
    }

    /// Register an image and persist the registry
    ///
    /// Images are unique: adding a known image replaces its display name.
    pub fn add(&mut self, name: &str, image: &str) -> StoreResult<AddOutcome> {
        let entry = NimEntry::new(name, image);
        if entry.image.is_empty() {
            return Err(StoreError::invalid("image", "image reference is required"));
        }
        if entry.name.contains(SEPARATOR) || entry.image.contains(SEPARATOR) {
            return Err(StoreError::invalid(
                "entry",
                format!("'{SEPARATOR}' is reserved as the field separator"),
            ));
        }
        if entry.name.contains('\n') {
            return Err(StoreError::invalid("name", "must be a single line"));
        }

        let outcome = match self.entries.iter_mut().find(|e| e.image == entry.image) {
            Some(existing) => {
                existing.name = entry.name;
                AddOutcome::Updated
            }
            None => {
                self.entries.push(entry);
                AddOutcome::Added
            }
        };
        self.save()?;
        Ok(outcome)
    }

    /// Write all entries to the backing file
    pub fn save(&self) -> StoreResult<()> {
        let mut contents: String = self
            .entries
            .iter()
            .map(NimEntry::to_line)
            .collect::<Vec<_>>()
            .join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io("create", parent, e))?;
        }
        std::fs::write(&self.path, contents).map_err(|e| StoreError::io("write", &self.path, e))
    }
}

fn parse(contents: &str) -> Vec<NimEntry> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.trim();
            let (name, image) = line.split_once(SEPARATOR)?;
            if image.contains(SEPARATOR) {
                tracing::warn!(line = i + 1, "Skipping registry line with extra '|'");
                return None;
            }
            let entry = NimEntry::new(name, image);
            if entry.image.is_empty() {
                tracing::warn!(line = i + 1, "Skipping registry line without an image");
                return None;
            }
            Some(entry)
        })
        .collect()
}
