//! Structured record of things discovery skipped.
//!
//! Discovery and parsing are lenient: unreadable directories, unreadable
//! files and malformed lines never abort a scan. Callers that want to know
//! what was skipped can inspect the [`Diagnostics`] returned alongside the
//! results.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A directory could not be listed.
    UnreadableDirectory { path: PathBuf, error: String },
    /// A definition file could not be read.
    UnreadableFile { path: PathBuf, error: String },
    /// A definition line was neither a section header nor `key = value`.
    IgnoredLine {
        path: PathBuf,
        line: usize,
        text: String,
    },
    /// Two definitions share an id and therefore a state entry.
    DuplicateId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnreadableDirectory { path, error } => {
                write!(f, "skipped unreadable directory {}: {}", path.display(), error)
            }
            Diagnostic::UnreadableFile { path, error } => {
                write!(f, "skipped unreadable definition {}: {}", path.display(), error)
            }
            Diagnostic::IgnoredLine { path, line, text } => {
                write!(f, "{}:{}: ignored line {:?}", path.display(), line, text)
            }
            Diagnostic::DuplicateId { id, first, second } => write!(
                f,
                "automation id {:?} defined by both {} and {}",
                id,
                first.display(),
                second.display()
            ),
        }
    }
}

/// An ordered collection of [`Diagnostic`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids reported as duplicates, in report order.
    pub fn duplicate_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|d| match d {
            Diagnostic::DuplicateId { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
