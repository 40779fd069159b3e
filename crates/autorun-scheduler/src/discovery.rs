//! Finding automation definitions on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::definition::parse_document;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::types::Automation;

/// Directory names starting with this prefix are not descended into.
const VCS_DIR_PREFIX: &str = ".git";

/// Automations found under a set of roots, with anything that was skipped.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub automations: Vec<Automation>,
    pub diagnostics: Diagnostics,
}

/// Whether `file_name` names a definition: `automation.<ext>` or
/// `<anything>.automation.<ext>`.
pub fn is_definition_file(file_name: &str) -> bool {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if ext.is_empty() {
        return false;
    }
    stem == "automation"
        || stem
            .strip_suffix(".automation")
            .is_some_and(|prefix| !prefix.is_empty())
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with(VCS_DIR_PREFIX)
}

/// Recursively collect automations under `roots`.
///
/// Roots are walked in the given order, entries within a directory by file
/// name. When `type_filter` is non-empty, automations of other types are
/// dropped. Unreadable directories and files are skipped and recorded in
/// the returned diagnostics.
#[tracing::instrument(skip_all, fields(roots = roots.len()))]
pub fn discover(roots: &[PathBuf], type_filter: &[String]) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen_ids: HashMap<String, PathBuf> = HashMap::new();

    for root in roots {
        let root = absolute(root);
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_vcs_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    debug!(path = %path.display(), error = %e, "skipping unreadable directory");
                    discovery.diagnostics.push(Diagnostic::UnreadableDirectory {
                        path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_definition_file(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let Some(automation) = load_definition(entry.path(), &mut discovery.diagnostics) else {
                continue;
            };

            if !type_filter.is_empty() && !type_filter.iter().any(|t| *t == automation.kind) {
                debug!(id = %automation.id, kind = %automation.kind, "filtered out by type");
                continue;
            }

            if let Some(first) = seen_ids.get(&automation.id) {
                warn!(
                    id = %automation.id,
                    first = %first.display(),
                    second = %automation.source_path.display(),
                    "duplicate automation id, both definitions share one state entry"
                );
                discovery.diagnostics.push(Diagnostic::DuplicateId {
                    id: automation.id.clone(),
                    first: first.clone(),
                    second: automation.source_path.clone(),
                });
            }
            seen_ids.insert(automation.id.clone(), automation.source_path.clone());

            discovery.automations.push(automation);
        }
    }

    debug!(
        count = discovery.automations.len(),
        skipped = discovery.diagnostics.len(),
        "discovery finished"
    );
    discovery
}

/// Read and parse one definition file.
pub fn load_definition(path: &Path, diagnostics: &mut Diagnostics) -> Option<Automation> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unreadable definition");
            diagnostics.push(Diagnostic::UnreadableFile {
                path: path.to_path_buf(),
                error: e.to_string(),
            });
            return None;
        }
    };

    let parsed = parse_document(&text);
    for ignored in parsed.ignored {
        diagnostics.push(Diagnostic::IgnoredLine {
            path: path.to_path_buf(),
            line: ignored.line,
            text: ignored.text,
        });
    }

    Some(Automation::from_definition(&absolute(path), parsed.fields))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_file_names() {
        assert!(is_definition_file("automation.toml"));
        assert!(is_definition_file("automation.conf"));
        assert!(is_definition_file("nightly.automation.toml"));
        assert!(is_definition_file("a.b.automation.toml"));

        assert!(!is_definition_file("automation"));
        assert!(!is_definition_file("automation."));
        assert!(!is_definition_file(".automation.toml"));
        assert!(!is_definition_file("myautomation.toml"));
        assert!(!is_definition_file("automation.toml.bak.txt"));
        assert!(!is_definition_file("README.md"));
    }
}
