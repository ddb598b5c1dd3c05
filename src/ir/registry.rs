//! Label and citation registries.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ir::node::{LabelKind, NodeId};
use crate::origin::Origin;

/// A declared `\label` and the node it attached to.
#[derive(Debug, Clone)]
pub struct LabelEntry {
    pub node: NodeId,
    /// Assigned number of the owning node ("2.3"), if it was numbered.
    pub number: Option<String>,
    pub kind: LabelKind,
    /// Where the `\label` command appeared, for duplicate reporting.
    pub origin: Origin,
}

/// Mapping from label key to its declaration.
///
/// Keys are immutable once declared: inserting the same key twice is a
/// fatal [`Error::DuplicateLabel`], never a silent overwrite.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    entries: HashMap<String, LabelEntry>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a label. Fails if the key already exists.
    pub fn declare(&mut self, key: &str, entry: LabelEntry) -> Result<()> {
        if let Some(existing) = self.entries.get(key) {
            return Err(Error::DuplicateLabel {
                key: key.to_string(),
                origin: entry.origin,
                first: existing.origin.clone(),
            });
        }
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&LabelEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A parsed bibliography entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BibEntry {
    /// Entry type without the `@` ("article", "book", ...), lowercased.
    pub entry_type: String,
    pub key: String,
    /// Field name (lowercased) → value with outer braces/quotes stripped.
    pub fields: HashMap<String, String>,
    /// The raw entry text as it appeared in the source.
    pub raw: String,
}

impl BibEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn author(&self) -> Option<&str> {
        self.field("author")
    }

    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }

    pub fn year(&self) -> Option<&str> {
        self.field("year")
    }

    /// Journal or booktitle, whichever is present.
    pub fn venue(&self) -> Option<&str> {
        self.field("journal").or_else(|| self.field("booktitle"))
    }
}

/// Mapping from citation key to bibliography entry.
///
/// Built once by the bibliography parser, read-only thereafter. Insertion
/// order is preserved for deterministic rendering of the references list.
#[derive(Debug, Clone, Default)]
pub struct CitationRegistry {
    entries: HashMap<String, BibEntry>,
    order: Vec<String>,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Returns the previous entry if the key was already
    /// present (last-seen wins; the caller emits the warning).
    pub fn insert(&mut self, entry: BibEntry) -> Option<BibEntry> {
        let key = entry.key.clone();
        let previous = self.entries.insert(key.clone(), entry);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &BibEntry> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    /// Zero-based position of a key in first-seen order. Stable across
    /// re-definitions, so citation markers stay consistent.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LabelEntry {
        LabelEntry {
            node: NodeId(1),
            number: Some("1.1".into()),
            kind: LabelKind::Environment,
            origin: Origin::unknown(),
        }
    }

    #[test]
    fn duplicate_label_is_fatal() {
        let mut reg = LabelRegistry::new();
        reg.declare("thm:main", entry()).unwrap();
        let err = reg.declare("thm:main", entry()).unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn citation_last_seen_wins() {
        let mut reg = CitationRegistry::new();
        let mut first = BibEntry {
            entry_type: "book".into(),
            key: "knuth84".into(),
            fields: HashMap::new(),
            raw: String::new(),
        };
        first.fields.insert("year".into(), "1984".into());
        let mut second = first.clone();
        second.fields.insert("year".into(), "1986".into());

        assert!(reg.insert(first).is_none());
        assert!(reg.insert(second).is_some());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("knuth84").unwrap().year(), Some("1986"));
    }
}
