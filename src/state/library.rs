use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::data::{Entry, EntryPatch};
use crate::error::StoreError;

/// How browse results are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Title A-Z, case-insensitive
    #[default]
    TitleAsc,
    /// Title Z-A
    TitleDesc,
    /// Newest first
    DateAdded,
}

/// Filters applied when browsing the collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseQuery {
    /// Case-insensitive text matched against title, description and tags
    pub text: String,
    /// Entry must carry at least one of these; empty means no tag filter
    pub tags: Vec<String>,
    pub sort: SortOrder,
}

/// The Library is the catalog's record store: a JSON document holding every
/// entry, keyed by title.
///
/// The document is a plain array of entries and is rewritten after each
/// change.
pub struct Library {
    entries: Vec<Entry>,
    db_path: PathBuf,
}

impl Library {
    /// Open the catalog at `path`, starting empty if the file doesn't exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = path.into();

        let entries = match fs::read_to_string(&db_path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(&db_path, e)),
        };

        tracing::info!("📁 Catalog opened at: {} ({} entries)", db_path.display(), entries.len());
        Ok(Library { entries, db_path })
    }

    /// Get the path to the catalog file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, in insertion order
    pub fn all(&self) -> &[Entry] {
        &self.entries
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.title == title)
    }

    /// Add a new entry. Titles must be non-empty and unique.
    pub fn add(&mut self, entry: Entry) -> Result<(), StoreError> {
        if entry.title.trim().is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        if self.find_by_title(&entry.title).is_some() {
            return Err(StoreError::DuplicateTitle(entry.title));
        }

        self.entries.push(entry);
        self.save()
    }

    /// Change fields of the entry titled `title`; returns the updated entry
    pub fn update(&mut self, title: &str, patch: EntryPatch) -> Result<Entry, StoreError> {
        let index = self.index_of(title)?;

        if let Some(new_title) = &patch.title {
            if new_title.trim().is_empty() {
                return Err(StoreError::EmptyTitle);
            }
            if new_title != title && self.find_by_title(new_title).is_some() {
                return Err(StoreError::DuplicateTitle(new_title.clone()));
            }
        }

        patch.apply(&mut self.entries[index]);
        let updated = self.entries[index].clone();
        self.save()?;
        Ok(updated)
    }

    /// Remove the entry titled `title` and hand it back
    pub fn delete(&mut self, title: &str) -> Result<Entry, StoreError> {
        let index = self.index_of(title)?;
        let removed = self.entries.remove(index);
        self.save()?;
        Ok(removed)
    }

    /// Set the same tags on several entries at once.
    /// Unknown titles are skipped; returns how many entries changed.
    pub fn set_tags(&mut self, titles: &[String], tags: &[String]) -> Result<usize, StoreError> {
        let mut changed = 0;
        for entry in self.entries.iter_mut() {
            if titles.contains(&entry.title) {
                entry.tags = tags.to_vec();
                changed += 1;
            }
        }
        if changed > 0 {
            self.save()?;
        }
        Ok(changed)
    }

    /// Every distinct tag, sorted
    pub fn tags(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Entries whose title, description or any tag contains `query`
    pub fn search(&self, query: &str) -> Vec<&Entry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| matches_text(e, &query))
            .collect()
    }

    /// Entries carrying `tag`
    pub fn with_tag(&self, tag: &str) -> Vec<&Entry> {
        self.entries.iter().filter(|e| e.has_tag(tag)).collect()
    }

    /// The whole collection, ordered
    pub fn sorted(&self, order: SortOrder) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.iter().collect();
        match order {
            SortOrder::TitleAsc => entries.sort_by_key(|e| e.title.to_lowercase()),
            SortOrder::TitleDesc => {
                entries.sort_by_key(|e| e.title.to_lowercase());
                entries.reverse();
            }
            SortOrder::DateAdded => {
                entries.sort_by(|a, b| b.added_date.cmp(&a.added_date));
            }
        }
        entries
    }

    /// Sort, then filter by text, then by tags
    pub fn browse(&self, query: &BrowseQuery) -> Vec<&Entry> {
        let text = query.text.to_lowercase();
        self.sorted(query.sort)
            .into_iter()
            .filter(|e| text.is_empty() || matches_text(e, &text))
            .filter(|e| query.tags.is_empty() || query.tags.iter().any(|t| e.has_tag(t)))
            .collect()
    }

    /// Copies of the selected entries, or of everything when `titles` is `None`
    pub fn export(&self, titles: Option<&[String]>) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| titles.map_or(true, |t| t.contains(&e.title)))
            .cloned()
            .collect()
    }

    /// Throw away the current collection and keep `entries` instead
    pub(crate) fn replace_all(&mut self, entries: Vec<Entry>) -> Result<(), StoreError> {
        self.entries = entries;
        self.save()
    }

    /// Write the document atomically next to its final location
    fn save(&self) -> Result<(), StoreError> {
        let dir = match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let json = serde_json::to_vec_pretty(&self.entries)?;
        let mut staged =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        staged
            .write_all(&json)
            .map_err(|e| StoreError::io(staged.path(), e))?;
        staged
            .persist(&self.db_path)
            .map_err(|e| StoreError::io(&self.db_path, e.error))?;
        Ok(())
    }

    fn index_of(&self, title: &str) -> Result<usize, StoreError> {
        self.entries
            .iter()
            .position(|e| e.title == title)
            .ok_or_else(|| StoreError::NotFound(title.to_string()))
    }
}

fn matches_text(entry: &Entry, query_lower: &str) -> bool {
    entry.title.to_lowercase().contains(query_lower)
        || entry.description.to_lowercase().contains(query_lower)
        || entry
            .tags
            .iter()
            .any(|t| t.to_lowercase().contains(query_lower))
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::EntryDraft;

    fn entry(title: &str, date: &str, tags: &[&str]) -> Entry {
        let mut e = EntryDraft::new(title)
            .description(format!("about {}", title))
            .tags(tags.iter().copied())
            .into_entry();
        e.added_date = date.to_string();
        e
    }

    fn library(temp: &tempfile::TempDir) -> Library {
        let mut lib = Library::open(temp.path().join("catalog.json")).unwrap();
        lib.add(entry("bravo", "2024-01-02T00:00:00.000000", &["drama"])).unwrap();
        lib.add(entry("Alpha", "2024-01-03T00:00:00.000000", &["action", "drama"])).unwrap();
        lib.add(entry("charlie", "2024-01-01T00:00:00.000000", &["Comedy"])).unwrap();
        lib
    }

    fn titles(entries: &[&Entry]) -> Vec<String> {
        entries.iter().map(|e| e.title.clone()).collect()
    }

    #[test]
    fn entries_survive_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let lib = library(&temp);
        let reopened = Library::open(lib.path()).unwrap();
        assert_eq!(reopened.all(), lib.all());
    }

    #[test]
    fn titles_are_unique_and_required() {
        let temp = tempfile::tempdir().unwrap();
        let mut lib = library(&temp);
        assert!(matches!(
            lib.add(entry("bravo", "x", &[])),
            Err(StoreError::DuplicateTitle(_))
        ));
        assert!(matches!(lib.add(entry("  ", "x", &[])), Err(StoreError::EmptyTitle)));
        assert_eq!(lib.len(), 3);
    }

    #[test]
    fn update_and_rename() {
        let temp = tempfile::tempdir().unwrap();
        let mut lib = library(&temp);

        let patch = EntryPatch {
            title: Some("delta".into()),
            description: Some("renamed".into()),
            ..Default::default()
        };
        let updated = lib.update("bravo", patch).unwrap();
        assert_eq!(updated.title, "delta");
        assert_eq!(updated.tags, vec!["drama"]);
        assert!(lib.find_by_title("bravo").is_none());

        let clash = EntryPatch {
            title: Some("Alpha".into()),
            ..Default::default()
        };
        assert!(matches!(lib.update("delta", clash), Err(StoreError::DuplicateTitle(_))));
        assert!(matches!(
            lib.update("nobody", EntryPatch::default()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_returns_removed_entry() {
        let temp = tempfile::tempdir().unwrap();
        let mut lib = library(&temp);
        let removed = lib.delete("charlie").unwrap();
        assert_eq!(removed.title, "charlie");
        assert_eq!(lib.len(), 2);
        assert!(matches!(lib.delete("charlie"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn tags_are_sorted_and_unique() {
        let temp = tempfile::tempdir().unwrap();
        let lib = library(&temp);
        assert_eq!(lib.tags(), vec!["Comedy", "action", "drama"]);
    }

    #[test]
    fn search_is_case_insensitive_over_fields() {
        let temp = tempfile::tempdir().unwrap();
        let lib = library(&temp);
        assert_eq!(titles(&lib.search("ALPHA")), vec!["Alpha"]);
        assert_eq!(titles(&lib.search("comedy")), vec!["charlie"]);
        assert_eq!(titles(&lib.search("about b")), vec!["bravo"]);
    }

    #[test]
    fn sorting_orders() {
        let temp = tempfile::tempdir().unwrap();
        let lib = library(&temp);
        assert_eq!(titles(&lib.sorted(SortOrder::TitleAsc)), vec!["Alpha", "bravo", "charlie"]);
        assert_eq!(titles(&lib.sorted(SortOrder::TitleDesc)), vec!["charlie", "bravo", "Alpha"]);
        assert_eq!(titles(&lib.sorted(SortOrder::DateAdded)), vec!["Alpha", "bravo", "charlie"]);
    }

    #[test]
    fn browse_combines_sort_text_and_tags() {
        let temp = tempfile::tempdir().unwrap();
        let lib = library(&temp);

        let query = BrowseQuery {
            text: String::new(),
            tags: vec!["drama".into()],
            sort: SortOrder::TitleDesc,
        };
        assert_eq!(titles(&lib.browse(&query)), vec!["bravo", "Alpha"]);

        let query = BrowseQuery {
            text: "about".into(),
            tags: vec!["Comedy".into(), "action".into()],
            sort: SortOrder::TitleAsc,
        };
        assert_eq!(titles(&lib.browse(&query)), vec!["Alpha", "charlie"]);
        assert_eq!(titles(&lib.with_tag("drama")), vec!["bravo", "Alpha"]);
    }

    #[test]
    fn bulk_tag_edit() {
        let temp = tempfile::tempdir().unwrap();
        let mut lib = library(&temp);
        let changed = lib
            .set_tags(&["bravo".into(), "charlie".into(), "ghost".into()], &["seen".into()])
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(lib.tags(), vec!["action", "drama", "seen"]);
    }

    #[test]
    fn export_selection() {
        let temp = tempfile::tempdir().unwrap();
        let lib = library(&temp);
        assert_eq!(lib.export(None).len(), 3);
        let picked = lib.export(Some(&["charlie".to_string()]));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].title, "charlie");
    }
}
