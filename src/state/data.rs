/// Shared data structures for the catalog
///
/// These structs represent the data model that flows between
/// the record store, the asset pipeline and the front end.
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Represents a single entry in the catalog.
///
/// Field names match the exchange format used by export/import.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unique key
    pub title: String,
    pub description: String,
    /// Poster image; empty when the entry has none
    pub poster_path: String,
    /// Screenshot images, in display order
    pub screenshots_paths: Vec<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// ISO-8601 local timestamp of creation
    #[serde(default = "now_iso")]
    pub added_date: String,
}

impl Entry {
    /// Poster (if any) followed by every non-empty screenshot
    pub fn asset_paths(&self) -> Vec<PathBuf> {
        std::iter::once(&self.poster_path)
            .chain(self.screenshots_paths.iter())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// What the user typed into the add/edit form, before assets are copied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub title: String,
    pub description: String,
    pub poster_path: String,
    pub screenshots_paths: Vec<String>,
    pub tags: Vec<String>,
}

impl EntryDraft {
    pub fn new(title: impl Into<String>) -> Self {
        EntryDraft {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn poster(mut self, path: impl Into<String>) -> Self {
        self.poster_path = path.into();
        self
    }

    pub fn screenshots<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.screenshots_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Trimmed title, blank screenshot and tag values dropped
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.poster_path = self.poster_path.trim().to_string();
        self.screenshots_paths = clean_list(self.screenshots_paths);
        self.tags = clean_list(self.tags);
        self
    }

    /// Stamp the draft with the current time
    pub fn into_entry(self) -> Entry {
        Entry {
            title: self.title,
            description: self.description,
            poster_path: self.poster_path,
            screenshots_paths: self.screenshots_paths,
            tags: self.tags,
            added_date: now_iso(),
        }
    }
}

/// Fields to change on an existing entry; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub poster_path: Option<String>,
    pub screenshots_paths: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl EntryPatch {
    /// A patch that replaces every editable field with the draft's
    pub fn from_draft(draft: EntryDraft) -> Self {
        EntryPatch {
            title: Some(draft.title),
            description: Some(draft.description),
            poster_path: Some(draft.poster_path),
            screenshots_paths: Some(draft.screenshots_paths),
            tags: Some(draft.tags),
        }
    }

    pub fn tags_only(tags: Vec<String>) -> Self {
        EntryPatch {
            tags: Some(tags),
            ..Default::default()
        }
    }

    pub fn apply(self, entry: &mut Entry) {
        if let Some(title) = self.title {
            entry.title = title;
        }
        if let Some(description) = self.description {
            entry.description = description;
        }
        if let Some(poster) = self.poster_path {
            entry.poster_path = poster;
        }
        if let Some(screens) = self.screenshots_paths {
            entry.screenshots_paths = screens;
        }
        if let Some(tags) = self.tags {
            entry.tags = tags;
        }
    }
}

/// Split a comma separated form field into trimmed, non-empty values
pub fn split_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(str::to_string))
}

fn clean_list(values: impl IntoIterator<Item = String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Local time in ISO-8601 with microseconds, e.g. `2024-03-01T18:22:05.123456`
pub fn now_iso() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_paths_skip_empty_poster() {
        let entry = EntryDraft::new("A")
            .screenshots(["/s/1.png", "", "/s/2.png"])
            .into_entry();
        assert_eq!(
            entry.asset_paths(),
            vec![PathBuf::from("/s/1.png"), PathBuf::from("/s/2.png")]
        );
    }

    #[test]
    fn normalized_trims_and_drops_blanks() {
        let draft = EntryDraft::new("  Title ")
            .poster(" /p.png ")
            .screenshots([" a ", "", "  "])
            .tags(["x", " ", " y"])
            .normalized();
        assert_eq!(draft.title, "Title");
        assert_eq!(draft.poster_path, "/p.png");
        assert_eq!(draft.screenshots_paths, vec!["a"]);
        assert_eq!(draft.tags, vec!["x", "y"]);
    }

    #[test]
    fn split_list_parses_form_input() {
        assert_eq!(split_list("drama, action ,,comedy"), vec!["drama", "action", "comedy"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut entry = EntryDraft::new("A").description("d").tags(["x"]).into_entry();
        EntryPatch::tags_only(vec!["y".into()]).apply(&mut entry);
        assert_eq!(entry.description, "d");
        assert_eq!(entry.tags, vec!["y"]);
    }

    #[test]
    fn iso_timestamp_shape() {
        let stamp = now_iso();
        assert_eq!(stamp.len(), "2024-03-01T18:22:05.123456".len());
        assert_eq!(&stamp[10..11], "T");
    }
}
