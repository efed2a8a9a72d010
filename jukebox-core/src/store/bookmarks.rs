//! Per-participant bookmarks

use serde::{Deserialize, Serialize};

use super::{Records, StoreError};
use crate::room::ParticipantId;

/// A saved content id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub content_id: String,
    pub name: String,
}

#[derive(Clone)]
pub struct BookmarkStore {
    records: Records,
}

impl BookmarkStore {
    pub fn new(records: Records) -> Self {
        Self { records }
    }

    fn key(owner: &ParticipantId) -> String {
        format!("bookmarks/{}", owner)
    }

    pub fn list(&self, owner: &ParticipantId) -> Result<Vec<Bookmark>, StoreError> {
        self.records.read(&Self::key(owner))
    }

    /// Save a bookmark unless the content id is already saved
    pub fn save(&self, owner: &ParticipantId, content_id: &str, name: &str) -> Result<Vec<Bookmark>, StoreError> {
        let (list, _) = self.records.modify(&Self::key(owner), |list: &mut Vec<Bookmark>| {
            if !list.iter().any(|b| b.content_id == content_id) {
                list.push(Bookmark {
                    content_id: content_id.to_string(),
                    name: name.to_string(),
                });
            }
        })?;
        Ok(list)
    }

    pub fn delete(&self, owner: &ParticipantId, content_id: &str) -> Result<Vec<Bookmark>, StoreError> {
        let (list, _) = self.records.modify(&Self::key(owner), |list: &mut Vec<Bookmark>| {
            list.retain(|b| b.content_id != content_id);
        })?;
        Ok(list)
    }

    pub fn rename(&self, owner: &ParticipantId, content_id: &str, new_name: &str) -> Result<Vec<Bookmark>, StoreError> {
        let (list, _) = self.records.modify(&Self::key(owner), |list: &mut Vec<Bookmark>| {
            if let Some(bookmark) = list.iter_mut().find(|b| b.content_id == content_id) {
                bookmark.name = new_name.to_string();
            }
        })?;
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn store() -> BookmarkStore {
        BookmarkStore::new(Records::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn test_save_ignores_duplicates() {
        let bookmarks = store();
        let alice = ParticipantId::new("alice");

        bookmarks.save(&alice, "v1", "One").unwrap();
        let list = bookmarks.save(&alice, "v1", "Again").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "One");
    }

    #[test]
    fn test_rename_and_delete() {
        let bookmarks = store();
        let alice = ParticipantId::new("alice");
        bookmarks.save(&alice, "v1", "One").unwrap();
        bookmarks.save(&alice, "v2", "Two").unwrap();

        let list = bookmarks.rename(&alice, "v2", "Deux").unwrap();
        assert_eq!(list[1].name, "Deux");

        let list = bookmarks.delete(&alice, "v1").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].content_id, "v2");

        // Renaming something that is not saved changes nothing
        let list = bookmarks.rename(&alice, "missing", "X").unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_lists_are_per_participant() {
        let bookmarks = store();
        bookmarks.save(&ParticipantId::new("alice"), "v1", "One").unwrap();
        assert!(bookmarks.list(&ParticipantId::new("bob")).unwrap().is_empty());
    }
}
