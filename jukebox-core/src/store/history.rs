//! Play history

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Records, StoreError};

/// Key holding the global history list
pub const HISTORY_KEY: &str = "history";

/// A previously played item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub content_id: String,
    pub display_name: String,
}

/// Everything ever played, in order of first play, one entry per content id
#[derive(Clone)]
pub struct HistoryStore {
    records: Records,
}

impl HistoryStore {
    pub fn new(records: Records) -> Self {
        Self { records }
    }

    pub fn entries(&self) -> Result<Vec<HistoryItem>, StoreError> {
        self.records.read(HISTORY_KEY)
    }

    /// Record a play.
    ///
    /// Returns false if the content id was already known; its stored name is
    /// left as first seen.
    pub fn record(&self, content_id: &str, display_name: &str) -> Result<bool, StoreError> {
        let (_, added) = self.records.modify(HISTORY_KEY, |history: &mut Vec<HistoryItem>| {
            if history.iter().any(|h| h.content_id == content_id) {
                return false;
            }
            history.push(HistoryItem {
                content_id: content_id.to_string(),
                display_name: display_name.to_string(),
            });
            true
        })?;

        if added {
            debug!("History: added {}", content_id);
        }
        Ok(added)
    }
}
