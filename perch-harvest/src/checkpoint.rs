use chrono::{DateTime, Utc};
use perch_social::twitter::TweetRecord;
use std::collections::HashSet;

/// What a previous run left on disk for an account.
///
/// Rebuilt from the collection file on every run; there is no separate
/// cursor file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub ids: HashSet<String>,
    /// Rows read, including duplicate ids.
    pub rows: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn observe(&mut self, record: &TweetRecord) {
        self.rows += 1;
        self.ids.insert(record.id.clone());
        let ts = record.created_at;
        self.oldest = Some(self.oldest.map_or(ts, |o| o.min(ts)));
        self.newest = Some(self.newest.map_or(ts, |n| n.max(ts)));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn duplicate_rows(&self) -> usize {
        self.rows - self.ids.len()
    }
}
