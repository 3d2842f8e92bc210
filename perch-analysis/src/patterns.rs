use crate::month_key;
use chrono::{Datelike, Timelike};
use perch_social::twitter::TweetRecord;
use serde::Serialize;
use std::collections::BTreeMap;

pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub tweets: usize,
}

/// Tweet counts by weekday (Monday first) and UTC hour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heatmap {
    pub cells: [[usize; 24]; 7],
}

impl Heatmap {
    pub fn get(&self, weekday: usize, hour: usize) -> usize {
        self.cells[weekday][hour]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostingSummary {
    pub total: usize,
    pub months: usize,
    pub avg_per_month: f64,
    /// Earliest month among those with the most tweets.
    pub most_active: Option<MonthCount>,
}

pub fn posting_frequency(records: &[TweetRecord]) -> Vec<MonthCount> {
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for r in records {
        *months.entry(month_key(r.created_at)).or_insert(0) += 1;
    }
    months
        .into_iter()
        .map(|(month, tweets)| MonthCount { month, tweets })
        .collect()
}

pub fn activity_heatmap(records: &[TweetRecord]) -> Heatmap {
    let mut heatmap = Heatmap::default();
    for r in records {
        let day = r.created_at.weekday().num_days_from_monday() as usize;
        let hour = r.created_at.hour() as usize;
        heatmap.cells[day][hour] += 1;
    }
    heatmap
}

pub fn posting_summary(total: usize, frequency: &[MonthCount]) -> PostingSummary {
    let most_active = frequency
        .iter()
        .fold(None::<&MonthCount>, |best, m| match best {
            Some(b) if b.tweets >= m.tweets => Some(b),
            _ => Some(m),
        })
        .cloned();
    PostingSummary {
        total,
        months: frequency.len(),
        avg_per_month: total as f64 / frequency.len().max(1) as f64,
        most_active,
    }
}
