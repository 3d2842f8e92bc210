//! CSV tables written next to the collection.
use crate::AnalysisError;
use crate::keywords::TweetKeywords;
use crate::patterns::{Heatmap, WEEKDAYS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const TWEETS_WITH_SENTIMENT: &str = "tweets_with_sentiment.csv";
pub const SENTIMENT_TREND: &str = "sentiment_trend.csv";
pub const TOP_KEYWORDS: &str = "top_keywords.csv";
pub const TWEETS_WITH_KEYWORDS: &str = "tweets_with_keywords.csv";
pub const KEYWORD_TWEET_COUNTS: &str = "keyword_tweet_counts.csv";
pub const ENGAGEMENT_STATS: &str = "engagement_stats.csv";
pub const TOP_TWEETS: &str = "top_tweets.csv";
pub const MONTHLY_ENGAGEMENT: &str = "monthly_engagement.csv";
pub const POSTING_FREQUENCY: &str = "posting_frequency.csv";
pub const ACTIVITY_HEATMAP: &str = "activity_heatmap.csv";

pub const KEYWORD_SEPARATOR: &str = "|";

fn write_err(path: &Path) -> impl FnOnce(csv::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn finish<W: std::io::Write>(
    mut writer: csv::Writer<W>,
    path: &Path,
) -> Result<PathBuf, AnalysisError> {
    writer
        .flush()
        .map_err(|e| write_err(path)(csv::Error::from(e)))?;
    tracing::debug!(path=%path.display(), "analysis.output.written");
    Ok(path.to_path_buf())
}

/// Column names of `T`, taken from serializing a default row.
fn header_of<T: Serialize + Default>() -> Result<csv::StringRecord, csv::Error> {
    let mut scratch = csv::Writer::from_writer(Vec::new());
    scratch.serialize(T::default())?;
    let bytes = scratch
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    Ok(reader.headers()?.clone())
}

/// Replace `path` with one row per item, header from the field names.
/// An empty table still gets its header.
pub fn write_rows<T: Serialize + Default>(
    path: &Path,
    rows: &[T],
) -> Result<PathBuf, AnalysisError> {
    let mut writer = csv::Writer::from_path(path).map_err(write_err(path))?;
    if rows.is_empty() {
        let header = header_of::<T>().map_err(write_err(path))?;
        writer.write_record(&header).map_err(write_err(path))?;
    }
    for row in rows {
        writer.serialize(row).map_err(write_err(path))?;
    }
    finish(writer, path)
}

#[derive(Default, Serialize)]
struct KeywordRow<'a> {
    id: &'a str,
    created_at: DateTime<Utc>,
    text: &'a str,
    matched_keywords: String,
}

pub fn write_tweet_keywords(
    path: &Path,
    tweets: &[TweetKeywords],
) -> Result<PathBuf, AnalysisError> {
    let rows: Vec<KeywordRow<'_>> = tweets
        .iter()
        .map(|t| KeywordRow {
            id: &t.id,
            created_at: t.created_at,
            text: &t.text,
            matched_keywords: t.matched.join(KEYWORD_SEPARATOR),
        })
        .collect();
    write_rows(path, &rows)
}

/// `weekday,0,1,...,23`, one row per weekday starting Monday.
pub fn write_heatmap(path: &Path, heatmap: &Heatmap) -> Result<PathBuf, AnalysisError> {
    let mut writer = csv::Writer::from_path(path).map_err(write_err(path))?;

    let header = std::iter::once("weekday".to_string()).chain((0..24).map(|h| h.to_string()));
    writer.write_record(header).map_err(write_err(path))?;
    for (day, label) in WEEKDAYS.iter().enumerate() {
        let row = std::iter::once(label.to_string())
            .chain(heatmap.cells[day].iter().map(|n| n.to_string()));
        writer.write_record(row).map_err(write_err(path))?;
    }
    finish(writer, path)
}
