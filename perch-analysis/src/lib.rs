//! Offline reports over a harvested collection.
//!
//! [`Analyzer::run`] loads `<data_dir>/<account>/tweets.csv` and writes every
//! derived table next to it, plus PNG charts under `charts/`. The
//! individual passes live in their own modules and work on plain
//! `&[TweetRecord]` slices.
pub mod charts;
pub mod engagement;
pub mod keywords;
pub mod output;
pub mod patterns;
pub mod sentiment;
pub mod text;

use chrono::{DateTime, Utc};
use perch_common::Account;
use perch_harvest::{StoreError, TweetStore};
use std::fs;
use std::path::PathBuf;

pub use charts::ChartError;
pub use keywords::Segmenter;
pub use sentiment::{LexiconScorer, SentimentScorer};
pub use text::TextCleaner;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("invalid text pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Calendar month bucket, `YYYY-MM` in UTC.
pub fn month_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

/// What one analysis run produced.
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub account: Account,
    pub tweets: usize,
    pub avg_sentiment: f64,
    pub posting: patterns::PostingSummary,
    pub top_keywords: Vec<keywords::KeywordCount>,
    pub written: Vec<PathBuf>,
}

pub struct Analyzer {
    store: TweetStore,
    cleaner: TextCleaner,
    segmenter: Segmenter,
    scorer: Box<dyn SentimentScorer>,
    top_keywords: usize,
    charts: bool,
}

impl Analyzer {
    pub fn new(store: TweetStore) -> Result<Self, AnalysisError> {
        Ok(Self {
            store,
            cleaner: TextCleaner::new()?,
            segmenter: Segmenter::new(),
            scorer: Box::new(LexiconScorer::default()),
            top_keywords: keywords::DEFAULT_TOP_KEYWORDS,
            charts: true,
        })
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SentimentScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_top_keywords(mut self, n: usize) -> Self {
        self.top_keywords = n;
        self
    }

    pub fn with_charts(mut self, enabled: bool) -> Self {
        self.charts = enabled;
        self
    }

    pub fn run(&self, account: &Account) -> Result<AnalysisSummary, AnalysisError> {
        let records = self.store.load_records(account)?;
        let dir = self.store.account_dir(account);
        tracing::info!(account=%account, tweets=records.len(), "analysis.start");

        let mut written = Vec::new();

        let scored = sentiment::score_tweets(&records, self.scorer.as_ref(), &self.cleaner);
        let avg_sentiment = sentiment::average(&scored);
        written.push(output::write_rows(
            &dir.join(output::TWEETS_WITH_SENTIMENT),
            &scored,
        )?);
        let trend = sentiment::sentiment_trend(&scored);
        written.push(output::write_rows(&dir.join(output::SENTIMENT_TREND), &trend)?);
        tracing::info!(account=%account, avg_sentiment, "analysis.sentiment");

        let kw = keywords::analyze_keywords(
            &records,
            &self.cleaner,
            &self.segmenter,
            self.top_keywords,
        );
        written.push(output::write_rows(&dir.join(output::TOP_KEYWORDS), &kw.top)?);
        written.push(output::write_tweet_keywords(
            &dir.join(output::TWEETS_WITH_KEYWORDS),
            &kw.tweets,
        )?);
        written.push(output::write_rows(
            &dir.join(output::KEYWORD_TWEET_COUNTS),
            &kw.tweet_counts,
        )?);
        tracing::info!(
            account=%account,
            keywords=kw.top.len(),
            top=?kw.top.iter().take(10).map(|k| k.keyword.as_str()).collect::<Vec<_>>(),
            "analysis.keywords"
        );

        written.push(output::write_rows(
            &dir.join(output::ENGAGEMENT_STATS),
            &engagement::engagement_stats(&records),
        )?);
        written.push(output::write_rows(
            &dir.join(output::TOP_TWEETS),
            &engagement::top_tweets(&records, engagement::TOP_TWEETS),
        )?);
        let monthly = engagement::monthly_engagement(&records);
        written.push(output::write_rows(&dir.join(output::MONTHLY_ENGAGEMENT), &monthly)?);

        let frequency = patterns::posting_frequency(&records);
        written.push(output::write_rows(
            &dir.join(output::POSTING_FREQUENCY),
            &frequency,
        )?);
        let heatmap = patterns::activity_heatmap(&records);
        written.push(output::write_heatmap(&dir.join(output::ACTIVITY_HEATMAP), &heatmap)?);
        let posting = patterns::posting_summary(records.len(), &frequency);
        tracing::info!(
            account=%account,
            total=posting.total,
            avg_per_month=posting.avg_per_month,
            most_active=?posting.most_active.as_ref().map(|m| m.month.as_str()),
            "analysis.posting"
        );

        if self.charts {
            let charts_dir = dir.join(charts::CHARTS_DIR);
            fs::create_dir_all(&charts_dir).map_err(|source| AnalysisError::Io {
                path: charts_dir.clone(),
                source,
            })?;
            written.push(charts::sentiment_trend(
                &charts_dir.join(charts::SENTIMENT_TREND_PNG),
                &trend,
            )?);
            written.push(charts::top_keywords(
                &charts_dir.join(charts::TOP_KEYWORDS_PNG),
                &kw.top,
            )?);
            written.push(charts::engagement_trend(
                &charts_dir.join(charts::ENGAGEMENT_TREND_PNG),
                &monthly,
            )?);
            written.push(charts::posting_frequency(
                &charts_dir.join(charts::POSTING_FREQUENCY_PNG),
                &frequency,
            )?);
            written.push(charts::activity_heatmap(
                &charts_dir.join(charts::ACTIVITY_HEATMAP_PNG),
                &heatmap,
            )?);
            tracing::info!(account=%account, dir=%charts_dir.display(), "analysis.charts");
        }

        tracing::info!(account=%account, files=written.len(), dir=%dir.display(), "analysis.done");
        Ok(AnalysisSummary {
            account: account.clone(),
            tweets: records.len(),
            avg_sentiment,
            posting,
            top_keywords: kw.top,
            written,
        })
    }
}
