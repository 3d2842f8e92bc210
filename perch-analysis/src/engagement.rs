use crate::month_key;
use chrono::{DateTime, Utc};
use perch_social::twitter::TweetRecord;
use serde::Serialize;
use std::collections::BTreeMap;

pub const TOP_TWEETS: usize = 10;
const TOP_TWEET_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MetricStats {
    pub metric: &'static str,
    pub mean: f64,
    pub median: f64,
    pub max: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TopTweet {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub view_count: u64,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub total_engagement: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MonthlyEngagement {
    pub month: String,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_reposts: f64,
}

const METRICS: [(&str, fn(&TweetRecord) -> u64); 6] = [
    ("views", |r| r.view_count),
    ("likes", |r| r.like_count),
    ("reposts", |r| r.repost_count),
    ("replies", |r| r.reply_count),
    ("quotes", |r| r.quote_count),
    ("bookmarks", |r| r.bookmark_count),
];

fn stats(metric: &'static str, mut values: Vec<u64>) -> MetricStats {
    if values.is_empty() {
        return MetricStats {
            metric,
            mean: 0.0,
            median: 0.0,
            max: 0,
            total: 0,
        };
    }
    values.sort_unstable();
    let n = values.len();
    let total: u64 = values.iter().sum();
    let median = if n % 2 == 1 {
        values[n / 2] as f64
    } else {
        (values[n / 2 - 1] as f64 + values[n / 2] as f64) / 2.0
    };
    MetricStats {
        metric,
        mean: total as f64 / n as f64,
        median,
        max: values[n - 1],
        total,
    }
}

/// Mean, median, max and total for each counter.
pub fn engagement_stats(records: &[TweetRecord]) -> Vec<MetricStats> {
    METRICS
        .iter()
        .map(|(name, get)| stats(*name, records.iter().map(*get).collect()))
        .collect()
}

/// The `n` tweets with the highest likes + reposts + replies + quotes.
/// Equal scores keep collection order.
pub fn top_tweets(records: &[TweetRecord], n: usize) -> Vec<TopTweet> {
    let mut ranked: Vec<&TweetRecord> = records.iter().collect();
    ranked.sort_by(|a, b| b.engagement().cmp(&a.engagement()));
    ranked
        .into_iter()
        .take(n)
        .map(|r| TopTweet {
            id: r.id.clone(),
            created_at: r.created_at,
            text: r.text.chars().take(TOP_TWEET_TEXT_CHARS).collect(),
            view_count: r.view_count,
            like_count: r.like_count,
            repost_count: r.repost_count,
            reply_count: r.reply_count,
            total_engagement: r.engagement(),
        })
        .collect()
}

pub fn monthly_engagement(records: &[TweetRecord]) -> Vec<MonthlyEngagement> {
    let mut months: BTreeMap<String, (u64, u64, u64, u64)> = BTreeMap::new();
    for r in records {
        let entry = months.entry(month_key(r.created_at)).or_default();
        entry.0 += 1;
        entry.1 += r.view_count;
        entry.2 += r.like_count;
        entry.3 += r.repost_count;
    }
    months
        .into_iter()
        .map(|(month, (n, views, likes, reposts))| {
            let n = n as f64;
            MonthlyEngagement {
                month,
                avg_views: views as f64 / n,
                avg_likes: likes as f64 / n,
                avg_reposts: reposts as f64 / n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(id: &str, month: u32, likes: u64, views: u64, text: &str) -> TweetRecord {
        TweetRecord {
            id: id.into(),
            author: "alice".into(),
            created_at: Utc.with_ymd_and_hms(2025, month, 10, 0, 0, 0).unwrap(),
            text: text.into(),
            like_count: likes,
            repost_count: 1,
            reply_count: 0,
            quote_count: 0,
            view_count: views,
            bookmark_count: 0,
            conversation_id: None,
            in_reply_to_id: None,
            quoted_id: None,
        }
    }

    #[test]
    fn stats_per_metric() {
        let records = vec![
            rec("1", 1, 1, 100, ""),
            rec("2", 1, 3, 300, ""),
            rec("3", 2, 10, 200, ""),
            rec("4", 2, 2, 400, ""),
        ];
        let stats = engagement_stats(&records);
        assert_eq!(stats.len(), 6);

        let views = &stats[0];
        assert_eq!(views.metric, "views");
        assert_eq!(views.mean, 250.0);
        assert_eq!(views.median, 250.0);
        assert_eq!(views.max, 400);
        assert_eq!(views.total, 1000);

        let likes = &stats[1];
        assert_eq!(likes.median, 2.5);
        assert_eq!(likes.max, 10);
    }

    #[test]
    fn empty_collection_has_zero_stats() {
        let stats = engagement_stats(&[]);
        assert!(stats.iter().all(|s| s.total == 0 && s.mean == 0.0));
    }

    #[test]
    fn top_tweets_rank_and_truncate() {
        let long = "长".repeat(150);
        let records = vec![
            rec("1", 1, 5, 0, "five"),
            rec("2", 1, 50, 0, &long),
            rec("3", 1, 5, 0, "also five"),
        ];
        let top = top_tweets(&records, 2);
        assert_eq!(top[0].id, "2");
        assert_eq!(top[0].text.chars().count(), 100);
        assert_eq!(top[0].total_engagement, 51);
        assert_eq!(top[1].id, "1");
    }

    #[test]
    fn monthly_averages_in_month_order() {
        let records = vec![
            rec("1", 2, 10, 200, ""),
            rec("2", 1, 1, 100, ""),
            rec("3", 1, 3, 300, ""),
        ];
        let months = monthly_engagement(&records);
        assert_eq!(months[0].month, "2025-01");
        assert_eq!(months[0].avg_views, 200.0);
        assert_eq!(months[0].avg_likes, 2.0);
        assert_eq!(months[1].month, "2025-02");
        assert_eq!(months[1].avg_reposts, 1.0);
    }
}
