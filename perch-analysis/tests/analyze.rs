use chrono::{Duration, TimeZone, Utc};
use perch_analysis::{AnalysisError, Analyzer, charts, output};
use perch_common::Account;
use perch_harvest::{StoreError, TweetStore};
use perch_social::twitter::TweetRecord;
use std::fs;
use tempfile::TempDir;

fn rec(id: u32, text: &str, likes: u64) -> TweetRecord {
    TweetRecord {
        id: id.to_string(),
        author: "alice".into(),
        created_at: Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap() + Duration::days(id as i64 * 10),
        text: text.into(),
        like_count: likes,
        repost_count: 1,
        reply_count: 0,
        quote_count: 0,
        view_count: 100,
        bookmark_count: 0,
        conversation_id: None,
        in_reply_to_id: None,
        quoted_id: None,
    }
}

#[test]
fn writes_every_table_next_to_the_collection() {
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let alice = Account::parse("alice").unwrap();
    store
        .append(
            &alice,
            &[
                rec(1, "经济增长很好 https://t.co/a", 10),
                rec(2, "@bob 经济 危机", 3),
                rec(3, "just english", 0),
                rec(1, "duplicate row is ignored", 99),
            ],
        )
        .unwrap();

    let summary = Analyzer::new(store.clone()).unwrap().run(&alice).unwrap();
    assert_eq!(summary.tweets, 3);
    assert_eq!(summary.top_keywords[0].keyword, "经济");
    assert_eq!(summary.top_keywords[0].count, 2);
    assert_eq!(summary.written.len(), 15);

    let dir = store.account_dir(&alice);
    for name in [
        output::TWEETS_WITH_SENTIMENT,
        output::SENTIMENT_TREND,
        output::TOP_KEYWORDS,
        output::TWEETS_WITH_KEYWORDS,
        output::KEYWORD_TWEET_COUNTS,
        output::ENGAGEMENT_STATS,
        output::TOP_TWEETS,
        output::MONTHLY_ENGAGEMENT,
        output::POSTING_FREQUENCY,
        output::ACTIVITY_HEATMAP,
    ] {
        assert!(dir.join(name).is_file(), "{name} missing");
    }
    for name in [
        charts::SENTIMENT_TREND_PNG,
        charts::TOP_KEYWORDS_PNG,
        charts::ENGAGEMENT_TREND_PNG,
        charts::POSTING_FREQUENCY_PNG,
        charts::ACTIVITY_HEATMAP_PNG,
    ] {
        let png = fs::read(dir.join(charts::CHARTS_DIR).join(name)).unwrap();
        assert!(png.starts_with(b"\x89PNG"), "{name} is not a png");
    }

    let top_keywords = fs::read_to_string(dir.join(output::TOP_KEYWORDS)).unwrap();
    assert!(top_keywords.starts_with("keyword,count\n经济,2\n"));

    let top_tweets = fs::read_to_string(dir.join(output::TOP_TWEETS)).unwrap();
    let second_line = top_tweets.lines().nth(1).unwrap();
    assert!(second_line.starts_with("1,"), "{second_line}");

    let frequency = fs::read_to_string(dir.join(output::POSTING_FREQUENCY)).unwrap();
    assert_eq!(frequency, "month,tweets\n2025-01,2\n2025-02,1\n");

    // the collection itself is untouched
    assert_eq!(store.load_records(&alice).unwrap().len(), 3);
}

#[test]
fn charts_can_be_switched_off() {
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let alice = Account::parse("alice").unwrap();
    store.append(&alice, &[rec(1, "english only", 1)]).unwrap();

    let summary = Analyzer::new(store.clone())
        .unwrap()
        .with_charts(false)
        .run(&alice)
        .unwrap();
    assert_eq!(summary.written.len(), 10);
    assert!(!store.account_dir(&alice).join(charts::CHARTS_DIR).exists());

    let counts = fs::read_to_string(store.account_dir(&alice).join(output::KEYWORD_TWEET_COUNTS)).unwrap();
    assert_eq!(counts, "keyword,tweet_count\n");
}

#[test]
fn missing_collection_is_reported() {
    let tmp = TempDir::new().unwrap();
    let analyzer = Analyzer::new(TweetStore::new(tmp.path())).unwrap();
    let err = analyzer.run(&Account::parse("nobody").unwrap()).unwrap_err();
    assert!(matches!(err, AnalysisError::Store(StoreError::Missing(_))));
}
