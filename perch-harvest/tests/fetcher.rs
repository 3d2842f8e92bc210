mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use perch_common::Account;
use perch_harvest::{
    FetchOutcome, FetchPhase, Fetcher, HarvestError, StopReason, TimelineSource, TweetStore,
};
use perch_http::HttpError;
use perch_social::twitter::parse::parse_page;
use perch_social::twitter::types::TimelineResponse;
use perch_social::twitter::{SocialError, TimelinePage};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

fn alice() -> Account {
    Account::parse("alice").unwrap()
}

fn tweet(id: u64, age_days: i64) -> Value {
    let created = now() - Duration::days(age_days) - Duration::minutes(id as i64 % 60);
    json!({
        "type": "tweet",
        "id": id.to_string(),
        "text": format!("tweet {id}"),
        "createdAt": created.format("%a %b %d %H:%M:%S +0000 %Y").to_string(),
        "likeCount": 1,
        "retweetCount": 0,
        "replyCount": 0,
        "quoteCount": 0,
        "viewCount": 10,
        "bookmarkCount": 0,
        "author": { "userName": "alice" }
    })
}

fn page(tweets: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "status": "success",
        "msg": "",
        "data": { "tweets": tweets },
        "has_next_page": next.is_some(),
        "next_cursor": next.unwrap_or(""),
    })
}

/// Three pages of 20: ages 1..=20 days, 21..=40 days, then ten tweets just
/// inside the window and ten past it. A fourth page exists but must never
/// be requested.
fn alice_timeline() -> Vec<Value> {
    let p1 = (0..20).map(|i| tweet(5000 - i, 1 + i as i64)).collect();
    let p2 = (0..20).map(|i| tweet(4000 - i, 21 + i as i64)).collect();
    let p3 = (0..10)
        .map(|i| tweet(3000 - i, 700 + i as i64))
        .chain((0..10).map(|i| tweet(2000 - i, 740 + i as i64)))
        .collect();
    let p4 = (0..20).map(|i| tweet(1000 - i, 800 + i as i64)).collect();
    vec![
        page(p1, Some("c1")),
        page(p2, Some("c2")),
        page(p3, Some("c3")),
        page(p4, None),
    ]
}

/// Serves canned pages keyed by cursor (`None` → 0, `"cN"` → N).
#[derive(Clone)]
struct ScriptedSource {
    pages: Arc<Vec<Value>>,
    calls: Arc<AtomicUsize>,
    fail: Arc<dyn Fn(usize) -> Option<SocialError> + Send + Sync>,
}

impl ScriptedSource {
    fn new(pages: Vec<Value>) -> Self {
        Self {
            pages: Arc::new(pages),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(|_: usize| -> Option<SocialError> { None }),
        }
    }

    /// Fail the `n`th call (1-based) with whatever `err` returns.
    fn failing_on(mut self, n: usize, err: fn() -> SocialError) -> Self {
        self.fail = Arc::new(move |call: usize| (call == n).then(err));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimelineSource for ScriptedSource {
    async fn page(
        &self,
        account: &Account,
        cursor: Option<&str>,
    ) -> Result<TimelinePage, SocialError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = (self.fail)(call) {
            return Err(err);
        }
        let idx = match cursor {
            None => 0,
            Some(c) => c.trim_start_matches('c').parse::<usize>().unwrap(),
        };
        let raw = self.pages.get(idx).cloned().expect("page requested past script");
        Ok(parse_page(TimelineResponse::from_value(raw), account.as_str()))
    }
}

fn network_down() -> SocialError {
    SocialError::Http(HttpError::Network {
        message: "connection reset".into(),
        attempts: 6,
    })
}

fn persisted_ids(store: &TweetStore) -> BTreeSet<String> {
    store
        .load_records(&alice())
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect()
}

fn completed(outcome: FetchOutcome) -> perch_harvest::FetchReport {
    match outcome {
        FetchOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn pages_down_to_cutoff_and_prunes_boundary_page() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let source = ScriptedSource::new(alice_timeline());
    let mut fetcher = Fetcher::new(source.clone(), store.clone());

    let report = completed(fetcher.fetch_at(&alice(), now()).await.unwrap());

    assert_eq!(source.calls(), 3);
    assert_eq!(report.pages, 3);
    assert_eq!(report.fetched, 60);
    assert_eq!(report.new, 50);
    assert_eq!(report.total_persisted, 50);
    assert_eq!(report.stop, StopReason::ReachedCutoff);
    assert!(report.window_covered());
    assert_eq!(fetcher.phase(), FetchPhase::Done);

    let cutoff = now().checked_sub_months(Months::new(24)).unwrap();
    assert_eq!(report.cutoff, cutoff);
    let records = store.load_records(&alice()).unwrap();
    assert_eq!(records.len(), 50);
    assert!(records.iter().all(|r| r.created_at >= cutoff));
}

#[tokio::test]
async fn rerun_is_idempotent() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());

    let mut first = Fetcher::new(ScriptedSource::new(alice_timeline()), store.clone());
    first.fetch_at(&alice(), now()).await.unwrap();
    let before = fs::read(store.collection_path(&alice())).unwrap();

    let mut second = Fetcher::new(ScriptedSource::new(alice_timeline()), store.clone());
    let report = completed(second.fetch_at(&alice(), now()).await.unwrap());
    let after = fs::read(store.collection_path(&alice())).unwrap();

    assert_eq!(report.new, 0);
    assert_eq!(report.total_persisted, 50);
    assert_eq!(before, after);
}

#[tokio::test]
async fn covered_collection_short_circuits_without_requests() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    Fetcher::new(ScriptedSource::new(alice_timeline()), store.clone())
        .fetch_at(&alice(), now())
        .await
        .unwrap();

    // two months on, the oldest stored tweet has slipped past the cutoff
    let later = now().checked_add_months(Months::new(2)).unwrap();
    let source = ScriptedSource::new(alice_timeline());
    let mut fetcher = Fetcher::new(source.clone(), store.clone());
    let outcome = fetcher.fetch_at(&alice(), later).await.unwrap();

    assert_eq!(source.calls(), 0);
    match outcome {
        FetchOutcome::AlreadyComplete {
            total_persisted,
            oldest,
            cutoff,
        } => {
            assert_eq!(total_persisted, 50);
            assert!(oldest < cutoff);
        }
        other => panic!("expected short-circuit, got {other:?}"),
    }
}

#[tokio::test]
async fn interrupted_run_keeps_flushed_pages_and_resumes() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());

    let source = ScriptedSource::new(alice_timeline()).failing_on(3, network_down);
    let mut fetcher = Fetcher::new(source, store.clone());
    let err = fetcher.fetch_at(&alice(), now()).await.unwrap_err();

    assert!(matches!(err, HarvestError::RetriesExhausted { page: 3, .. }), "{err:?}");
    assert_eq!(err.exit_code(), 4);
    assert_eq!(fetcher.phase(), FetchPhase::Aborted);
    assert_eq!(store.load_records(&alice()).unwrap().len(), 40);

    Fetcher::new(ScriptedSource::new(alice_timeline()), store.clone())
        .fetch_at(&alice(), now())
        .await
        .unwrap();

    let reference = TempDir::new().unwrap();
    let reference_store = TweetStore::new(reference.path());
    Fetcher::new(ScriptedSource::new(alice_timeline()), reference_store.clone())
        .fetch_at(&alice(), now())
        .await
        .unwrap();

    assert_eq!(persisted_ids(&store), persisted_ids(&reference_store));
}

#[tokio::test]
async fn malformed_record_is_skipped() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());

    let mut tweets: Vec<Value> = (0..20).map(|i| tweet(900 - i, 1 + i as i64)).collect();
    tweets[7].as_object_mut().unwrap().remove("createdAt");
    let source = ScriptedSource::new(vec![page(tweets, None)]);

    let report = completed(
        Fetcher::new(source, store.clone())
            .fetch_at(&alice(), now())
            .await
            .unwrap(),
    );

    assert_eq!(report.fetched, 20);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.new, 19);
    assert_eq!(report.stop, StopReason::EndOfTimeline);
    assert!(!report.window_covered());
    assert!(!persisted_ids(&store).contains("893"));
}

#[tokio::test]
async fn unknown_account_creates_no_file() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let source = ScriptedSource::new(alice_timeline())
        .failing_on(1, || SocialError::AccountNotFound("User not found".into()));

    let err = Fetcher::new(source, store.clone())
        .fetch_at(&alice(), now())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::AccountNotFound(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(!store.collection_path(&alice()).exists());
}

#[tokio::test]
async fn page_without_tweet_list_is_skipped() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let broken = json!({ "status": "success", "has_next_page": true, "next_cursor": "c1" });
    let good = page((0..20).map(|i| tweet(700 - i, 3 + i as i64)).collect(), None);

    let report = completed(
        Fetcher::new(ScriptedSource::new(vec![broken, good]), store.clone())
            .fetch_at(&alice(), now())
            .await
            .unwrap(),
    );

    assert_eq!(report.pages, 2);
    assert_eq!(report.malformed_pages, 1);
    assert_eq!(report.new, 20);
}

#[tokio::test]
async fn wrongly_typed_page_does_not_abort_the_run() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let broken = json!({
        "data": { "tweets": { "unexpected": "object" } },
        "has_next_page": true,
        "next_cursor": "c1"
    });
    let good = page((0..20).map(|i| tweet(600 - i, 3 + i as i64)).collect(), None);

    let mut fetcher = Fetcher::new(ScriptedSource::new(vec![broken, good]), store.clone());
    let report = completed(fetcher.fetch_at(&alice(), now()).await.unwrap());

    assert_eq!(fetcher.phase(), FetchPhase::Done);
    assert_eq!(report.malformed_pages, 1);
    assert_eq!(report.total_persisted, 20);
}

#[tokio::test]
async fn crash_inside_quoted_text_loses_only_the_partial_row() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());

    let source = ScriptedSource::new(alice_timeline()).failing_on(2, network_down);
    Fetcher::new(source, store.clone())
        .fetch_at(&alice(), now())
        .await
        .unwrap_err();
    let mut f = fs::OpenOptions::new()
        .append(true)
        .open(store.collection_path(&alice()))
        .unwrap();
    std::io::Write::write_all(&mut f, b"4000,alice,2026-09-28T11:00:00Z,\"half, writ").unwrap();
    drop(f);

    Fetcher::new(ScriptedSource::new(alice_timeline()), store.clone())
        .fetch_at(&alice(), now())
        .await
        .unwrap();

    assert_eq!(persisted_ids(&store).len(), 50);
    let raw = fs::read_to_string(store.collection_path(&alice())).unwrap();
    assert!(!raw.contains("half, writ"));
}

#[tokio::test]
async fn page_cap_stops_early() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());
    let source = ScriptedSource::new(alice_timeline());

    let report = completed(
        Fetcher::new(source.clone(), store.clone())
            .with_max_pages(2)
            .fetch_at(&alice(), now())
            .await
            .unwrap(),
    );

    assert_eq!(source.calls(), 2);
    assert_eq!(report.stop, StopReason::PageLimit);
    assert_eq!(report.total_persisted, 40);
}

#[tokio::test]
async fn overlapping_pages_are_deduplicated() {
    common::init_test_tracing();
    let tmp = TempDir::new().unwrap();
    let store = TweetStore::new(tmp.path());

    let p1: Vec<Value> = (0..20).map(|i| tweet(500 - i, 1 + i as i64)).collect();
    // the API shifted by five while paging: the first five repeat
    let p2: Vec<Value> = (15..35).map(|i| tweet(500 - i, 1 + i as i64)).collect();
    let source = ScriptedSource::new(vec![page(p1, Some("c1")), page(p2, None)]);

    let report = completed(
        Fetcher::new(source, store.clone())
            .fetch_at(&alice(), now())
            .await
            .unwrap(),
    );

    assert_eq!(report.fetched, 40);
    assert_eq!(report.new, 35);
    assert_eq!(store.load_records(&alice()).unwrap().len(), 35);
}
