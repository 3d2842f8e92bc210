//! The resumable paging loop.
//!
//! Lifecycle: `Idle → Paging → (Flushing per page) → Done | Aborted`. One
//! page is requested, filtered, and flushed to the collection before the
//! next request goes out; there is never more than one request in flight.
use crate::checkpoint::Checkpoint;
use crate::pace::Pacer;
use crate::store::{StoreError, TweetStore};
use crate::window::Window;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perch_common::Account;
use perch_social::twitter::{SocialError, TimelinePage, TweetRecord, TwitterApi};
use std::collections::HashSet;
use std::fmt;

/// Where timeline pages come from.
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Fetch the page after `cursor` (`None` for the newest page).
    async fn page(
        &self,
        account: &Account,
        cursor: Option<&str>,
    ) -> Result<TimelinePage, SocialError>;
}

#[async_trait]
impl TimelineSource for TwitterApi {
    async fn page(
        &self,
        account: &Account,
        cursor: Option<&str>,
    ) -> Result<TimelinePage, SocialError> {
        self.last_tweets(account, cursor).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("API credential rejected: {0}")]
    Unauthorized(String),
    #[error("page {page}: retries exhausted: {source}")]
    RetriesExhausted {
        page: usize,
        #[source]
        source: SocialError,
    },
    #[error("page {page}: upstream error: {source}")]
    Upstream {
        page: usize,
        #[source]
        source: SocialError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HarvestError {
    fn from_source(page: usize, err: SocialError) -> Self {
        match err {
            SocialError::AccountNotFound(m) => HarvestError::AccountNotFound(m),
            SocialError::Unauthorized(m) => HarvestError::Unauthorized(m),
            e if e.is_transient() => HarvestError::RetriesExhausted { page, source: e },
            e => HarvestError::Upstream { page, source: e },
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarvestError::AccountNotFound(_) | HarvestError::Unauthorized(_) => 3,
            HarvestError::RetriesExhausted { .. } | HarvestError::Upstream { .. } => 4,
            HarvestError::Store(_) => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Paging,
    Flushing,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The API reported no further page.
    EndOfTimeline,
    /// A page reached back past the cutoff.
    ReachedCutoff,
    /// The page safety cap was hit first.
    PageLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::EndOfTimeline => "end of timeline",
            StopReason::ReachedCutoff => "reached cutoff",
            StopReason::PageLimit => "page limit",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    pub page: usize,
    pub fetched: usize,
    pub new: usize,
    pub duplicates: usize,
    pub out_of_window: usize,
    pub rejected: usize,
    pub oldest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub account: Account,
    pub cutoff: DateTime<Utc>,
    pub pages: usize,
    pub fetched: usize,
    pub new: usize,
    pub rejected: usize,
    pub malformed_pages: usize,
    pub total_persisted: usize,
    /// Oldest timestamp seen in the collection after the run.
    pub oldest: Option<DateTime<Utc>>,
    pub stop: StopReason,
}

impl FetchReport {
    pub fn window_covered(&self) -> bool {
        self.stop == StopReason::ReachedCutoff
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The collection already reaches back to the cutoff; nothing was requested.
    AlreadyComplete {
        total_persisted: usize,
        oldest: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    },
    Completed(FetchReport),
}

/// Drives one account's harvest against a [`TimelineSource`].
pub struct Fetcher<S> {
    source: S,
    store: TweetStore,
    pacer: Pacer,
    window_months: u32,
    max_pages: usize,
    phase: FetchPhase,
}

impl<S: TimelineSource> Fetcher<S> {
    pub fn new(source: S, store: TweetStore) -> Self {
        Self {
            source,
            store,
            pacer: Pacer::disabled(),
            window_months: 24,
            max_pages: 1000,
            phase: FetchPhase::Idle,
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_window_months(mut self, months: u32) -> Self {
        self.window_months = months;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    pub fn store(&self) -> &TweetStore {
        &self.store
    }

    /// Harvest the trailing window ending now.
    pub async fn fetch(&mut self, account: &Account) -> Result<FetchOutcome, HarvestError> {
        self.fetch_at(account, Utc::now()).await
    }

    /// Harvest the trailing window ending at `now`.
    pub async fn fetch_at(
        &mut self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome, HarvestError> {
        self.phase = FetchPhase::Idle;
        let result = self.run(account, Window::trailing_months(now, self.window_months)).await;
        self.phase = match &result {
            Ok(_) => FetchPhase::Done,
            Err(err) => {
                tracing::error!(account=%account, error=%err, "harvest.aborted");
                FetchPhase::Aborted
            }
        };
        result
    }

    async fn run(&mut self, account: &Account, window: Window) -> Result<FetchOutcome, HarvestError> {
        self.store.repair_tail(account)?;
        let checkpoint = self.store.load_checkpoint(account)?;

        if let Some(Checkpoint {
            oldest: Some(oldest),
            ..
        }) = &checkpoint
        {
            if window.is_covered_by(*oldest) {
                let total = checkpoint.as_ref().map_or(0, Checkpoint::len);
                tracing::info!(
                    account=%account,
                    total_persisted=total,
                    oldest=%oldest,
                    cutoff=%window.cutoff,
                    "harvest.already_complete"
                );
                return Ok(FetchOutcome::AlreadyComplete {
                    total_persisted: total,
                    oldest: *oldest,
                    cutoff: window.cutoff,
                });
            }
        }

        let resumed = checkpoint.is_some();
        let mut oldest = checkpoint.as_ref().and_then(|c| c.oldest);
        let mut seen: HashSet<String> = checkpoint.map(|c| c.ids).unwrap_or_default();
        tracing::info!(
            account=%account,
            resumed,
            already_persisted=seen.len(),
            cutoff=%window.cutoff,
            "harvest.start"
        );

        let mut report = FetchReport {
            account: account.clone(),
            cutoff: window.cutoff,
            pages: 0,
            fetched: 0,
            new: 0,
            rejected: 0,
            malformed_pages: 0,
            total_persisted: seen.len(),
            oldest,
            stop: StopReason::EndOfTimeline,
        };
        let mut cursor: Option<String> = None;

        self.phase = FetchPhase::Paging;
        loop {
            if report.pages >= self.max_pages {
                tracing::warn!(account=%account, max_pages=self.max_pages, "harvest.page_limit");
                report.stop = StopReason::PageLimit;
                break;
            }

            self.pacer.acquire().await;
            let page_no = report.pages + 1;
            let page = self
                .source
                .page(account, cursor.as_deref())
                .await
                .map_err(|e| HarvestError::from_source(page_no, e))?;
            report.pages = page_no;

            if let Some(reason) = &page.malformed {
                report.malformed_pages += 1;
                tracing::warn!(account=%account, page=page_no, reason=%reason, "harvest.page.malformed");
                match page.next_cursor {
                    Some(next) => {
                        cursor = Some(next);
                        continue;
                    }
                    None => {
                        report.stop = StopReason::EndOfTimeline;
                        break;
                    }
                }
            }

            for rejection in &page.rejected {
                tracing::warn!(account=%account, page=page_no, %rejection, "harvest.record.skipped");
            }

            let (fresh, page_report) = select_new(page_no, &page, &window, &mut seen);

            self.phase = FetchPhase::Flushing;
            self.store.append(account, &fresh)?;
            self.phase = FetchPhase::Paging;

            report.fetched += page_report.fetched;
            report.new += page_report.new;
            report.rejected += page_report.rejected;
            report.total_persisted += page_report.new;
            if let Some(page_oldest) = fresh.iter().map(|r| r.created_at).min() {
                oldest = Some(oldest.map_or(page_oldest, |o| o.min(page_oldest)));
            }
            report.oldest = oldest;

            tracing::info!(
                account=%account,
                page=page_no,
                fetched=page_report.fetched,
                new=page_report.new,
                duplicates=page_report.duplicates,
                out_of_window=page_report.out_of_window,
                rejected=page_report.rejected,
                oldest=?page_report.oldest,
                total=report.total_persisted,
                "harvest.page"
            );

            if page_report.out_of_window > 0 {
                report.stop = StopReason::ReachedCutoff;
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    report.stop = StopReason::EndOfTimeline;
                    break;
                }
            }
        }

        tracing::info!(
            account=%account,
            pages=report.pages,
            new=report.new,
            total_persisted=report.total_persisted,
            oldest=?report.oldest,
            stop=%report.stop,
            window_covered=report.window_covered(),
            "harvest.done"
        );
        Ok(FetchOutcome::Completed(report))
    }
}

/// Pick the records of a page that are in the window and not yet seen,
/// marking them seen.
fn select_new(
    page_no: usize,
    page: &TimelinePage,
    window: &Window,
    seen: &mut HashSet<String>,
) -> (Vec<TweetRecord>, PageReport) {
    let mut report = PageReport {
        page: page_no,
        fetched: page.fetched(),
        rejected: page.rejected.len(),
        ..Default::default()
    };
    let mut fresh = Vec::new();

    for record in &page.records {
        let ts = record.created_at;
        report.oldest = Some(report.oldest.map_or(ts, |o| o.min(ts)));

        if !window.contains(ts) {
            report.out_of_window += 1;
        } else if seen.insert(record.id.clone()) {
            fresh.push(record.clone());
        } else {
            report.duplicates += 1;
        }
    }
    report.new = fresh.len();
    (fresh, report)
}
