//! Resumable per-account tweet harvesting.
//!
//! The [`Fetcher`] pages an account's timeline newest-first down to a
//! trailing-window cutoff, merging each page into the account's CSV
//! collection and flushing it before asking for the next page. A rerun
//! loads the collection back through [`TweetStore::load_checkpoint`] and
//! either short-circuits (window already covered) or pages again, relying
//! on id dedup to make refetching harmless.
pub mod checkpoint;
pub mod fetcher;
pub mod pace;
pub mod store;
pub mod window;

pub use checkpoint::Checkpoint;
pub use fetcher::{
    FetchOutcome, FetchPhase, FetchReport, Fetcher, HarvestError, PageReport, StopReason,
    TimelineSource,
};
pub use pace::Pacer;
pub use store::{StoreError, TweetStore};
pub use window::Window;
