//! Twitter/X timeline integration.
//!
//! `client` talks to the API, `types` holds the wire and record models, and
//! `parse` converts each raw tweet into a record or a rejection so a single
//! bad tweet never fails a whole page.
pub mod client;
pub mod parse;
pub mod types;

pub use client::{SocialError, TwitterApi};
pub use types::{RecordError, TimelinePage, TweetRecord};
