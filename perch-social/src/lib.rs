//! Social network clients used by Perch.
//!
//! Only the Twitter/X timeline pipeline exists: an HTTP client for the
//! twitterapi.io user timeline, its wire types, and the step that turns raw
//! tweets into typed [`twitter::TweetRecord`]s one at a time.
pub mod twitter;
