use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Envelope returned by `GET /twitter/user/last_tweets`.
///
/// Tweets are kept as raw JSON so each one can be parsed (and rejected)
/// independently. A field of the wrong type reads as absent, so a
/// mis-shaped envelope becomes a malformed page instead of a failed request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<TimelineData>,
    /// Search-style responses put tweets at the top level.
    #[serde(default, deserialize_with = "lenient")]
    pub tweets: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pub has_next_page: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub next_cursor: Option<String>,
}

impl TimelineResponse {
    /// Read an envelope from any JSON body. A body that is not an object
    /// yields an empty envelope.
    pub fn from_value(body: Value) -> Self {
        serde_json::from_value(body).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineData {
    #[serde(default, deserialize_with = "lenient")]
    pub tweets: Option<Vec<Value>>,
}

/// `None` for a missing, null, or wrongly typed field.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(de)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

/// A single tweet as the API sends it. Every field is optional here;
/// required-ness is enforced when converting into [`TweetRecord`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTweet {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub author: Option<ApiAuthor>,

    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub retweet_count: Option<u64>,
    #[serde(default)]
    pub reply_count: Option<u64>,
    #[serde(default)]
    pub quote_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub bookmark_count: Option<u64>,

    #[serde(default, deserialize_with = "opt_id")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub in_reply_to_id: Option<String>,
    #[serde(default, rename = "quoted_tweet")]
    pub quoted_tweet: Option<ApiTweetRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAuthor {
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTweetRef {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
}

/// Ids arrive as strings, but numeric ids are accepted too.
fn opt_id<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A tweet as persisted, one CSV row per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetRecord {
    pub id: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub quote_count: u64,
    pub view_count: u64,
    pub bookmark_count: u64,
    pub conversation_id: Option<String>,
    pub in_reply_to_id: Option<String>,
    pub quoted_id: Option<String>,
}

impl TweetRecord {
    /// Likes + reposts + replies + quotes.
    pub fn engagement(&self) -> u64 {
        self.like_count + self.repost_count + self.reply_count + self.quote_count
    }
}

/// A tweet that could not be turned into a [`TweetRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub id: Option<String>,
    pub reason: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "tweet {id}: {}", self.reason),
            None => write!(f, "tweet without id: {}", self.reason),
        }
    }
}

/// One parsed page of a timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelinePage {
    pub records: Vec<TweetRecord>,
    pub rejected: Vec<RecordError>,
    /// `None` when the API reports no further page.
    pub next_cursor: Option<String>,
    /// Set when the payload had no tweet list at all.
    pub malformed: Option<String>,
}

impl TimelinePage {
    /// Tweets the API returned on this page, parsed or not.
    pub fn fetched(&self) -> usize {
        self.records.len() + self.rejected.len()
    }
}
