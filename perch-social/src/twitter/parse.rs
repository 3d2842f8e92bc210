use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{ApiTweet, RecordError, TimelinePage, TimelineResponse, TweetRecord};

/// Legacy Twitter timestamp, e.g. `Tue Dec 02 02:35:56 +0000 2025`.
const TWITTER_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse a `createdAt` value in either the legacy Twitter format or RFC 3339.
///
/// ```
/// use perch_social::twitter::parse::parse_created_at;
///
/// let legacy = parse_created_at("Tue Dec 02 02:35:56 +0000 2025").unwrap();
/// let rfc = parse_created_at("2025-12-02T02:35:56Z").unwrap();
/// assert_eq!(legacy, rfc);
/// assert!(parse_created_at("yesterday").is_err());
/// ```
pub fn parse_created_at(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, TWITTER_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Turn one raw tweet into a record. `fallback_author` is used when the
/// payload carries no author block (the timeline belongs to that account).
pub fn parse_tweet(raw: &Value, fallback_author: &str) -> Result<TweetRecord, RecordError> {
    let hint_id = raw.get("id").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let reject = |reason: String| RecordError {
        id: hint_id.clone(),
        reason,
    };

    let tweet: ApiTweet = serde_json::from_value(raw.clone()).map_err(|e| reject(e.to_string()))?;

    let id = tweet.id.ok_or_else(|| reject("missing id".into()))?;
    let created_raw = tweet
        .created_at
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| reject("missing createdAt".into()))?;
    let created_at = parse_created_at(&created_raw)
        .map_err(|e| reject(format!("unparseable createdAt {created_raw:?}: {e}")))?;

    let author = tweet
        .author
        .and_then(|a| a.user_name)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| fallback_author.to_string());

    Ok(TweetRecord {
        id,
        author,
        created_at,
        text: tweet.text.unwrap_or_default(),
        like_count: tweet.like_count.unwrap_or(0),
        repost_count: tweet.retweet_count.unwrap_or(0),
        reply_count: tweet.reply_count.unwrap_or(0),
        quote_count: tweet.quote_count.unwrap_or(0),
        view_count: tweet.view_count.unwrap_or(0),
        bookmark_count: tweet.bookmark_count.unwrap_or(0),
        conversation_id: tweet.conversation_id,
        in_reply_to_id: tweet.in_reply_to_id,
        quoted_id: tweet.quoted_tweet.and_then(|q| q.id),
    })
}

/// Split a response into parsed records and rejections, and resolve the
/// next cursor. A payload without any tweet list is marked malformed but
/// keeps its cursor so paging can continue past it.
pub fn parse_page(resp: TimelineResponse, fallback_author: &str) -> TimelinePage {
    let next_cursor = match resp.has_next_page {
        Some(false) => None,
        _ => resp.next_cursor.filter(|c| !c.trim().is_empty()),
    };

    let raw_tweets = resp.data.and_then(|d| d.tweets).or(resp.tweets);
    let Some(raw_tweets) = raw_tweets else {
        return TimelinePage {
            next_cursor,
            malformed: Some("payload has no tweets list".into()),
            ..Default::default()
        };
    };

    let mut page = TimelinePage {
        next_cursor,
        ..Default::default()
    };
    for raw in &raw_tweets {
        match parse_tweet(raw, fallback_author) {
            Ok(record) => page.records.push(record),
            Err(rejection) => page.rejected.push(rejection),
        }
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tweet(id: &str, created: &str) -> Value {
        json!({
            "type": "tweet",
            "id": id,
            "text": "你好 world",
            "createdAt": created,
            "likeCount": 3,
            "retweetCount": 1,
            "replyCount": 2,
            "quoteCount": 0,
            "viewCount": 120,
            "bookmarkCount": 4,
            "conversationId": id,
            "author": { "userName": "alice" },
            "quoted_tweet": { "id": "99" }
        })
    }

    #[test]
    fn parses_full_tweet() {
        let rec = parse_tweet(&tweet("1", "Tue Dec 02 02:35:56 +0000 2025"), "fallback").unwrap();
        assert_eq!(rec.id, "1");
        assert_eq!(rec.author, "alice");
        assert_eq!(rec.created_at.to_rfc3339(), "2025-12-02T02:35:56+00:00");
        assert_eq!(rec.repost_count, 1);
        assert_eq!(rec.view_count, 120);
        assert_eq!(rec.quoted_id.as_deref(), Some("99"));
        assert_eq!(rec.engagement(), 6);
    }

    #[test]
    fn numeric_ids_and_missing_author() {
        let raw = json!({ "id": 1234567890123u64, "createdAt": "2025-01-01T00:00:00Z" });
        let rec = parse_tweet(&raw, "bob").unwrap();
        assert_eq!(rec.id, "1234567890123");
        assert_eq!(rec.author, "bob");
        assert_eq!(rec.like_count, 0);
        assert!(rec.text.is_empty());
    }

    #[test]
    fn missing_timestamp_is_rejected_with_id() {
        let raw = json!({ "id": "7", "text": "no time" });
        let err = parse_tweet(&raw, "bob").unwrap_err();
        assert_eq!(err.id.as_deref(), Some("7"));
        assert!(err.reason.contains("createdAt"));
    }

    #[test]
    fn wrong_counter_type_is_rejected() {
        let raw = json!({ "id": "8", "createdAt": "2025-01-01T00:00:00Z", "likeCount": "many" });
        assert!(parse_tweet(&raw, "bob").is_err());
    }

    #[test]
    fn page_without_tweets_is_malformed_but_keeps_cursor() {
        let resp: TimelineResponse = serde_json::from_value(json!({
            "status": "success",
            "data": {},
            "has_next_page": true,
            "next_cursor": "abc"
        }))
        .unwrap();
        let page = parse_page(resp, "alice");
        assert!(page.malformed.is_some());
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert_eq!(page.fetched(), 0);
    }

    #[test]
    fn wrongly_typed_envelope_fields_read_as_absent() {
        let resp = TimelineResponse::from_value(json!({
            "status": 7,
            "data": { "tweets": "none" },
            "has_next_page": "true",
            "next_cursor": "abc"
        }));
        assert!(resp.status.is_none());
        assert!(resp.has_next_page.is_none());
        let page = parse_page(resp, "alice");
        assert!(page.malformed.is_some());
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn last_page_drops_cursor() {
        let resp: TimelineResponse = serde_json::from_value(json!({
            "data": { "tweets": [tweet("1", "2025-01-01T00:00:00Z"), { "id": "2" }] },
            "has_next_page": false,
            "next_cursor": "stale"
        }))
        .unwrap();
        let page = parse_page(resp, "alice");
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.rejected.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn top_level_tweets_are_accepted() {
        let resp: TimelineResponse = serde_json::from_value(json!({
            "tweets": [tweet("5", "2025-01-01T00:00:00Z")],
            "has_next_page": true,
            "next_cursor": ""
        }))
        .unwrap();
        let page = parse_page(resp, "alice");
        assert_eq!(page.records.len(), 1);
        assert!(page.next_cursor.is_none(), "empty cursor means no next page");
    }
}
