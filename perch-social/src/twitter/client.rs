//! Wrapper around the twitterapi.io user timeline endpoint.
//!
//! Handles the `X-API-Key` header, query shaping, and mapping of
//! account-level failures (unknown account, rejected key) into
//! [`SocialError`] before delegating transport concerns to the shared HTTP
//! client.
use crate::twitter::parse::parse_page;
use crate::twitter::types::{TimelinePage, TimelineResponse};
use perch_common::Account;
use perch_http::{Auth, HttpClient, HttpError, RequestOpts, RetryPolicy, StatusCode};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

const LAST_TWEETS_PATH: &str = "twitter/user/last_tweets";
const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("account not found or unavailable: {0}")]
    AccountNotFound(String),
    #[error("credential rejected by the API: {0}")]
    Unauthorized(String),
    #[error("api reported an error: {0}")]
    Api(String),
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl SocialError {
    /// Worth retrying later (the HTTP layer already spent its budget).
    pub fn is_transient(&self) -> bool {
        matches!(self, SocialError::Http(e) if e.is_transient())
    }
}

fn looks_like_missing_account(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    ["not found", "does not exist", "doesn't exist", "suspended", "unavailable"]
        .iter()
        .any(|needle| m.contains(needle))
}

#[derive(Clone)]
pub struct TwitterApi {
    http: HttpClient,
    api_key: String,
    include_replies: bool,
}

impl TwitterApi {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, SocialError> {
        let http = HttpClient::new(base_url)?;
        Ok(Self::with_http(http, api_key))
    }

    pub fn with_http(http: HttpClient, api_key: String) -> Self {
        Self {
            http,
            api_key,
            include_replies: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.http = self.http.with_retry_policy(retry);
        self
    }

    pub fn with_include_replies(mut self, include: bool) -> Self {
        self.include_replies = include;
        self
    }

    /// Fetch one page of the account's timeline, newest first.
    ///
    /// `cursor` is `None` for the first page and the previous page's
    /// `next_cursor` afterwards.
    pub async fn last_tweets(
        &self,
        account: &Account,
        cursor: Option<&str>,
    ) -> Result<TimelinePage, SocialError> {
        let params: Vec<(&str, Cow<'_, str>)> = vec![
            ("userName", Cow::Borrowed(account.as_str())),
            ("cursor", Cow::Borrowed(cursor.unwrap_or(""))),
            (
                "includeReplies",
                Cow::Borrowed(if self.include_replies { "true" } else { "false" }),
            ),
        ];

        let result = self
            .http
            .get_json::<Value>(
                LAST_TWEETS_PATH,
                RequestOpts {
                    auth: Some(Auth::Header {
                        name: API_KEY_HEADER,
                        value: &self.api_key,
                    }),
                    query: Some(params),
                    ..Default::default()
                },
            )
            .await;

        let resp = match result {
            Ok(body) => TimelineResponse::from_value(body),
            Err(HttpError::Api {
                status, message, ..
            }) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                return Err(SocialError::Unauthorized(message));
            }
            Err(HttpError::Api {
                status, message, ..
            }) if status == StatusCode::NOT_FOUND
                || (status.is_client_error() && looks_like_missing_account(&message)) =>
            {
                return Err(SocialError::AccountNotFound(format!("{account}: {message}")));
            }
            Err(e) => return Err(e.into()),
        };

        if resp.status.as_deref() == Some("error") {
            let message = resp.msg.clone().unwrap_or_else(|| "unknown error".into());
            if looks_like_missing_account(&message) {
                return Err(SocialError::AccountNotFound(format!("{account}: {message}")));
            }
            return Err(SocialError::Api(message));
        }

        let page = parse_page(resp, account.as_str());
        tracing::debug!(
            account=%account,
            fetched=page.fetched(),
            rejected=page.rejected.len(),
            has_next=page.next_cursor.is_some(),
            malformed=page.malformed.is_some(),
            "twitter.last_tweets.page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_account_heuristic() {
        assert!(looks_like_missing_account("User not found"));
        assert!(looks_like_missing_account("account is SUSPENDED"));
        assert!(!looks_like_missing_account("invalid cursor"));
    }
}
