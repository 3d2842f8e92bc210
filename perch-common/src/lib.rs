//! Common types and utilities shared across Perch crates.
//!
//! This crate holds the account identifier every per-account file is keyed
//! by, the shared error type, and the observability helpers used by the
//! binary and by integration tests.
//!
//! # Overview
//!
//! - [`Account`]: validated username, safe to use as a directory name
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`PerchError`] and [`Result`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use perch_common::Account;
//!
//! let account = Account::parse("@alice").unwrap();
//! assert_eq!(account.as_str(), "alice");
//! assert!(Account::parse("").is_err());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod observability;

/// Longest handle accepted. Legacy accounts exceed the modern 15-char limit.
const MAX_ACCOUNT_LEN: usize = 50;

/// A social-media account handle.
///
/// Only ASCII letters, digits and `_` are accepted, so the value can be
/// joined onto a data directory without escaping. A single leading `@` is
/// stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account(String);

impl Account {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let name = trimmed.strip_prefix('@').unwrap_or(trimmed);

        if name.is_empty() {
            return Err(PerchError::InvalidAccount(
                "account name must not be empty".into(),
            ));
        }
        if name.len() > MAX_ACCOUNT_LEN {
            return Err(PerchError::InvalidAccount(format!(
                "account name longer than {MAX_ACCOUNT_LEN} characters: {name}"
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(PerchError::InvalidAccount(format!(
                "account name {name:?} contains invalid character {bad:?}"
            )));
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Account {
    type Error = PerchError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Account> for String {
    fn from(value: Account) -> Self {
        value.0
    }
}

impl AsRef<str> for Account {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error types shared across the Perch crates.
#[derive(thiserror::Error, Debug)]
pub enum PerchError {
    /// The account identifier was empty or not a valid handle.
    #[error("Invalid account: {0}")]
    InvalidAccount(String),
}

/// Convenient alias for results that use [`PerchError`].
pub type Result<T> = std::result::Result<T, PerchError>;
