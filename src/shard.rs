//! Email classification and shard routing.
//!
//! Every accepted email lands in one of 37 shards: the ten digits, the 26
//! ASCII letters (case folded), or `symbols` for anything else.
use std::fmt;

use crate::credential::EmailParts;

/// Number of shards: `0`-`9`, `a`-`z` and `symbols`.
pub const SHARD_COUNT: usize = 37;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShardKey {
    /// An ASCII digit or lowercase ASCII letter.
    Char(char),
    Symbols,
}

impl ShardKey {
    /// Route an email by its first character.
    pub fn for_email(email: &str) -> Self {
        match email.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some(c) if c.is_ascii_digit() || c.is_ascii_lowercase() => ShardKey::Char(c),
            _ => ShardKey::Symbols,
        }
    }

    /// All shards in table order.
    pub fn all() -> impl Iterator<Item = ShardKey> {
        ('0'..='9')
            .chain('a'..='z')
            .map(ShardKey::Char)
            .chain(std::iter::once(ShardKey::Symbols))
    }

    /// Dense index in `0..SHARD_COUNT`, following [`ShardKey::all`].
    pub fn index(self) -> usize {
        match self {
            ShardKey::Char(c @ '0'..='9') => c as usize - '0' as usize,
            ShardKey::Char(c) => 10 + (c as usize - 'a' as usize),
            ShardKey::Symbols => SHARD_COUNT - 1,
        }
    }

    /// Table (or file stem) name of the shard.
    pub fn table_name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardKey::Char(c) => write!(f, "{}", c),
            ShardKey::Symbols => f.write_str("symbols"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    #[error("not_an_email: {0:?}")]
    NotAnEmail(Vec<String>),
}

/// Split an email into username and provider.
///
/// Accepts exactly one `@` with something on both sides; the parts are not
/// validated any further.
pub fn classify_email(email: &str) -> Result<EmailParts, EmailError> {
    let parts: Vec<&str> = email.split('@').collect();
    match parts.as_slice() {
        [username, provider] if !username.is_empty() && !provider.is_empty() => Ok(EmailParts {
            username: username.to_string(),
            provider: provider.to_string(),
        }),
        _ => Err(EmailError::NotAnEmail(
            parts.iter().map(|p| p.to_string()).collect(),
        )),
    }
}
