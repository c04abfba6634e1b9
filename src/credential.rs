//! Credential data model: the raw (email, password) pair recovered from a
//! line, and the fully derived [`HashedRecord`] handed to a record sink.
//!
//! A [`Credential`] is produced by [`crate::splitter::split_line`]. It is only
//! promoted to a [`HashedRecord`] once its email has been classified by
//! [`crate::shard::classify_email`] and the password digests computed by
//! [`crate::digest::PasswordDigests::compute`].
use std::fmt;

use serde::Serialize;

use crate::digest::PasswordDigests;

/// A parsed (email, password) pair prior to hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl Credential {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

/// Local and domain halves of an accepted email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailParts {
    pub username: String,
    pub provider: String,
}

/// A credential with every derived field computed, waiting for a sequence id.
///
/// Workers build these off the writer thread; the writer turns each one into
/// a [`HashedRecord`] once it knows which id the sink will accept next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub email: String,
    pub password: String,
    pub username: String,
    pub provider: String,
    pub digests: PasswordDigests,
}

impl PendingRecord {
    pub fn new(credential: Credential, parts: EmailParts) -> Self {
        let digests = PasswordDigests::compute(&credential.password);
        Self {
            email: credential.email,
            password: credential.password,
            username: parts.username,
            provider: parts.provider,
            digests,
        }
    }

    /// Attach the sequence id, producing the immutable record for the sink.
    pub fn with_sequence_id(self, sequence_id: u64) -> HashedRecord {
        HashedRecord {
            sequence_id,
            email: self.email,
            password: self.password,
            username: self.username,
            provider: self.provider,
            sha1: self.digests.sha1,
            sha256: self.digests.sha256,
            sha512: self.digests.sha512,
            md5: self.digests.md5,
        }
    }
}

/// One row of a shard table.
///
/// Field order matches the column order of the shard tables and of the CSV
/// export header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashedRecord {
    pub sequence_id: u64,
    pub email: String,
    pub password: String,
    pub username: String,
    pub provider: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub md5: String,
}

impl fmt::Display for HashedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {:?}, {:?}, {:?}, {:?}, {}, {}, {}, {})",
            self.sequence_id,
            self.email,
            self.password,
            self.username,
            self.provider,
            self.sha1,
            self.sha256,
            self.sha512,
            self.md5
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingRecord {
        PendingRecord::new(
            Credential::new("alice@example.com", "hunter2"),
            EmailParts {
                username: "alice".into(),
                provider: "example.com".into(),
            },
        )
    }

    #[test]
    fn pending_record_carries_digests_of_password() {
        let p = pending();
        assert_eq!(p.digests, PasswordDigests::compute("hunter2"));
        assert_eq!(p.username, "alice");
        assert_eq!(p.provider, "example.com");
    }

    #[test]
    fn with_sequence_id_flattens_digests() {
        let r = pending().with_sequence_id(42);
        assert_eq!(r.sequence_id, 42);
        assert_eq!(r.email, "alice@example.com");
        assert_eq!(r.sha1.len(), 40);
        assert_eq!(r.sha256.len(), 64);
        assert_eq!(r.sha512.len(), 128);
        assert_eq!(r.md5.len(), 32);
    }

    #[test]
    fn display_quotes_text_fields() {
        let r = pending().with_sequence_id(7);
        let s = r.to_string();
        assert!(s.starts_with("(7, \"alice@example.com\", \"hunter2\", \"alice\""));
        assert!(s.ends_with(&format!("{})", r.md5)));
    }
}
