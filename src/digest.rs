//! Password fingerprints stored next to every record.
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// Lowercase hex digests of a password's UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigests {
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub md5: String,
}

impl PasswordDigests {
    pub fn compute(password: &str) -> Self {
        let bytes = password.as_bytes();
        Self {
            sha1: hex::encode(Sha1::digest(bytes)),
            sha256: hex::encode(Sha256::digest(bytes)),
            sha512: hex::encode(Sha512::digest(bytes)),
            md5: format!("{:x}", md5::compute(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors_for_password() {
        let d = PasswordDigests::compute("password");
        assert_eq!(d.sha1, "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8");
        assert_eq!(
            d.sha256,
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert_eq!(d.md5, "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(d.sha512.len(), 128);
    }

    #[test]
    fn empty_password_is_hashed_too() {
        let d = PasswordDigests::compute("");
        assert_eq!(d.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(d.sha1, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn deterministic_and_distinct() {
        assert_eq!(
            PasswordDigests::compute("pw1"),
            PasswordDigests::compute("pw1")
        );
        assert_ne!(
            PasswordDigests::compute("pw1").sha256,
            PasswordDigests::compute("pw2").sha256
        );
    }

    #[test]
    fn digests_cover_utf8_bytes_and_are_lowercase() {
        let d = PasswordDigests::compute("pässwörd");
        for h in [&d.sha1, &d.sha256, &d.sha512, &d.md5] {
            assert!(h.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
        assert_ne!(d, PasswordDigests::compute("passwort"));
    }
}
