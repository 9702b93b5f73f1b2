use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const DEFAULT_ADMIN_ID: &str = "admin-001";
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const DEFAULT_ADMIN_NAME: &str = "System Administrator";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@system.com";

/// Lowercase hex SHA-256 of the password.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    hash_password(password) == stored_hash
}

/// `20YY-NN-NNNNN`, e.g. `2024-01-12345`.
pub fn is_registration_number(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 13 || !s.starts_with("20") {
        return false;
    }
    b.iter().enumerate().all(|(i, c)| match i {
        4 | 7 => *c == b'-',
        _ => c.is_ascii_digit(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub const TTL_HOURS: i64 = 1;

    pub fn issue(now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            expires_at: now + Duration::hours(Self::TTL_HOURS),
        }
    }
}

/// A stored expiry that does not parse counts as expired.
pub fn reset_token_expired(expires_at: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(t) => now > t.with_timezone(&Utc),
        Err(_) => true,
    }
}
