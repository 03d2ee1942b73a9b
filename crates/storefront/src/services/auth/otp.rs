//! In-memory one-time codes.
//!
//! Codes live in a `moka` cache keyed by `(purpose, email)`. Each entry
//! carries its own deadline: rewriting an entry after a wrong guess resets
//! moka's TTL clock, so expiry is checked against `expires_at` and the cache
//! TTL only bounds memory. Only a SHA-256 digest of each code is kept.

use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::ops::compute::Op;
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use aurum_core::Email;

/// Wrong guesses allowed before a code is thrown away.
pub const MAX_ATTEMPTS: u32 = 5;

/// Minimum gap between two codes for the same email and purpose.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

/// What a code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    Verify,
    ResetPassword,
}

/// Why a code was not accepted or issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("no active code, request a new one")]
    NotFound,
    #[error("code has expired, request a new one")]
    Expired,
    #[error("incorrect code, {remaining} attempts left")]
    Invalid { remaining: u32 },
    #[error("too many incorrect attempts, request a new one")]
    TooManyAttempts,
    #[error("please wait {retry_after_secs} seconds before requesting another code")]
    Cooldown { retry_after_secs: u64 },
}

#[derive(Debug, Clone)]
struct OtpEntry {
    digest: [u8; 32],
    attempts: u32,
    issued_at: Instant,
    expires_at: Instant,
}

/// Process-local store of outstanding codes.
#[derive(Clone)]
pub struct OtpStore {
    cache: Cache<(OtpPurpose, Email), OtpEntry>,
    ttl: Duration,
    cooldown: Duration,
}

impl OtpStore {
    /// Create a store whose codes live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_cooldown(ttl, RESEND_COOLDOWN)
    }

    /// Create a store with a custom resend cooldown.
    #[must_use]
    pub fn with_cooldown(ttl: Duration, cooldown: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl.max(cooldown))
                .build(),
            ttl,
            cooldown,
        }
    }

    /// Code lifetime, for telling users how long they have.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh six-digit code, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Cooldown`] if a code was issued less than the
    /// cooldown ago.
    pub async fn issue(&self, purpose: OtpPurpose, email: &Email) -> Result<String, OtpError> {
        let now = Instant::now();
        let code = generate_code();
        let code_digest = digest(&code);
        let mut outcome = Ok(code);
        let ttl = self.ttl;
        let cooldown = self.cooldown;

        self.cache
            .entry((purpose, email.clone()))
            .and_compute_with(|existing| {
                let since_last = existing.map(|e| now.saturating_duration_since(e.into_value().issued_at));
                let op = match since_last {
                    Some(elapsed) if elapsed < cooldown => {
                        outcome = Err(OtpError::Cooldown {
                            retry_after_secs: (cooldown - elapsed).as_secs().max(1),
                        });
                        Op::Nop
                    }
                    _ => Op::Put(OtpEntry {
                        digest: code_digest,
                        attempts: 0,
                        issued_at: now,
                        expires_at: now + ttl,
                    }),
                };
                std::future::ready(op)
            })
            .await;

        outcome
    }

    /// Check a code. A correct code is consumed.
    ///
    /// # Errors
    ///
    /// Returns an [`OtpError`] describing why the code was rejected.
    pub async fn verify(
        &self,
        purpose: OtpPurpose,
        email: &Email,
        code: &str,
    ) -> Result<(), OtpError> {
        let now = Instant::now();
        let submitted = digest(code.trim());
        let mut outcome = Err(OtpError::NotFound);

        self.cache
            .entry((purpose, email.clone()))
            .and_compute_with(|existing| {
                let op = match existing.map(moka::Entry::into_value) {
                    None => Op::Nop,
                    Some(entry) if now >= entry.expires_at => {
                        outcome = Err(OtpError::Expired);
                        Op::Remove
                    }
                    Some(entry) if constant_time_eq(&entry.digest, &submitted) => {
                        outcome = Ok(());
                        Op::Remove
                    }
                    Some(mut entry) => {
                        entry.attempts += 1;
                        if entry.attempts >= MAX_ATTEMPTS {
                            outcome = Err(OtpError::TooManyAttempts);
                            Op::Remove
                        } else {
                            outcome = Err(OtpError::Invalid {
                                remaining: MAX_ATTEMPTS - entry.attempts,
                            });
                            Op::Put(entry)
                        }
                    }
                };
                std::future::ready(op)
            })
            .await;

        outcome
    }
}

/// Six digits, leading zeros allowed.
fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

fn digest(code: &str) -> [u8; 32] {
    Sha256::digest(code.as_bytes()).into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email::parse("asha@example.com").unwrap()
    }

    fn store() -> OtpStore {
        OtpStore::with_cooldown(Duration::from_secs(600), Duration::ZERO)
    }

    #[test]
    fn test_generated_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_correct_code_is_consumed() {
        let store = store();
        let code = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        store.verify(OtpPurpose::Verify, &email(), &code).await.unwrap();
        assert_eq!(
            store.verify(OtpPurpose::Verify, &email(), &code).await,
            Err(OtpError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_only_digest_is_stored() {
        let store = store();
        let code = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        let entry = store.cache.get(&(OtpPurpose::Verify, email())).await.unwrap();
        assert_eq!(entry.digest, digest(&code));
        assert_ne!(&entry.digest[..code.len()], code.as_bytes());
    }

    #[tokio::test]
    async fn test_purposes_are_separate() {
        let store = store();
        let code = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        assert_eq!(
            store.verify(OtpPurpose::ResetPassword, &email(), &code).await,
            Err(OtpError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_five_wrong_attempts_invalidate_code() {
        let store = store();
        let code = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for remaining in (1..MAX_ATTEMPTS).rev() {
            assert_eq!(
                store.verify(OtpPurpose::Verify, &email(), wrong).await,
                Err(OtpError::Invalid { remaining })
            );
        }
        assert_eq!(
            store.verify(OtpPurpose::Verify, &email(), wrong).await,
            Err(OtpError::TooManyAttempts)
        );
        assert_eq!(
            store.verify(OtpPurpose::Verify, &email(), &code).await,
            Err(OtpError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let store = OtpStore::with_cooldown(Duration::from_millis(50), Duration::ZERO);
        let code = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let result = store.verify(OtpPurpose::Verify, &email(), &code).await;
        assert!(
            matches!(result, Err(OtpError::Expired | OtpError::NotFound)),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_resend_cooldown() {
        let store = OtpStore::new(Duration::from_secs(600));
        store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        let again = store.issue(OtpPurpose::Verify, &email()).await;
        assert!(matches!(again, Err(OtpError::Cooldown { .. })), "{again:?}");
    }

    #[tokio::test]
    async fn test_reissue_replaces_old_code() {
        let store = store();
        let first = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        let second = store.issue(OtpPurpose::Verify, &email()).await.unwrap();
        if first != second {
            assert!(matches!(
                store.verify(OtpPurpose::Verify, &email(), &first).await,
                Err(OtpError::Invalid { .. })
            ));
        }
        store.verify(OtpPurpose::Verify, &email(), &second).await.unwrap();
    }
}
