use crate::error::DbCredError;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use std::time::Duration;

/// Length of the random tail of every username. Never truncated.
pub const USERNAME_SUFFIX_LEN: usize = 20;
pub const MIN_PASSWORD_LEN: usize = 16;
/// Postgres' NAMEDATALEN - 1.
pub const DEFAULT_USERNAME_MAX_LEN: usize = 63;

const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SEPARATOR: char = '-';
const PASSWORD_ATTEMPTS: usize = 8;

/// Draw `len` characters uniformly from `charset` using the OS CSPRNG.
///
/// Bytes at or above the largest multiple of `charset.len()` are rejected so
/// every character is equally likely.
pub fn random_string(charset: &[u8], len: usize) -> Result<String, DbCredError> {
    if charset.is_empty() || charset.len() > 256 {
        return Err(DbCredError::generation("charset must hold 1..=256 symbols"));
    }
    let limit = 256 - (256 % charset.len());
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| DbCredError::generation(format!("entropy source failed: {e}")))?;
        for &b in buf.iter().filter(|&&b| (b as usize) < limit) {
            out.push(charset[b as usize % charset.len()] as char);
            if out.len() == len {
                break;
            }
        }
    }
    Ok(out)
}

/// Random lowercase token, used for username suffixes and lease ids.
pub fn random_token(len: usize) -> Result<String, DbCredError> {
    random_string(LOWER_ALNUM, len)
}

/// Lowercase and keep only `[a-z0-9_]`.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Identifier rules for generated usernames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernamePolicy {
    prefix: String,
    max_len: usize,
}

impl UsernamePolicy {
    pub fn new(prefix: &str, max_len: usize) -> Result<Self, DbCredError> {
        let prefix = sanitize(prefix);
        if !prefix.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(DbCredError::config(
                "username prefix must start with a letter",
            ));
        }
        Ok(Self { prefix, max_len })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Identifier grammar accepted for generated usernames:
    /// `^[a-z][a-z0-9_-]*$`, at most `max_len` bytes.
    pub fn is_valid(&self, username: &str) -> bool {
        let mut chars = username.chars();
        username.len() <= self.max_len
            && chars.next().is_some_and(|c| c.is_ascii_lowercase())
            && chars.all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == SEPARATOR
            })
    }
}

impl Default for UsernamePolicy {
    fn default() -> Self {
        Self {
            prefix: "v".to_string(),
            max_len: DEFAULT_USERNAME_MAX_LEN,
        }
    }
}

/// Produces the username, password and expiration for each credential.
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    username: UsernamePolicy,
    password_len: usize,
    default_ttl: Duration,
    max_ttl: Duration,
}

impl CredentialGenerator {
    pub fn new(
        username: UsernamePolicy,
        password_len: usize,
        default_ttl: Duration,
        max_ttl: Duration,
    ) -> Result<Self, DbCredError> {
        if password_len < MIN_PASSWORD_LEN {
            return Err(DbCredError::config(format!(
                "password length must be at least {MIN_PASSWORD_LEN}"
            )));
        }
        if default_ttl.is_zero() || default_ttl > max_ttl {
            return Err(DbCredError::config(
                "system default ttl must be non-zero and at most the max ttl",
            ));
        }
        TimeDelta::from_std(max_ttl)
            .map_err(|_| DbCredError::config("system max_ttl is out of range"))?;
        Ok(Self {
            username,
            password_len,
            default_ttl,
            max_ttl,
        })
    }

    pub fn username_policy(&self) -> &UsernamePolicy {
        &self.username
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// `prefix-role-hint-suffix`, truncating the hint before the role and
    /// never touching the random suffix.
    pub fn generate_username(
        &self,
        role_name: &str,
        display_name: &str,
    ) -> Result<String, DbCredError> {
        let prefix = &self.username.prefix;
        let fixed = prefix.len() + 1 + USERNAME_SUFFIX_LEN;
        if fixed > self.username.max_len {
            return Err(DbCredError::generation(format!(
                "username limit {} cannot hold prefix and {USERNAME_SUFFIX_LEN}-char suffix",
                self.username.max_len
            )));
        }
        let suffix = random_token(USERNAME_SUFFIX_LEN)?;

        // Each middle part costs its length plus one separator.
        let mut budget = self.username.max_len - fixed;
        let mut username = String::with_capacity(self.username.max_len);
        username.push_str(prefix);
        for part in [sanitize(role_name), sanitize(display_name)] {
            let take = part.len().min(budget.saturating_sub(1));
            if take == 0 {
                continue;
            }
            username.push(SEPARATOR);
            username.push_str(&part[..take]);
            budget -= take + 1;
        }
        username.push(SEPARATOR);
        username.push_str(&suffix);
        Ok(username)
    }

    /// Alphanumeric password with at least one lowercase, uppercase and
    /// digit character.
    pub fn generate_password(&self) -> Result<String, DbCredError> {
        for _ in 0..PASSWORD_ATTEMPTS {
            let candidate = random_string(ALNUM, self.password_len)?;
            if has_required_classes(&candidate) {
                return Ok(candidate);
            }
        }
        Err(DbCredError::generation(
            "could not produce a password with all character classes",
        ))
    }

    /// Zero falls back to the default, anything above the system max is clamped.
    pub fn effective_ttl(&self, ttl: Duration) -> Duration {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        ttl.min(self.max_ttl)
    }

    pub fn generate_expiration(&self, ttl: Duration) -> Result<DateTime<Utc>, DbCredError> {
        let delta = TimeDelta::from_std(self.effective_ttl(ttl))
            .map_err(|e| DbCredError::generation(format!("ttl out of range: {e}")))?;
        Utc::now()
            .checked_add_signed(delta)
            .ok_or_else(|| DbCredError::generation("expiration overflows the calendar"))
    }
}

fn has_required_classes(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Timestamp layout substituted for `{{expiration}}`.
pub fn format_expiration(expiration: DateTime<Utc>) -> String {
    expiration.format("%Y-%m-%d %H:%M:%S%z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_quotes_and_punctuation() {
        assert_eq!(sanitize("Alice O'Brien\"; DROP"), "aliceobriendrop");
        assert_eq!(sanitize("token-ci_bot"), "tokenci_bot");
    }

    #[test]
    fn rejection_sampling_stays_in_charset() {
        let s = random_string(b"ab", 500).unwrap();
        assert_eq!(s.len(), 500);
        assert!(s.chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn prefix_must_start_with_letter() {
        assert!(UsernamePolicy::new("9x", 63).is_err());
        assert!(UsernamePolicy::new("--", 63).is_err());
        assert_eq!(UsernamePolicy::new("V!", 63).unwrap().prefix(), "v");
    }
}
