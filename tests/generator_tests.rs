mod common;

use chrono::Utc;
use dyncreds::DbCredError;
use dyncreds::service::credential_gen::USERNAME_SUFFIX_LEN;
use dyncreds::service::{CredentialGenerator, UsernamePolicy};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn suffix_of(username: &str) -> &str {
    username.rsplit('-').next().unwrap()
}

#[test]
fn usernames_follow_identifier_grammar() {
    let generator = common::generator();
    let policy = generator.username_policy();
    let hints = [
        "alice",
        "",
        "Robert'); DROP TABLE students;--",
        "ÜnïcødeNåme",
        "token-ci_bot@example.com",
        "\"quoted\"",
    ];
    for hint in hints {
        let username = generator.generate_username("app", hint).unwrap();
        assert!(policy.is_valid(&username), "{username:?} from {hint:?}");
        assert!(!username.contains('\''));
        assert!(!username.contains('"'));
        assert_eq!(suffix_of(&username).len(), USERNAME_SUFFIX_LEN);
    }
}

#[test]
fn long_hints_are_truncated_before_the_suffix() {
    let generator = common::generator();
    let hint = "x".repeat(200);
    let username = generator.generate_username("reporting", &hint).unwrap();

    assert_eq!(username.len(), 63);
    assert!(username.starts_with("v-reporting-xxx"));
    let suffix = suffix_of(&username);
    assert_eq!(suffix.len(), USERNAME_SUFFIX_LEN);
    assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
}

#[test]
fn role_is_truncated_only_after_hint_is_gone() {
    let policy = UsernamePolicy::new("v", 30).unwrap();
    let generator =
        CredentialGenerator::new(policy, 32, Duration::from_secs(60), Duration::from_secs(120))
            .unwrap();
    let username = generator
        .generate_username("averyveryverylongrolename", "alice")
        .unwrap();
    // 30 - "v-" - "-" - 20 = 7 chars left for the role, nothing for the hint.
    assert!(username.starts_with("v-averyve-"), "{username}");
    assert_eq!(username.len(), 30);
}

#[test]
fn limit_too_small_for_suffix_fails() {
    let policy = UsernamePolicy::new("v", 10).unwrap();
    let generator =
        CredentialGenerator::new(policy, 32, Duration::from_secs(60), Duration::from_secs(120))
            .unwrap();
    let err = generator.generate_username("app", "alice").unwrap_err();
    assert!(matches!(err, DbCredError::Generation(_)));

    let exact = UsernamePolicy::new("v", 2 + USERNAME_SUFFIX_LEN).unwrap();
    let generator =
        CredentialGenerator::new(exact, 32, Duration::from_secs(60), Duration::from_secs(120))
            .unwrap();
    let username = generator.generate_username("app", "alice").unwrap();
    assert_eq!(username.len(), 2 + USERNAME_SUFFIX_LEN);
    assert!(username.starts_with("v-"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_thousand_concurrent_usernames_are_distinct() {
    const N: usize = 10_000;
    let generator = Arc::new(common::generator());

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..N {
        let generator = generator.clone();
        tasks.spawn(async move { generator.generate_username("app", "alice") });
    }

    let mut seen = HashSet::with_capacity(N);
    while let Some(res) = tasks.join_next().await {
        let username = res.expect("task").expect("username");
        assert!(seen.insert(username), "duplicate username generated");
    }
    assert_eq!(seen.len(), N);
}

#[test]
fn passwords_meet_complexity() {
    let generator = common::generator();
    let mut seen = HashSet::new();
    for _ in 0..200 {
        let password = generator.generate_password().unwrap();
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(seen.insert(password));
    }
}

#[test]
fn short_password_length_is_rejected() {
    let err = CredentialGenerator::new(
        UsernamePolicy::default(),
        8,
        Duration::from_secs(60),
        Duration::from_secs(120),
    )
    .unwrap_err();
    assert!(matches!(err, DbCredError::Config(_)));
}

#[test]
fn expiration_uses_default_and_is_clamped() {
    let generator = common::generator();

    let now = Utc::now();
    let exp = generator.generate_expiration(Duration::ZERO).unwrap();
    let diff = (exp - (now + chrono::Duration::hours(1))).num_seconds().abs();
    assert!(diff <= 2);

    let exp = generator
        .generate_expiration(Duration::from_secs(90 * 24 * 3600))
        .unwrap();
    assert!(exp <= Utc::now() + chrono::Duration::hours(24));

    assert_eq!(
        generator.effective_ttl(Duration::from_secs(30)),
        Duration::from_secs(30)
    );
}
