//! End-to-end identity lifecycle against in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use notekeep_cache::MemoryCache;
use notekeep_mail::{DeliveryQueue, Email, MailError, MailTransport, RetryPolicy};
use notekeep_model::{Role, UserId, VerificationCode};
use notekeep_policy::{Enforcer, MemoryPolicyStore, PolicyError, PolicySet, PolicyStore};
use notekeep_session::{FixedClock, SessionConfig, SessionStore, TokenConfig, TokenService};
use notekeep_identity::{
    IdentityError, IdentityService, MemoryUserStore, PasswordConfig, PasswordHasher, ProfileUpdate,
    Registration, Verification,
};

// =========================================================================
// Harness
// =========================================================================

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Email>>,
}

impl Outbox {
    /// The code in the latest email sent to `to`.
    fn latest_code(&self, to: &str) -> Option<VerificationCode> {
        let sent = self.sent.lock().unwrap();
        let email = sent.iter().rev().find(|e| e.to == to)?;
        email.text.split_whitespace().last()?.parse().ok()
    }

    fn count(&self, to: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|e| e.to == to).count()
    }
}

impl MailTransport for Outbox {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Delegates to a seeded memory store but fails the first `failures`
/// saves.
struct FailingSaves {
    inner: MemoryPolicyStore,
    failures: AtomicUsize,
}

impl FailingSaves {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryPolicyStore::seeded(),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl PolicyStore for FailingSaves {
    async fn load(&self) -> Result<PolicySet, PolicyError> {
        self.inner.load().await
    }

    async fn save(&self, policy: &PolicySet) -> Result<(), PolicyError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PolicyError::Invalid("disk full".into()));
        }
        self.inner.save(policy).await
    }
}

type Service<P> = IdentityService<MemoryUserStore, MemoryCache, P, FixedClock>;

struct Harness<P = MemoryPolicyStore> {
    service: Service<P>,
    outbox: Arc<Outbox>,
    clock: FixedClock,
}

async fn harness() -> Harness {
    harness_with(MemoryPolicyStore::seeded()).await
}

async fn harness_with<P: PolicyStore>(policy: P) -> Harness<P> {
    let outbox = Arc::new(Outbox::default());
    let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let sessions = Arc::new(SessionStore::new(MemoryCache::new(), SessionConfig::default()));
    let (queue, _task) = DeliveryQueue::spawn(
        outbox.clone(),
        sessions.clone(),
        RetryPolicy::fixed(Duration::from_millis(5), Some(3)),
    );
    let tokens = TokenService::with_clock(
        &TokenConfig {
            secret: "test-secret".into(),
            ..TokenConfig::default()
        },
        clock.clone(),
    )
    .unwrap();
    let enforcer = Arc::new(Enforcer::load(policy).await.unwrap());
    let hasher = PasswordHasher::new(&PasswordConfig::insecure_fast()).unwrap();

    Harness {
        service: IdentityService::new(MemoryUserStore::new(), sessions, tokens, queue, enforcer, hasher),
        outbox,
        clock,
    }
}

fn registration(username: &str) -> Registration {
    Registration {
        first_name: "First".into(),
        last_name: "Last".into(),
        email: format!("{username}@example.com"),
        username: username.into(),
        password: format!("{username}-pw"),
    }
}

async fn wait_for_code(outbox: &Outbox, to: &str, emails: usize) -> VerificationCode {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if outbox.count(to) >= emails {
                if let Some(code) = outbox.latest_code(to) {
                    return code;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("verification email never arrived")
}

fn other_code(code: VerificationCode) -> VerificationCode {
    VerificationCode::new((code.value() + 1) % 1_000_000).unwrap()
}

// =========================================================================
// Registration and verification
// =========================================================================

#[tokio::test]
async fn test_register_then_verify_grants_user_role_and_allows_login() {
    let h = harness().await;

    let registered = h.service.register(registration("alice")).await.unwrap();
    assert!(!registered.user.is_verified);
    assert_eq!(registered.user.role, "user");

    let code = wait_for_code(&h.outbox, "alice@example.com", 1).await;
    let outcome = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();

    assert_eq!(outcome, Verification::Verified);
    assert!(h.service.enforcer().enforce_subject("alice", "/notes/7", "DELETE"));

    let session = h.service.sessions().get("alice").await.unwrap();
    assert!(session.is_verified);
    assert_eq!(session.code, None);

    let logged_in = h.service.login("alice", "alice-pw").await.unwrap();
    assert!(logged_in.user.is_verified);
    assert_eq!(h.service.authenticate(&logged_in.token).await.unwrap().username, "alice");
}

#[tokio::test]
async fn test_submit_wrong_code_leaves_session_pending() {
    let h = harness().await;
    let registered = h.service.register(registration("bob")).await.unwrap();
    let code = wait_for_code(&h.outbox, "bob@example.com", 1).await;

    let err = h
        .service
        .submit_verification_code(&registered.token, other_code(code))
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCode));
    assert!(!h.service.enforcer().enforce_subject("bob", "/notes", "GET"));

    let outcome = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();
    assert_eq!(outcome, Verification::Verified);
}

#[tokio::test]
async fn test_submit_after_verification_returns_already_verified() {
    let h = harness().await;
    let registered = h.service.register(registration("carol")).await.unwrap();
    let code = wait_for_code(&h.outbox, "carol@example.com", 1).await;
    h.service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();

    // Any code, right or wrong, once verified.
    let again = h
        .service
        .submit_verification_code(&registered.token, other_code(code))
        .await
        .unwrap();

    assert_eq!(again, Verification::AlreadyVerified);
}

#[tokio::test]
async fn test_submit_retry_after_failed_grant_completes_verification() {
    let h = harness_with(FailingSaves::new(1)).await;
    let registered = h.service.register(registration("gus")).await.unwrap();
    let code = wait_for_code(&h.outbox, "gus@example.com", 1).await;

    let err = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Internal(_)));
    assert!(!h.service.enforcer().enforce_subject("gus", "/notes", "GET"));

    let outcome = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();

    assert_eq!(outcome, Verification::Verified);
    assert!(h.service.enforcer().enforce_subject("gus", "/notes", "GET"));
}

#[tokio::test]
async fn test_submit_after_failed_grant_and_lapsed_session_grants_role() {
    let h = harness_with(FailingSaves::new(1)).await;
    let registered = h.service.register(registration("hal")).await.unwrap();
    let code = wait_for_code(&h.outbox, "hal@example.com", 1).await;
    assert!(h.service.submit_verification_code(&registered.token, code).await.is_err());

    h.service.sessions().remove("hal").await.unwrap();
    let outcome = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();

    assert_eq!(outcome, Verification::AlreadyVerified);
    assert!(h.service.enforcer().enforce_subject("hal", "/notes/1", "PATCH"));
}

#[tokio::test]
async fn test_submit_with_lapsed_session_returns_not_found() {
    let h = harness().await;
    let registered = h.service.register(registration("dave")).await.unwrap();
    let code = wait_for_code(&h.outbox, "dave@example.com", 1).await;
    h.service.sessions().remove("dave").await.unwrap();

    let err = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::NotFound(_)));
}

#[tokio::test]
async fn test_register_duplicate_username_is_rejected() {
    let h = harness().await;
    h.service.register(registration("erin")).await.unwrap();

    let mut again = registration("erin");
    again.email = "erin2@example.com".into();
    let err = h.service.register(again).await.unwrap_err();

    assert!(matches!(err, IdentityError::Duplicate { ref field } if field == "username"));
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn test_resend_code_replaces_pending_code() {
    let h = harness().await;
    let registered = h.service.register(registration("frank")).await.unwrap();
    let first = wait_for_code(&h.outbox, "frank@example.com", 1).await;

    h.service.resend_code(&registered.token).await.unwrap();
    let second = wait_for_code(&h.outbox, "frank@example.com", 2).await;

    if first != second {
        let err = h
            .service
            .submit_verification_code(&registered.token, first)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCode));
    }
    let outcome = h
        .service
        .submit_verification_code(&registered.token, second)
        .await
        .unwrap();
    assert_eq!(outcome, Verification::Verified);

    let err = h.service.resend_code(&registered.token).await.unwrap_err();
    assert!(matches!(err, IdentityError::AlreadyVerified));
}

// =========================================================================
// Login and tokens
// =========================================================================

#[tokio::test]
async fn test_login_keeps_sent_flag_and_clears_code() {
    let h = harness().await;
    let registered = h.service.register(registration("ned")).await.unwrap();
    let code = wait_for_code(&h.outbox, "ned@example.com", 1).await;
    h.service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !h.service.sessions().get("ned").await.unwrap().is_sent {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("sent flag never set");

    h.service.login("ned", "ned-pw").await.unwrap();

    let session = h.service.sessions().get("ned").await.unwrap();
    assert!(session.is_sent);
    assert!(session.is_verified);
    assert_eq!(session.code, None);
}

#[tokio::test]
async fn test_login_without_live_session_starts_one() {
    let h = harness().await;
    let registered = h.service.register(registration("oli")).await.unwrap();
    let code = wait_for_code(&h.outbox, "oli@example.com", 1).await;
    h.service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();
    h.service.sessions().remove("oli").await.unwrap();

    h.service.login("oli", "oli-pw").await.unwrap();

    let session = h.service.sessions().get("oli").await.unwrap();
    assert!(session.is_verified);
    assert_eq!(session.code, None);
}

#[tokio::test]
async fn test_login_unverified_returns_authorization_error() {
    let h = harness().await;
    h.service.register(registration("gina")).await.unwrap();

    let err = h.service.login("gina", "gina-pw").await.unwrap_err();

    assert!(matches!(err, IdentityError::Authorization(_)));
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_login_wrong_password_or_unknown_user_is_authentication_error() {
    let h = harness().await;
    h.service.register(registration("hank")).await.unwrap();

    let wrong = h.service.login("hank", "nope").await.unwrap_err();
    let unknown = h.service.login("nobody", "nope").await.unwrap_err();

    assert!(matches!(wrong, IdentityError::Authentication(_)));
    assert!(matches!(unknown, IdentityError::Authentication(_)));
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn test_expired_token_cannot_submit_code() {
    let h = harness().await;
    let registered = h.service.register(registration("ivy")).await.unwrap();
    let code = wait_for_code(&h.outbox, "ivy@example.com", 1).await;

    h.clock.advance(Duration::from_secs(31 * 60));
    let err = h
        .service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::Authentication(_)));
}

// =========================================================================
// Administration
// =========================================================================

#[tokio::test]
async fn test_deactivate_blocks_login_and_activate_restores_it() {
    let h = harness().await;
    let registered = h.service.register(registration("jack")).await.unwrap();
    let code = wait_for_code(&h.outbox, "jack@example.com", 1).await;
    h.service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();

    let view = h.service.deactivate(registered.user.id).await.unwrap();
    assert!(!view.is_active);
    assert!(!h.service.sessions().get("jack").await.unwrap().is_active);
    assert!(matches!(
        h.service.login("jack", "jack-pw").await,
        Err(IdentityError::Authorization(_))
    ));

    h.service.activate(registered.user.id).await.unwrap();
    assert!(h.service.login("jack", "jack-pw").await.is_ok());
}

#[tokio::test]
async fn test_update_profile_rename_moves_role_grant() {
    let h = harness().await;
    let registered = h.service.register(registration("kim")).await.unwrap();
    let code = wait_for_code(&h.outbox, "kim@example.com", 1).await;
    h.service
        .submit_verification_code(&registered.token, code)
        .await
        .unwrap();

    let view = h
        .service
        .update_profile(
            registered.user.id,
            ProfileUpdate {
                first_name: "Kim".into(),
                last_name: "Lee".into(),
                email: "kim@example.com".into(),
                username: "kimlee".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(view.username, "kimlee");
    assert!(h.service.enforcer().enforce_subject("kimlee", "/notes", "GET"));
    assert!(h.service.sessions().get("kim").await.is_err());
    assert!(h.service.login("kimlee", "kim-pw").await.is_ok());
}

#[tokio::test]
async fn test_user_detail_and_list() {
    let h = harness().await;
    h.service.register(registration("lou")).await.unwrap();
    h.service.register(registration("max")).await.unwrap();

    let all = h.service.list_users().await.unwrap();
    assert_eq!(
        all.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(),
        ["lou", "max"]
    );

    let max = h.service.user_detail(UserId(2)).await.unwrap();
    assert_eq!(max.email, "max@example.com");
    assert_eq!(max.role, Role::User.as_str());

    let err = h.service.user_detail(UserId(99)).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}
