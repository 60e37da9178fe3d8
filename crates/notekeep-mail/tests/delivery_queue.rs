//! Integration tests for the delivery queue against a recording transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notekeep_cache::MemoryCache;
use notekeep_mail::{DeliveryQueue, Email, MailError, MailTransport, QueueStats, RetryPolicy};
use notekeep_model::{Role, Session, UserId, VerificationCode};
use notekeep_session::{SessionConfig, SessionStore};

// =========================================================================
// Fakes
// =========================================================================

/// Always succeeds and counts sends per recipient.
#[derive(Default)]
struct RecordingTransport {
    sends: Mutex<HashMap<String, usize>>,
}

impl RecordingTransport {
    fn count(&self, to: &str) -> usize {
        self.sends.lock().unwrap().get(to).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.sends.lock().unwrap().values().sum()
    }
}

impl MailTransport for RecordingTransport {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        // Give other tasks a chance to enqueue while a send is in flight.
        tokio::task::yield_now().await;
        *self.sends.lock().unwrap().entry(email.to.clone()).or_default() += 1;
        Ok(())
    }
}

fn pending(username: &str, code: u32) -> Session {
    Session::pending(
        UserId(i64::from(code)),
        username,
        format!("{username}@example.com"),
        Role::User,
        VerificationCode::new(code).unwrap(),
    )
}

async fn wait_for_delivered(queue: &DeliveryQueue, expected: u64) -> QueueStats {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let stats = queue.stats().await.unwrap();
            if stats.delivered >= expected && stats.pending == 0 {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue did not drain in time")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_during_backlog_delivers_each_exactly_once() {
    let sessions = Arc::new(SessionStore::new(MemoryCache::new(), SessionConfig::default()));
    let transport = Arc::new(RecordingTransport::default());
    let (queue, _task) = DeliveryQueue::spawn(
        Arc::clone(&transport),
        Arc::clone(&sessions),
        RetryPolicy::default(),
    );

    // A backlog for the worker to chew on.
    for i in 0..50u32 {
        let session = pending(&format!("backlog{i}"), i);
        sessions.put(&session).await.unwrap();
        queue.enqueue(session).unwrap();
    }

    // Two registrations arriving from different tasks mid-drain.
    let mut handles = Vec::new();
    for (name, code) in [("alice", 482913), ("bob", 117)] {
        let queue = queue.clone();
        let sessions = Arc::clone(&sessions);
        handles.push(tokio::spawn(async move {
            let session = pending(name, code);
            sessions.put(&session).await.unwrap();
            queue.enqueue(session).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = wait_for_delivered(&queue, 52).await;

    assert_eq!(stats.delivered, 52);
    assert_eq!(transport.count("alice@example.com"), 1);
    assert_eq!(transport.count("bob@example.com"), 1);
    assert_eq!(transport.total(), 52);
    assert!(sessions.get("alice").await.unwrap().is_sent);
    assert!(sessions.get("bob").await.unwrap().is_sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_producers_lose_no_tickets() {
    let sessions = Arc::new(SessionStore::new(MemoryCache::new(), SessionConfig::default()));
    let transport = Arc::new(RecordingTransport::default());
    let (queue, _task) = DeliveryQueue::spawn(
        Arc::clone(&transport),
        Arc::clone(&sessions),
        RetryPolicy::default(),
    );

    let mut handles = Vec::new();
    for producer in 0..8u32 {
        let queue = queue.clone();
        let sessions = Arc::clone(&sessions);
        handles.push(tokio::spawn(async move {
            for i in 0..10u32 {
                let session = pending(&format!("p{producer}u{i}"), producer * 100 + i);
                sessions.put(&session).await.unwrap();
                queue.enqueue(session).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    wait_for_delivered(&queue, 80).await;

    assert_eq!(transport.total(), 80);
    for producer in 0..8u32 {
        for i in 0..10u32 {
            let to = format!("p{producer}u{i}@example.com");
            assert_eq!(transport.count(&to), 1, "{to} not sent exactly once");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_delivery_after_verification_still_marks_session_sent() {
    // The user verified (code cleared) before the worker got to the
    // ticket. The email goes out and both flags end up set.
    let sessions = Arc::new(SessionStore::new(MemoryCache::new(), SessionConfig::default()));
    let transport = Arc::new(RecordingTransport::default());
    let session = pending("carol", 5);
    sessions.put(&session).await.unwrap();
    sessions.mark_verified("carol").await.unwrap();

    let (queue, _task) = DeliveryQueue::spawn(
        Arc::clone(&transport),
        Arc::clone(&sessions),
        RetryPolicy::default(),
    );
    queue.enqueue(session).unwrap();
    let stats = wait_for_delivered(&queue, 1).await;

    assert_eq!(stats.delivered, 1);
    let stored = sessions.get("carol").await.unwrap();
    assert!(stored.is_verified);
    assert!(stored.is_sent);
}
