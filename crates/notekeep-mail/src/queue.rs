//! The delivery worker: one Tokio task that owns every pending ticket.
//!
//! Request handlers never touch the ticket list. They send an
//! `Enqueue` command down an unbounded channel and return at once; the
//! worker is the only code that reads or mutates the list, so there is
//! nothing to lock.
//!
//! The worker sleeps until either a command arrives or the head ticket
//! becomes due. An idle queue costs nothing, and a failing mail API is
//! retried on the [`RetryPolicy`] curve rather than in a tight loop.

use std::collections::VecDeque;
use std::sync::Arc;

use notekeep_cache::CacheBackend;
use notekeep_model::{Codec, Session};
use notekeep_session::{SessionError, SessionStore};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::{MailError, MailTransport, RetryPolicy, verification_email};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Counters describing what the worker has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tickets still waiting (including one in backoff at the head).
    pub pending: usize,
    /// Emails sent and recorded as sent in the session store.
    pub delivered: u64,
    /// Tickets dropped because their session lapsed before the sent
    /// flag could be written.
    pub expired: u64,
    /// Tickets given up on after `max_attempts`.
    pub dead_lettered: u64,
}

/// A ticket the worker stopped retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub session: Session,
    pub attempts: u32,
    /// Whether the email itself went out (only the session write failed).
    pub dispatched: bool,
    pub last_error: String,
}

/// Commands sent to the worker. Variants with a `reply` are requests;
/// the worker answers on the oneshot.
enum QueueCommand {
    Enqueue(Session),
    Stats { reply: oneshot::Sender<QueueStats> },
    DeadLetters { reply: oneshot::Sender<Vec<DeadLetter>> },
    Shutdown { reply: oneshot::Sender<QueueStats> },
}

/// Handle to the delivery worker. Cheap to clone.
///
/// When every handle is dropped the worker finishes the tickets it
/// still holds and then exits. [`shutdown`](Self::shutdown) stops it
/// immediately instead.
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: mpsc::UnboundedSender<QueueCommand>,
}

impl DeliveryQueue {
    /// Starts the worker and returns a handle to it plus the task's
    /// join handle.
    ///
    /// The policy is passed through [`RetryPolicy::validated`].
    pub fn spawn<T, C, K>(
        transport: T,
        sessions: Arc<SessionStore<C, K>>,
        policy: RetryPolicy,
    ) -> (Self, JoinHandle<()>)
    where
        T: MailTransport,
        C: CacheBackend,
        K: Codec,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            transport,
            sessions,
            policy: policy.validated(),
            tickets: VecDeque::new(),
            dead_letters: Vec::new(),
            counters: QueueStats::default(),
            receiver,
        };
        let task = tokio::spawn(worker.run());
        (Self { sender }, task)
    }

    /// Hands a session to the worker. Never waits on delivery.
    ///
    /// If the same username already has a ticket whose email has not
    /// gone out yet, that ticket takes over this session (the newest
    /// code wins) instead of a second email being queued.
    ///
    /// # Errors
    /// [`MailError::QueueClosed`] if the worker has stopped.
    pub fn enqueue(&self, session: Session) -> Result<(), MailError> {
        self.sender
            .send(QueueCommand::Enqueue(session))
            .map_err(|_| MailError::QueueClosed)
    }

    /// Current counters.
    pub async fn stats(&self) -> Result<QueueStats, MailError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(QueueCommand::Stats { reply })
            .map_err(|_| MailError::QueueClosed)?;
        rx.await.map_err(|_| MailError::QueueClosed)
    }

    /// Tickets that ran out of attempts, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, MailError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(QueueCommand::DeadLetters { reply })
            .map_err(|_| MailError::QueueClosed)?;
        rx.await.map_err(|_| MailError::QueueClosed)
    }

    /// Stops the worker after the attempt in flight (if any) and returns
    /// the final counters. Pending tickets are abandoned.
    pub async fn shutdown(&self) -> Result<QueueStats, MailError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(QueueCommand::Shutdown { reply })
            .map_err(|_| MailError::QueueClosed)?;
        rx.await.map_err(|_| MailError::QueueClosed)
    }

    /// Whether the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketState {
    /// The email has not been accepted by the transport yet.
    Pending,
    /// The email went out; only the session write remains.
    Dispatched,
}

struct Ticket {
    session: Session,
    state: TicketState,
    attempts: u32,
    not_before: Instant,
    last_error: Option<String>,
}

impl Ticket {
    fn new(session: Session) -> Self {
        Self {
            session,
            state: TicketState::Pending,
            attempts: 0,
            not_before: Instant::now(),
            last_error: None,
        }
    }
}

struct Worker<T, C, K> {
    transport: T,
    sessions: Arc<SessionStore<C, K>>,
    policy: RetryPolicy,
    /// FIFO. Only the head is ever attempted; a failing head is retried
    /// in place.
    tickets: VecDeque<Ticket>,
    dead_letters: Vec<DeadLetter>,
    /// `pending` is always 0 here; see `stats()`.
    counters: QueueStats,
    receiver: mpsc::UnboundedReceiver<QueueCommand>,
}

impl<T: MailTransport, C: CacheBackend, K: Codec> Worker<T, C, K> {
    async fn run(mut self) {
        info!(max_attempts = ?self.policy.max_attempts, "delivery worker started");
        let mut inbox_open = true;

        loop {
            if !inbox_open && self.tickets.is_empty() {
                break;
            }
            let due = self.tickets.front().map(|t| t.not_before);

            tokio::select! {
                biased;

                cmd = self.receiver.recv(), if inbox_open => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    None => {
                        debug!(pending = self.tickets.len(), "all queue handles dropped, draining");
                        inbox_open = false;
                    }
                },

                () = wait_until(due) => self.attempt_head().await,
            }
        }

        let stats = self.stats();
        info!(
            delivered = stats.delivered,
            expired = stats.expired,
            dead_lettered = stats.dead_lettered,
            "delivery worker stopped"
        );
    }

    /// Returns `false` when the worker should stop.
    fn handle_command(&mut self, cmd: QueueCommand) -> bool {
        match cmd {
            QueueCommand::Enqueue(session) => self.push(session),
            QueueCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            QueueCommand::DeadLetters { reply } => {
                let _ = reply.send(self.dead_letters.clone());
            }
            QueueCommand::Shutdown { reply } => {
                if !self.tickets.is_empty() {
                    warn!(abandoned = self.tickets.len(), "delivery queue shut down with pending tickets");
                }
                let _ = reply.send(self.stats());
                return false;
            }
        }
        true
    }

    fn push(&mut self, session: Session) {
        if session.code.is_none() {
            warn!(username = %session.username, "session has no pending code, not queued");
            return;
        }

        let undispatched = self.tickets.iter_mut().find(|t| {
            t.state == TicketState::Pending && t.session.username == session.username
        });
        if let Some(ticket) = undispatched {
            debug!(username = %session.username, "replacing session of undispatched ticket");
            ticket.session = session;
            return;
        }

        debug!(username = %session.username, queued = self.tickets.len() + 1, "ticket queued");
        self.tickets.push_back(Ticket::new(session));
    }

    /// One attempt on the head ticket: send the email if it hasn't gone
    /// out yet, then record `sent` in the session store.
    async fn attempt_head(&mut self) {
        let Some(ticket) = self.tickets.front_mut() else {
            return;
        };
        ticket.attempts += 1;

        if ticket.state == TicketState::Pending {
            let Some(email) = verification_email(&ticket.session) else {
                self.tickets.pop_front();
                return;
            };
            trace!(username = %ticket.session.username, attempt = ticket.attempts, "sending verification email");

            if let Err(e) = self.transport.send(&email).await {
                self.retry_head(e.to_string());
                return;
            }
            ticket.state = TicketState::Dispatched;
            info!(username = %ticket.session.username, attempt = ticket.attempts, "verification code sent");
        }

        let result = self
            .sessions
            .mark_sent(&ticket.session.username, ticket.session.code)
            .await;

        match result {
            Ok(_) => {
                debug!(username = %ticket.session.username, "session marked sent");
                self.tickets.pop_front();
                self.counters.delivered += 1;
            }
            Err(SessionError::NotFound(username)) => {
                warn!(%username, "session expired before delivery was recorded, dropping ticket");
                self.tickets.pop_front();
                self.counters.expired += 1;
            }
            Err(e) => self.retry_head(e.to_string()),
        }
    }

    /// Schedules the head ticket's next attempt, or dead-letters it if
    /// it is out of attempts.
    fn retry_head(&mut self, error: String) {
        let Some(ticket) = self.tickets.front_mut() else {
            return;
        };

        if self.policy.exhausted(ticket.attempts) {
            error!(
                username = %ticket.session.username,
                attempts = ticket.attempts,
                error = %error,
                "delivery failed permanently, moving ticket to dead letters"
            );
            if let Some(ticket) = self.tickets.pop_front() {
                self.dead_letters.push(DeadLetter {
                    session: ticket.session,
                    attempts: ticket.attempts,
                    dispatched: ticket.state == TicketState::Dispatched,
                    last_error: error,
                });
                self.counters.dead_lettered += 1;
            }
            return;
        }

        let delay = self.policy.delay(ticket.attempts);
        ticket.not_before = Instant::now() + delay;
        warn!(
            username = %ticket.session.username,
            attempt = ticket.attempts,
            dispatched = ticket.state == TicketState::Dispatched,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "delivery attempt failed, will retry"
        );
        ticket.last_error = Some(error);
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.tickets.len(),
            ..self.counters
        }
    }
}

/// Resolves at `due`, or never when there is nothing to wait for.
async fn wait_until(due: Option<Instant>) {
    match due {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
