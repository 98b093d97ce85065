//! Notification effects
//!
//! Notifications arrive through the same op queue as direct operations, so
//! their effects are serialized with everything else. Delivery order across
//! methods is not guaranteed by servers; every handler tolerates missing
//! threads and stale ids by logging and moving on.

use tether_core::{time::now_millis, ServerId, ThreadKey, ThreadStatus};
use tether_protocol::{Notification, ThreadItem};

use crate::messages::render_item;

use super::worker::Worker;

impl Worker {
    pub(super) async fn apply_notification(&mut self, server: ServerId, notification: Notification) {
        match notification {
            Notification::LoginCompleted {
                login_id,
                success,
                error,
            } => {
                if success {
                    tracing::info!("Login completed on {}", server);
                    if let Some(account) = self.accounts.get_mut(&server) {
                        account.pending_login_url = None;
                        account.pending_login_id = None;
                        account.last_error = None;
                    }
                    self.read_account(&server).await;
                } else {
                    tracing::warn!(
                        "Login {} on {} failed: {}",
                        login_id.as_deref().unwrap_or("<unknown>"),
                        server,
                        error.as_deref().unwrap_or("unspecified")
                    );
                    let account = self.accounts.entry(server).or_default();
                    account.last_error = error;
                }
            }

            Notification::AccountUpdated => {
                self.read_account(&server).await;
            }

            Notification::TurnStarted { thread_id, turn_id } => {
                let key = ThreadKey::new(server, thread_id);
                match self.threads.get_mut(&key) {
                    Some(thread) => {
                        thread.status = ThreadStatus::Thinking;
                        if turn_id.is_some() {
                            thread.active_turn = turn_id;
                        }
                        thread.touch(now_millis());
                    }
                    None => tracing::debug!("turn/started for unknown thread {}", key),
                }
            }

            Notification::AgentMessageDelta { thread_id, delta } => {
                let Some(key) = self.resolve_thread(&server, thread_id) else {
                    tracing::debug!("Delta with no resolvable thread on {}", server);
                    return;
                };
                if let Some(thread) = self.threads.get_mut(&key) {
                    thread.append_delta(&delta, now_millis());
                }
            }

            Notification::ItemCompleted { thread_id, item } => {
                let Some(key) = self.resolve_thread(&server, thread_id) else {
                    tracing::debug!("item/completed with no resolvable thread on {}", server);
                    return;
                };
                let Some(item) = ThreadItem::from_value(&item) else {
                    tracing::trace!("Dropping unrecognized completed item on {}", key);
                    return;
                };
                // Direct message items are carried by the optimistic-echo and
                // delta paths; rendering them here would duplicate
                if matches!(
                    item,
                    ThreadItem::AgentMessage { .. } | ThreadItem::UserMessage { .. }
                ) {
                    return;
                }
                if let Some(message) = render_item(&item, now_millis()) {
                    if let Some(thread) = self.threads.get_mut(&key) {
                        thread.push_message(message);
                    }
                }
            }

            Notification::TurnCompleted { thread_id, .. } => match thread_id {
                Some(thread_id) => {
                    let key = ThreadKey::new(server, thread_id);
                    if !self.finalize_thread(&key) {
                        tracing::debug!("turn/completed for unknown thread {}", key);
                    }
                }
                None => {
                    // Ambiguous server behavior: no thread named. Best effort
                    // is to finalize every thread on that server believed to
                    // have an active turn; keep it observable.
                    let keys: Vec<ThreadKey> = self
                        .threads
                        .values()
                        .filter(|t| t.key.server == server && t.active_turn.is_some())
                        .map(|t| t.key.clone())
                        .collect();
                    tracing::warn!(
                        "turn/completed without thread id from {}; finalizing {} active thread(s)",
                        server,
                        keys.len()
                    );
                    for key in keys {
                        self.finalize_thread(&key);
                    }
                }
            },
        }
    }

    /// Resolve the thread a thread-less notification refers to: the explicit
    /// id when given, else the most recent thread on that server with a turn
    /// in flight
    fn resolve_thread(&self, server: &ServerId, thread_id: Option<String>) -> Option<ThreadKey> {
        if let Some(thread_id) = thread_id {
            return Some(ThreadKey::new(server.clone(), thread_id));
        }
        self.threads
            .values()
            .filter(|t| &t.key.server == server && t.active_turn.is_some())
            .max_by_key(|t| t.updated_at)
            .map(|t| t.key.clone())
    }

    /// Close out a turn: idempotent on an already-ready thread
    fn finalize_thread(&mut self, key: &ThreadKey) -> bool {
        match self.threads.get_mut(key) {
            Some(thread) => {
                thread.status = ThreadStatus::Ready;
                thread.active_turn = None;
                thread.finalize_streaming();
                thread.touch(now_millis());
                true
            }
            None => false,
        }
    }
}
