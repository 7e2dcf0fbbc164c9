//! Background writer for PAT `last_used_at`
//!
//! Authentication must not wait on a write, so touches are sent over a
//! channel to a worker thread. The worker coalesces bursts per token and
//! checks a connection out of the pool for each batch.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::db::{Database, RepoResult, Repos};

/// Commands understood by the worker
#[derive(Debug)]
enum TouchCommand {
    Touch { token_id: Uuid, at: DateTime<Utc> },
    /// Reply once everything queued before this has been written
    Flush(mpsc::Sender<()>),
    Stop,
}

/// Handle to the worker; dropping it drains the queue and joins the thread
pub struct TouchQueue {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: mpsc::Sender<TouchCommand>,
    running: Arc<AtomicBool>,
}

impl TouchQueue {
    pub fn start(db: Database) -> Self {
        let (command_tx, command_rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread_handle = thread::Builder::new()
            .name("reqhub-touch".to_string())
            .spawn(move || touch_thread(db, command_rx, thread_running))
            .map_err(|e| tracing::warn!(error = %e, "failed to start touch worker"))
            .ok();
        if thread_handle.is_none() {
            running.store(false, Ordering::SeqCst);
        }

        Self {
            thread_handle,
            command_tx,
            running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queues a `last_used_at` update; never blocks
    pub fn touch(&self, token_id: Uuid, at: DateTime<Utc>) {
        if self
            .command_tx
            .send(TouchCommand::Touch { token_id, at })
            .is_err()
        {
            tracing::warn!(%token_id, "touch worker stopped; dropping last_used_at update");
        }
    }

    /// Blocks until every queued touch is written; false if the worker is gone
    pub fn flush(&self) -> bool {
        let (done_tx, done_rx) = mpsc::channel();
        if self.command_tx.send(TouchCommand::Flush(done_tx)).is_err() {
            return false;
        }
        done_rx.recv().is_ok()
    }
}

impl Drop for TouchQueue {
    fn drop(&mut self) {
        let _ = self.command_tx.send(TouchCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

fn touch_thread(db: Database, command_rx: mpsc::Receiver<TouchCommand>, running: Arc<AtomicBool>) {
    let mut pending: HashMap<Uuid, DateTime<Utc>> = HashMap::new();

    while let Ok(first) = command_rx.recv() {
        let mut next = Some(first);
        let mut stop = false;
        let mut waiters = Vec::new();

        // Drain whatever else is already queued
        while let Some(command) = next.take() {
            match command {
                TouchCommand::Touch { token_id, at } => {
                    let entry = pending.entry(token_id).or_insert(at);
                    if at > *entry {
                        *entry = at;
                    }
                }
                TouchCommand::Flush(done) => waiters.push(done),
                TouchCommand::Stop => stop = true,
            }
            next = command_rx.try_recv().ok();
        }

        for (token_id, at) in pending.drain() {
            if let Err(err) = write_touch(&db, token_id, at) {
                tracing::warn!(%token_id, error = %err, "failed to update last_used_at");
            }
        }
        for done in waiters {
            let _ = done.send(());
        }
        if stop {
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
}

fn write_touch(db: &Database, token_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
    let conn = db.connection()?;
    let repos = Repos::new(&conn, db.dialect(), db.reference_strategy());
    repos.tokens().touch(token_id, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Cancellation;
    use crate::db::test_support::test_db;
    use crate::db::RepoError;
    use crate::models::{PersonalAccessToken, Role, User};

    #[test]
    fn test_touch_is_written_after_flush() {
        let t = test_db();
        let token_id = Uuid::new_v4();
        let result: Result<(), RepoError> = t.db.with_transaction(&Cancellation::new(), |repos| {
            let user = repos
                .users()
                .create(&User::new("u".into(), "u@x".into(), "h".into(), Role::User))?;
            repos.tokens().create(&PersonalAccessToken {
                id: token_id,
                user_id: user.id,
                name: "ci".into(),
                token_hash: "00".into(),
                prefix: "mcp_pat_abcdefgh".into(),
                scopes: vec![],
                expires_at: None,
                last_used_at: None,
                created_at: crate::models::now(),
            })?;
            Ok(())
        });
        result.unwrap();

        let queue = TouchQueue::start(t.db.clone());
        assert!(queue.is_running());
        let at = crate::models::now();
        queue.touch(token_id, at);
        assert!(queue.flush());

        let stored: Result<PersonalAccessToken, RepoError> =
            t.db.with_read(&Cancellation::new(), |repos| repos.tokens().get_by_id(token_id));
        assert_eq!(stored.unwrap().last_used_at, Some(at));

        drop(queue);
    }

    #[test]
    fn test_unknown_token_does_not_stop_worker() {
        let t = test_db();
        let queue = TouchQueue::start(t.db.clone());
        queue.touch(Uuid::new_v4(), crate::models::now());
        assert!(queue.flush());
        assert!(queue.is_running());
    }
}
