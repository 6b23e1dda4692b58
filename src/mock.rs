//! A scripted in-memory session, for use in tests.
//!
//! Every command sent through a [`MockSession`] is appended to a shared log
//! that the test keeps a handle to, and queries are answered from a queue of
//! canned replies in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::session::{Session, SessionFactory, clean_reply};

#[derive(Debug, Default)]
struct Script {
    sent: Vec<String>,
    replies: VecDeque<String>,
    fail_on: Option<String>,
    closed: bool,
}

/// A handle to a mock session's shared state.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    script: Arc<Mutex<Script>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next query.
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        self.lock().replies.push_back(reply.into());
        self
    }

    /// Make any command starting with `prefix` fail.
    pub fn fail_on(&self, prefix: impl Into<String>) -> &Self {
        self.lock().fail_on = Some(prefix.into());
        self
    }

    /// All commands sent so far, writes and queries alike.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A poisoned log only means another test thread panicked mid-push.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, command: &str) -> Result<()> {
        let mut script = self.lock();
        if script.closed {
            return Err(Error::NotConnected);
        }
        script.sent.push(command.to_string());
        match &script.fail_on {
            Some(prefix) if command.starts_with(prefix.as_str()) => Err(Error::Command {
                command: command.to_string(),
                source: anyhow::anyhow!("mock failure"),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.record(command)
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.record(command)?;
        let reply = self.lock().replies.pop_front().unwrap_or_default();
        let trimmed = clean_reply(&reply);
        if trimmed.is_empty() {
            return Err(Error::EmptyReply {
                command: command.to_string(),
            });
        }
        Ok(trimmed)
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Hands out clones of one [`MockSession`], or refuses to open at all.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    session: MockSession,
    unreachable: bool,
}

impl MockFactory {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            unreachable: false,
        }
    }

    /// A factory for which every `open` fails.
    pub fn unreachable() -> Self {
        Self {
            session: MockSession::new(),
            unreachable: true,
        }
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    type Session = MockSession;

    async fn open(&self, address: &str) -> Result<MockSession> {
        if self.unreachable {
            return Err(Error::Connect {
                address: address.to_string(),
                source: anyhow::anyhow!("no such resource"),
            });
        }
        Ok(self.session.clone())
    }
}
