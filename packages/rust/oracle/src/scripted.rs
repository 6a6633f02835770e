//! Deterministic in-memory oracle.
//!
//! Replies are served from a queue in call order; when the queue is empty an
//! optional responder closure decides. Every request is logged so tests can
//! assert exactly which calls the pipeline made.

use std::collections::VecDeque;
use std::sync::Mutex;

use recast_shared::{RecastError, Result};

use crate::{Oracle, OracleRequest};

type Responder = Box<dyn Fn(&OracleRequest) -> Result<String> + Send + Sync>;

/// One canned reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Simulates the service being unreachable.
    Failure(String),
}

#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Reply>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle whose replies are computed from each request.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push(Reply::Text(text.into()))
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(Reply::Failure(message.into()))
    }

    fn push(&self, reply: Reply) -> &Self {
        lock(&self.replies).push_back(reply);
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<OracleRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn respond(&self, request: &OracleRequest) -> Result<String> {
        lock(&self.calls).push(request.clone());

        let queued = lock(&self.replies).pop_front();
        match (queued, &self.responder) {
            (Some(Reply::Text(text)), _) => Ok(text),
            (Some(Reply::Failure(message)), _) => Err(RecastError::Oracle(message)),
            (None, Some(responder)) => responder(request),
            (None, None) => Err(RecastError::Oracle("scripted oracle has no reply left".into())),
        }
    }
}

// A poisoned lock only means another test thread panicked; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Oracle for ScriptedOracle {
    async fn generate(&self, request: &OracleRequest) -> Result<String> {
        self.respond(request)
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
