//! Scripted stand-ins for the remote store
//!
//! Each mock records every call and answers from a script, falling back to
//! a default outcome once the script runs out.

use cms_sync::migration::RecordMutation;
use cms_sync::{MutationDispatcher, Operation, RemoteError};
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;

/// Answer for one remote call
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accept,
    Reject(String),
}

impl Outcome {
    pub fn reject(message: &str) -> Self {
        Outcome::Reject(message.to_string())
    }
}

#[derive(Debug)]
struct Script {
    queued: VecDeque<Outcome>,
    fallback: Outcome,
}

impl Script {
    fn new(fallback: Outcome) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> Outcome {
        self.queued.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Mutation dispatcher driven by a script
#[derive(Debug)]
pub struct ScriptedDispatcher {
    script: Mutex<Script>,
    calls: Mutex<Vec<Operation>>,
}

impl ScriptedDispatcher {
    /// Accept every call
    pub fn accepting() -> Self {
        Self::with_fallback(Outcome::Accept)
    }

    /// Reject every call with `message`
    pub fn rejecting(message: &str) -> Self {
        Self::with_fallback(Outcome::reject(message))
    }

    fn with_fallback(fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(Script::new(fallback)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next call with `outcome`, ahead of the fallback
    pub fn then(self, outcome: Outcome) -> Self {
        self.script.lock().queued.push_back(outcome);
        self
    }

    /// Change the answer used once the script is exhausted
    pub fn set_fallback(&self, outcome: Outcome) {
        self.script.lock().fallback = outcome;
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl MutationDispatcher for ScriptedDispatcher {
    fn invoke<'a>(&'a self, operation: &'a Operation) -> BoxFuture<'a, Result<Value, RemoteError>> {
        self.calls.lock().push(operation.clone());
        let outcome = self.script.lock().next();
        async move {
            match outcome {
                Outcome::Accept => Ok(json!({ "_id": format!("srv-{}", operation.kind()) })),
                Outcome::Reject(message) => Err(RemoteError::new(message)),
            }
        }
        .boxed()
    }
}

/// Record mutation driven by a script; accepted records are echoed back
#[derive(Debug)]
pub struct ScriptedMutation {
    script: Mutex<Script>,
    submitted: Mutex<Vec<Value>>,
}

impl ScriptedMutation {
    pub fn accepting() -> Self {
        Self {
            script: Mutex::new(Script::new(Outcome::Accept)),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, outcome: Outcome) -> Self {
        self.script.lock().queued.push_back(outcome);
        self
    }

    pub fn submitted(&self) -> Vec<Value> {
        self.submitted.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.submitted.lock().len()
    }
}

impl RecordMutation for ScriptedMutation {
    fn submit<'a>(&'a self, _data_type: &'a str, record: Value) -> BoxFuture<'a, Result<Value, RemoteError>> {
        self.submitted.lock().push(record.clone());
        let outcome = self.script.lock().next();
        async move {
            match outcome {
                Outcome::Accept => Ok(record),
                Outcome::Reject(message) => Err(RemoteError::new(message)),
            }
        }
        .boxed()
    }
}
