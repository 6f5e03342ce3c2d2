//! Scriptable in-process backend for pipeline tests.

use aegis_core::{
    Completion, CompletionBackend, CompletionRequest, GatewayError, GatewayResult, Usage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted outcome for a `complete` call.
pub enum MockStep {
    /// Reply with the given text.
    Reply(String),
    /// Fail with the given error.
    Fail(GatewayError),
}

/// Counting backend that replays a script, then falls back to a canned
/// reply once the script is exhausted.
pub struct MockBackend {
    name: String,
    calls: AtomicU32,
    last_prompt: Mutex<Option<String>>,
    script: Mutex<VecDeque<MockStep>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            calls: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
        })
    }

    pub fn scripted(name: impl Into<String>, steps: Vec<MockStep>) -> Arc<Self> {
        let backend = Self::new(name);
        backend
            .script
            .lock()
            .expect("script lock")
            .extend(steps);
        backend
    }

    /// How many times `complete` was invoked.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt seen by the most recent `complete` call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().expect("prompt lock").clone()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().expect("prompt lock") = Some(request.prompt.clone());

        let step = self.script.lock().expect("script lock").pop_front();
        let text = match step {
            Some(MockStep::Reply(text)) => text,
            Some(MockStep::Fail(error)) => return Err(error),
            None => format!("mock reply from {}", self.name),
        };

        Ok(Completion {
            text,
            provider: self.name.clone(),
            model: request.model.clone(),
            usage: Some(Usage {
                prompt_tokens: 7,
                completion_tokens: 11,
                total_tokens: 18,
            }),
            latency: Duration::from_millis(1),
            attempts: 0,
        })
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}
