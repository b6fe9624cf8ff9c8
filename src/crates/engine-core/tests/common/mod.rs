//! Shared helpers for engine-core integration tests

use async_trait::async_trait;
use engine_core::{
    EngineError, GenerateConfig, GenerateResponse, Generator, Result, Sample, TaskState,
    TaskStateOptions, ToolCall,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Backend that replays canned responses and records each request
pub struct ScriptedBackend {
    responses: Vec<Result<GenerateResponse>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(usize, GenerateConfig)>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<GenerateResponse>>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (message count, config) for every request received
    pub fn seen(&self) -> Vec<(usize, GenerateConfig)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedBackend {
    async fn generate(&self, state: &TaskState, config: GenerateConfig) -> Result<GenerateResponse> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((state.messages().len(), config));

        self.responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::Failed("script exhausted".into())))
    }
}

pub fn text_reply(content: &str) -> Result<GenerateResponse> {
    Ok(GenerateResponse::new(content))
}

pub fn tool_reply(calls: Vec<ToolCall>) -> Result<GenerateResponse> {
    Ok(GenerateResponse::new("").with_tool_calls(calls))
}

pub fn state_with(options: TaskStateOptions) -> TaskState {
    TaskState::new(Sample::new("sample-1", "What is 6 times 7?"), options).unwrap()
}
