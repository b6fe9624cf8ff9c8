//! Built-in generation step with tool calling
//!
//! Each round sends the conversation to the backend, appends the assistant
//! reply and then, depending on [`ToolCallMode`], runs the requested tools
//! and goes around again. Message and token limits are checked after every
//! appended message and end the loop by completing the state.
//! `max_rounds` bounds the number of backend calls without completing the
//! state.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::{GenerateConfig, Generator, ToolCallMode};
use crate::messages::{ChatMessage, ToolCall};
use crate::solver::Solver;
use crate::state::TaskState;

/// Solver that calls the generation backend
#[derive(Debug, Clone, Default)]
pub struct Generate {
    config: GenerateConfig,
}

impl Generate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GenerateConfig) -> Self {
        Self { config }
    }

    pub fn tool_calls(mut self, mode: ToolCallMode) -> Self {
        self.config.tool_calls = Some(mode);
        self
    }

    pub fn config(&self) -> &GenerateConfig {
        &self.config
    }

    async fn run_tool_calls(&self, mut state: TaskState, calls: &[ToolCall]) -> TaskState {
        for call in calls {
            let message = execute_call(&state, call).await;
            state = complete_if_limited(state.add_message(message));
        }
        state
    }
}

#[async_trait]
impl Solver for Generate {
    async fn solve(&self, mut state: TaskState, generate: &dyn Generator) -> Result<TaskState> {
        let mode = self.config.tool_call_mode();
        let base = self.config.for_backend();
        let max_rounds = self.config.max_rounds;
        let mut round = 0u32;

        loop {
            round += 1;
            let config = base.clone().fill_from_state(&state);
            debug!(sample_id = %state.sample_id(), round, ?mode, "Generating");

            let response = generate.generate(&state, config).await?;

            let calls = response.requested_tool_calls().to_vec();
            let mut reply = ChatMessage::assistant(response.content.clone());
            if let Some(tool_calls) = &response.tool_calls {
                reply = reply.with_tool_calls(tool_calls.clone());
            }
            let tokens = response.total_tokens();

            state = complete_if_limited(
                state
                    .add_message(reply)
                    .set_output(Some(response))
                    .add_token_usage(tokens),
            );

            if state.completed() || mode == ToolCallMode::None || calls.is_empty() {
                return Ok(state);
            }

            debug!(sample_id = %state.sample_id(), round, calls = calls.len(), "Running tool calls");
            state = self.run_tool_calls(state, &calls).await;

            if mode == ToolCallMode::Single || state.completed() {
                return Ok(state);
            }

            if max_rounds.is_some_and(|max| round >= max) {
                debug!(sample_id = %state.sample_id(), round, "Round cap reached");
                return Ok(state);
            }
        }
    }

    fn name(&self) -> &str {
        "generate"
    }
}

fn complete_if_limited(state: TaskState) -> TaskState {
    if !state.completed() && state.limit_reached() {
        debug!(
            sample_id = %state.sample_id(),
            messages = state.messages().len(),
            tokens = state.token_usage(),
            "Limit reached, completing task"
        );
        state.complete()
    } else {
        state
    }
}

/// Run one call and turn the outcome into a tool message.
///
/// Failures stay inside the conversation so the model can react to them.
async fn execute_call(state: &TaskState, call: &ToolCall) -> ChatMessage {
    let outcome = match state.find_tool(&call.name) {
        Some(tool) => tool.execute(call.arguments.clone()).await,
        None => Err(format!("Tool '{}' not found", call.name)),
    };

    let message = match outcome {
        Ok(value) => ChatMessage::tool(stringify(&value), call.id.clone()),
        Err(reason) => {
            warn!(sample_id = %state.sample_id(), tool = %call.name, %reason, "Tool call failed");
            ChatMessage::tool(reason.clone(), call.id.clone()).with_error(reason)
        }
    };
    message.with_name(call.name.clone())
}

/// Strings are used as-is; anything else becomes JSON text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
