//! Generation backend contract
//!
//! The engine never talks to a concrete model provider. A backend is
//! anything implementing [`Generator`]: it receives the current
//! [`TaskState`] and a [`GenerateConfig`] and returns a
//! [`GenerateResponse`] or an [`EngineError`](crate::EngineError).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use engine_core::llm::{generator_fn, GenerateResponse};
//!
//! let backend = generator_fn(|messages, _config| async move {
//!     let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
//!     Ok(GenerateResponse::new(format!("echo: {}", last)))
//! });
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;

use crate::error::Result;
use crate::messages::{ChatMessage, ToolCall};
use crate::state::TaskState;
use crate::tool::ToolDefinition;

/// How the generate step handles tool calls in a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallMode {
    /// Run the calls and generate again until the model stops asking
    #[default]
    Loop,
    /// Run the calls once, then return
    Single,
    /// Never run tool calls
    None,
}

/// Generation settings
///
/// Known keys are typed; anything else rides along in `extra` and is
/// forwarded to the backend untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Consumed by the generate step, never forwarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<ToolCallMode>,

    /// Upper bound on backend calls per generate step. Consumed by the
    /// generate step, never forwarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Provider-specific passthrough
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool_calls(mut self, mode: ToolCallMode) -> Self {
        self.tool_calls = Some(mode);
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Effective tool-call mode (loop when unset).
    pub fn tool_call_mode(&self) -> ToolCallMode {
        self.tool_calls.unwrap_or_default()
    }

    /// Copy without the generate step's own keys, as sent to the backend.
    pub fn for_backend(&self) -> Self {
        Self {
            tool_calls: None,
            max_rounds: None,
            ..self.clone()
        }
    }

    /// Fill model, tools and tool choice from the state.
    ///
    /// Only keys absent from this config are filled.
    pub fn fill_from_state(mut self, state: &TaskState) -> Self {
        if self.model.is_none() {
            self.model = state.model().map(str::to_string);
        }
        if self.tools.is_none() && !state.tools().is_empty() {
            self.tools = Some(state.tools().iter().map(|tool| tool.definition()).collect());
        }
        if self.tool_choice.is_none() {
            self.tool_choice = state.tool_choice().cloned();
        }
        self
    }
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn total(total_tokens: u64) -> Self {
        Self {
            total_tokens: Some(total_tokens),
            ..Self::default()
        }
    }
}

/// One backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl GenerateResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: None,
            usage: None,
            tool_calls: None,
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    /// Total tokens for this response, 0 when the backend did not say.
    pub fn total_tokens(&self) -> u64 {
        self.usage.and_then(|usage| usage.total_tokens).unwrap_or(0)
    }

    /// Tool calls requested, empty when none.
    pub fn requested_tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// A generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the next assistant turn for `state`.
    async fn generate(&self, state: &TaskState, config: GenerateConfig)
        -> Result<GenerateResponse>;
}

/// [`Generator`] backed by an async closure over the message history
pub struct FnGenerator<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wrap a closure `(messages, config) -> Result<GenerateResponse>` as a
/// [`Generator`].
pub fn generator_fn<F, Fut>(f: F) -> FnGenerator<F, Fut>
where
    F: Fn(Vec<ChatMessage>, GenerateConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GenerateResponse>> + Send + 'static,
{
    FnGenerator {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Generator for FnGenerator<F, Fut>
where
    F: Fn(Vec<ChatMessage>, GenerateConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GenerateResponse>> + Send + 'static,
{
    async fn generate(
        &self,
        state: &TaskState,
        config: GenerateConfig,
    ) -> Result<GenerateResponse> {
        (self.f)(state.messages().to_vec(), config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Sample, TaskStateOptions};
    use crate::tool::Tool;
    use serde_json::json;

    #[test]
    fn test_default_mode_is_loop() {
        assert_eq!(GenerateConfig::new().tool_call_mode(), ToolCallMode::Loop);
        assert_eq!(
            GenerateConfig::new()
                .with_tool_calls(ToolCallMode::None)
                .tool_call_mode(),
            ToolCallMode::None
        );
    }

    #[test]
    fn test_step_keys_are_stripped() {
        let config = GenerateConfig::new()
            .with_tool_calls(ToolCallMode::Single)
            .with_max_rounds(3)
            .with_temperature(0.2);
        let forwarded = config.for_backend();
        assert!(forwarded.tool_calls.is_none());
        assert!(forwarded.max_rounds.is_none());
        assert_eq!(forwarded.temperature, Some(0.2));
    }

    #[test]
    fn test_fill_from_state_keeps_explicit_keys() {
        let options = TaskStateOptions::new()
            .with_model("state-model")
            .with_tool_choice(json!("auto"))
            .with_tool(Tool::from_fn("lookup", |_args| async { json!(null) }));
        let state = TaskState::new(Sample::new("s", "X"), options).unwrap();

        let filled = GenerateConfig::new()
            .with_model("explicit")
            .fill_from_state(&state);

        assert_eq!(filled.model.as_deref(), Some("explicit"));
        assert_eq!(filled.tool_choice, Some(json!("auto")));
        let tools = filled.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "lookup");
    }

    #[test]
    fn test_no_tools_leaves_tools_unset() {
        let state = TaskState::new(Sample::new("s", "X"), TaskStateOptions::new()).unwrap();
        assert!(GenerateConfig::new().fill_from_state(&state).tools.is_none());
    }

    #[test]
    fn test_extra_keys_flatten() {
        let config = GenerateConfig::new()
            .with_max_tokens(64)
            .with_extra("seed", json!(42));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({"max_tokens": 64, "seed": 42}));

        let back: GenerateConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_total_tokens_defaults_to_zero() {
        assert_eq!(GenerateResponse::new("x").total_tokens(), 0);
        assert_eq!(
            GenerateResponse::new("x")
                .with_usage(Usage::default())
                .total_tokens(),
            0
        );
        assert_eq!(
            GenerateResponse::new("x").with_usage(Usage::total(12)).total_tokens(),
            12
        );
    }

    #[tokio::test]
    async fn test_fn_generator_sees_messages() {
        let backend = generator_fn(|messages: Vec<ChatMessage>, _config| async move {
            Ok(GenerateResponse::new(format!("{} messages", messages.len())))
        });
        let state = TaskState::new(Sample::new("s", "X"), TaskStateOptions::new()).unwrap();

        let response = backend.generate(&state, GenerateConfig::new()).await.unwrap();
        assert_eq!(response.content, "1 messages");
    }
}
