//! Per-task conversation state
//!
//! A [`TaskState`] is an immutable snapshot. Every transition consumes the
//! current snapshot and hands back the next one, so exactly one owner (the
//! step currently running) ever holds it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::choices::Choices;
use crate::error::{EngineError, Result};
use crate::llm::GenerateResponse;
use crate::messages::{ChatMessage, MessageRole};
use crate::tool::{normalize_tools, Tool, ToolDescriptor};

/// Original input of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    /// Plain prompt, turned into one user message
    Text(String),
    /// Pre-built conversation, used verbatim
    Messages(Vec<ChatMessage>),
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<Vec<ChatMessage>> for Input {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Input::Messages(messages)
    }
}

/// One dataset record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub id: String,

    pub input: Input,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Sample {
    pub fn new(id: impl Into<String>, input: impl Into<Input>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            target: None,
            choices: None,
            metadata: Map::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Overrides applied when building a [`TaskState`]
///
/// Anything left unset falls back to the sample (target, choices) or to
/// "no limit" / "no tools".
#[derive(Default)]
pub struct TaskStateOptions {
    pub model: Option<String>,
    pub epoch: u32,
    pub target: Option<String>,
    pub choices: Option<Choices>,
    pub message_limit: Option<usize>,
    pub token_limit: Option<u64>,
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: Option<Value>,
}

impl TaskStateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_choices(mut self, choices: Choices) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = Some(limit);
        self
    }

    pub fn with_token_limit(mut self, limit: u64) -> Self {
        self.token_limit = Some(limit);
        self
    }

    pub fn with_tool(mut self, tool: impl Into<ToolDescriptor>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }
}

/// Snapshot of one sample's in-flight conversation
///
/// # Example
///
/// ```rust,ignore
/// use engine_core::state::{Sample, TaskState, TaskStateOptions};
/// use engine_core::messages::ChatMessage;
///
/// let state = TaskState::new(Sample::new("q1", "What is 2 + 2?"), TaskStateOptions::new())?;
/// let state = state.add_message(ChatMessage::assistant("4")).complete();
/// assert!(state.completed());
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    sample_id: String,
    model: Option<String>,
    epoch: u32,
    input: Input,
    messages: Vec<ChatMessage>,
    target: Option<String>,
    choices: Choices,
    output: Option<GenerateResponse>,
    message_limit: Option<usize>,
    token_limit: Option<u64>,
    token_usage: u64,
    completed: bool,
    metadata: Map<String, Value>,
    store: Map<String, Value>,
    scores: Option<Value>,
    #[serde(skip)]
    tools: Vec<Tool>,
    tool_choice: Option<Value>,
}

impl TaskState {
    /// Build the initial state for a sample.
    ///
    /// Fails only when the tool set is malformed.
    pub fn new(sample: Sample, options: TaskStateOptions) -> Result<Self> {
        let messages = match &sample.input {
            Input::Text(text) => vec![ChatMessage::user(text.clone())],
            Input::Messages(messages) => messages.clone(),
        };

        let choices = options
            .choices
            .or_else(|| sample.choices.map(Choices::new))
            .unwrap_or_default();

        Ok(Self {
            sample_id: sample.id,
            model: options.model,
            epoch: options.epoch,
            input: sample.input,
            messages,
            target: options.target.or(sample.target),
            choices,
            output: None,
            message_limit: options.message_limit,
            token_limit: options.token_limit,
            token_usage: 0,
            completed: false,
            metadata: sample.metadata,
            store: Map::new(),
            scores: None,
            tools: normalize_tools(options.tools)?,
            tool_choice: options.tool_choice,
        })
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn choices(&self) -> &Choices {
        &self.choices
    }

    pub fn output(&self) -> Option<&GenerateResponse> {
        self.output.as_ref()
    }

    pub fn message_limit(&self) -> Option<usize> {
        self.message_limit
    }

    pub fn token_limit(&self) -> Option<u64> {
        self.token_limit
    }

    /// Total tokens reported by every generation so far.
    pub fn token_usage(&self) -> u64 {
        self.token_usage
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn store(&self) -> &Map<String, Value> {
        &self.store
    }

    pub fn store_get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    pub fn scores(&self) -> Option<&Value> {
        self.scores.as_ref()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn tool_choice(&self) -> Option<&Value> {
        self.tool_choice.as_ref()
    }

    pub fn find_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Text of the original input.
    ///
    /// For a message-sequence input this is the last user message of that
    /// sequence.
    pub fn input_text(&self) -> Result<&str> {
        match &self.input {
            Input::Text(text) => Ok(text),
            Input::Messages(messages) => last_user_content(messages)
                .ok_or_else(|| EngineError::Lookup("No user message in input".to_string())),
        }
    }

    /// Content of the last user message in the current conversation.
    pub fn user_prompt(&self) -> Result<&str> {
        last_user_content(&self.messages)
            .ok_or_else(|| EngineError::Lookup("No user message in conversation".to_string()))
    }

    pub fn add_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the last generation response; `None` clears it.
    pub fn set_output(mut self, output: Option<GenerateResponse>) -> Self {
        self.output = output;
        self
    }

    pub fn add_token_usage(mut self, tokens: u64) -> Self {
        self.token_usage = self.token_usage.saturating_add(tokens);
        self
    }

    /// Mark the task done. Idempotent.
    pub fn complete(mut self) -> Self {
        self.completed = true;
        self
    }

    pub fn with_store_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.store.insert(key.into(), value);
        self
    }

    pub fn with_scores(mut self, scores: Value) -> Self {
        self.scores = Some(scores);
        self
    }

    pub fn with_choices(mut self, choices: Choices) -> Self {
        self.choices = choices;
        self
    }

    /// Whether a configured message or token limit has been reached.
    ///
    /// An unset limit never counts as reached.
    pub fn limit_reached(&self) -> bool {
        let messages_hit = self
            .message_limit
            .is_some_and(|limit| self.messages.len() >= limit);
        let tokens_hit = self
            .token_limit
            .is_some_and(|limit| self.token_usage >= limit);
        messages_hit || tokens_hit
    }

    /// Serializable snapshot, without tool handlers.
    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn last_user_content(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::User)
        .map(|message| message.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_state(text: &str) -> TaskState {
        TaskState::new(Sample::new("s1", text), TaskStateOptions::new()).unwrap()
    }

    #[test]
    fn test_text_input_becomes_user_message() {
        let state = text_state("X");
        assert_eq!(state.messages(), &[ChatMessage::user("X")]);
        assert_eq!(state.input_text().unwrap(), "X");
        assert!(!state.completed());
    }

    #[test]
    fn test_message_input_used_verbatim() {
        let history = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("first"),
            ChatMessage::assistant("ok"),
            ChatMessage::user("second"),
        ];
        let state = TaskState::new(Sample::new("s1", history.clone()), TaskStateOptions::new())
            .unwrap();

        assert_eq!(state.messages(), history.as_slice());
        assert_eq!(state.input_text().unwrap(), "second");
    }

    #[test]
    fn test_input_text_without_user_message() {
        let state = TaskState::new(
            Sample::new("s1", vec![ChatMessage::system("only system")]),
            TaskStateOptions::new(),
        )
        .unwrap();

        assert!(matches!(state.input_text(), Err(EngineError::Lookup(_))));
        assert!(matches!(state.user_prompt(), Err(EngineError::Lookup(_))));
    }

    #[test]
    fn test_user_prompt_reads_current_history() {
        let state = text_state("original").add_message(ChatMessage::user("follow-up"));
        assert_eq!(state.input_text().unwrap(), "original");
        assert_eq!(state.user_prompt().unwrap(), "follow-up");
    }

    #[test]
    fn test_transitions_leave_original_untouched() {
        let before = text_state("X");
        let after = before.clone().add_message(ChatMessage::assistant("Y")).complete();

        assert_eq!(before.messages().len(), 1);
        assert!(!before.completed());
        assert_eq!(after.messages().len(), 2);
        assert!(after.completed());
    }

    #[test]
    fn test_set_output_accepts_none() {
        let response = GenerateResponse::new("hi");
        let state = text_state("X").set_output(Some(response.clone()));
        assert_eq!(state.output(), Some(&response));

        let state = state.set_output(None);
        assert!(state.output().is_none());
    }

    #[test]
    fn test_options_override_sample() {
        let sample = Sample::new("s1", "X")
            .with_target("sample target")
            .with_choices(["a", "b"]);
        let options = TaskStateOptions::new()
            .with_model("m-1")
            .with_epoch(2)
            .with_target("override");

        let state = TaskState::new(sample, options).unwrap();
        assert_eq!(state.model(), Some("m-1"));
        assert_eq!(state.epoch(), 2);
        assert_eq!(state.target(), Some("override"));
        assert_eq!(state.choices().len(), 2);
    }

    #[test]
    fn test_limits() {
        let state = TaskState::new(
            Sample::new("s1", "X"),
            TaskStateOptions::new().with_message_limit(2),
        )
        .unwrap();
        assert!(!state.limit_reached());
        let state = state.add_message(ChatMessage::assistant("Y"));
        assert!(state.limit_reached());

        let state = TaskState::new(
            Sample::new("s1", "X"),
            TaskStateOptions::new().with_token_limit(100),
        )
        .unwrap();
        assert!(!state.clone().add_token_usage(99).limit_reached());
        assert!(state.add_token_usage(100).limit_reached());

        // No limits configured
        let state = text_state("X").add_token_usage(u64::MAX);
        assert!(!state.limit_reached());
    }

    #[test]
    fn test_duplicate_tools_rejected() {
        let tool = || crate::tool::Tool::from_fn("t", |_args| async { json!(null) });
        let options = TaskStateOptions::new().with_tool(tool()).with_tool(tool());
        assert!(matches!(
            TaskState::new(Sample::new("s1", "X"), options),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_record_omits_tools() {
        let options = TaskStateOptions::new()
            .with_tool(crate::tool::Tool::from_fn("t", |_args| async { json!(1) }));
        let state = TaskState::new(Sample::new("s1", "X"), options)
            .unwrap()
            .with_store_value("step", json!("done"));

        let record = state.to_record().unwrap();
        assert_eq!(record["sample_id"], "s1");
        assert_eq!(record["store"]["step"], "done");
        assert!(record.get("tools").is_none());
    }

    #[test]
    fn test_sample_deserializes_both_input_shapes() {
        let text: Sample = serde_json::from_value(json!({"id": "a", "input": "hi"})).unwrap();
        assert_eq!(text.input, Input::Text("hi".into()));

        let chat: Sample = serde_json::from_value(json!({
            "id": "b",
            "input": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(chat.input, Input::Messages(vec![ChatMessage::user("hi")]));
    }
}
