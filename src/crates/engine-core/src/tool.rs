//! Tools the model may call during a task
//!
//! A [`Tool`] pairs a name and parameter schema with an async handler.
//! Callers describe tools in whichever shape is convenient
//! ([`ToolDescriptor`]); [`Tool::normalize`] turns every shape into the one
//! canonical `Tool` at the boundary, so nothing downstream branches on shape.
//!
//! # Example
//!
//! ```rust,ignore
//! use engine_core::tool::{Tool, ToolDescriptor};
//! use serde_json::json;
//!
//! let add = Tool::from_fn("add", |args| async move {
//!     let a = args["a"].as_i64().unwrap_or(0);
//!     let b = args["b"].as_i64().unwrap_or(0);
//!     Ok::<_, String>(json!(a + b))
//! })
//! .with_description("Add two integers");
//!
//! let described = ToolDescriptor::Described {
//!     spec: json!({"type": "function", "function": {"name": "echo"}}),
//!     handler: echo_handler,
//! };
//! ```

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// What a tool handler produced
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReturn {
    /// Explicit success
    Success(Value),
    /// Explicit failure with a reason the model will see
    Failure(String),
    /// A plain value with no success/failure tag; treated as success
    Bare(Value),
}

impl From<Value> for ToolReturn {
    fn from(value: Value) -> Self {
        ToolReturn::Bare(value)
    }
}

impl<E: fmt::Display> From<std::result::Result<Value, E>> for ToolReturn {
    fn from(result: std::result::Result<Value, E>) -> Self {
        match result {
            Ok(value) => ToolReturn::Success(value),
            Err(reason) => ToolReturn::Failure(reason.to_string()),
        }
    }
}

/// Future type for async tool execution
pub type ToolFuture = BoxFuture<'static, ToolReturn>;

/// Tool handler function type
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Canonical tool
#[derive(Clone)]
pub struct Tool {
    /// Unique within a task's tool set
    pub name: String,

    pub description: Option<String>,

    /// Parameter schema forwarded to the backend as-is
    pub parameters: Value,

    handler: ToolHandler,
}

impl Tool {
    /// Create a tool with an empty object schema.
    pub fn new(name: impl Into<String>, handler: ToolHandler) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: empty_schema(),
            handler,
        }
    }

    /// Create a tool from an async closure.
    pub fn from_fn<F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<ToolReturn>,
    {
        let f = Arc::new(f);
        let handler: ToolHandler = Arc::new(move |args| -> ToolFuture {
            let f = f.clone();
            Box::pin(async move {
                let returned: ToolReturn = f(args).await.into();
                returned
            })
        });
        Self::new(name, handler)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Run the handler.
    ///
    /// An untagged return value counts as success. A panicking handler is
    /// not caught here.
    pub async fn execute(&self, args: Value) -> std::result::Result<Value, String> {
        match (self.handler)(args).await {
            ToolReturn::Success(value) | ToolReturn::Bare(value) => Ok(value),
            ToolReturn::Failure(reason) => Err(reason),
        }
    }

    /// Definition sent to the backend.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Convert any supported descriptor shape into a canonical tool.
    pub fn normalize(descriptor: ToolDescriptor) -> Result<Tool> {
        let tool = match descriptor {
            ToolDescriptor::Tool(tool) => tool,
            ToolDescriptor::Named { name, handler } => Tool::new(name, handler),
            ToolDescriptor::Described { spec, handler } => from_spec(&spec, handler)?,
        };

        if tool.name.trim().is_empty() {
            return Err(EngineError::Configuration(
                "Tool name must not be empty".to_string(),
            ));
        }
        Ok(tool)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Accepted external shapes for a tool
pub enum ToolDescriptor {
    /// Already canonical
    Tool(Tool),

    /// Just a name and a handler
    Named { name: String, handler: ToolHandler },

    /// A string-keyed map: `{"name", "description", "parameters"}`, with
    /// `input_schema` accepted for `parameters`, or the same fields nested
    /// under `"function"`
    Described { spec: Value, handler: ToolHandler },
}

impl From<Tool> for ToolDescriptor {
    fn from(tool: Tool) -> Self {
        ToolDescriptor::Tool(tool)
    }
}

impl<S: Into<String>> From<(S, ToolHandler)> for ToolDescriptor {
    fn from((name, handler): (S, ToolHandler)) -> Self {
        ToolDescriptor::Named {
            name: name.into(),
            handler,
        }
    }
}

/// Normalize a tool set, rejecting duplicate names.
pub fn normalize_tools<I>(descriptors: I) -> Result<Vec<Tool>>
where
    I: IntoIterator<Item = ToolDescriptor>,
{
    let mut seen = HashSet::new();
    let mut tools = Vec::new();

    for descriptor in descriptors {
        let tool = Tool::normalize(descriptor)?;
        if !seen.insert(tool.name.clone()) {
            return Err(EngineError::Configuration(format!(
                "Duplicate tool name '{}'",
                tool.name
            )));
        }
        tools.push(tool);
    }

    Ok(tools)
}

/// Tool description as the backend sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub parameters: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn from_spec(spec: &Value, handler: ToolHandler) -> Result<Tool> {
    let body = spec.get("function").unwrap_or(spec);
    let map = body.as_object().ok_or_else(|| {
        EngineError::Configuration(format!("Tool descriptor must be an object, got {}", spec))
    })?;

    let name = map
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Configuration("Tool descriptor is missing 'name'".into()))?;

    let description = map
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let parameters = map
        .get("parameters")
        .or_else(|| map.get("input_schema"))
        .cloned()
        .unwrap_or_else(empty_schema);

    Ok(Tool {
        name: name.to_string(),
        description,
        parameters,
        handler,
    })
}
