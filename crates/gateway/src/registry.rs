//! Tool descriptor model and the per-process handler registry.
//!
//! A [`ServerDescriptor`] is built once at startup through [`ServerBuilder`], which registers
//! each tool together with its handler. Tool names are unique, so every listed tool has exactly
//! one handler and no handler exists without a listed tool.

use crate::error::{GatewayError, Result, ToolError};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Arguments of a dispatch call (always a JSON object).
pub type Args = Map<String, Value>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ArgSpec {
    #[must_use]
    pub fn required(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            required: true,
            description: None,
        }
    }

    #[must_use]
    pub fn optional(name: &str, ty: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSpec>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn new(name: &str, description: &str, args: Vec<ArgSpec>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            args,
        }
    }
}

/// Inbound request data a handler may look at.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
}

impl RequestContext {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }
}

/// The implementation behind a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Args, ctx: RequestContext) -> std::result::Result<Value, ToolError>;
}

pub struct ServerDescriptor {
    name: String,
    tools: Vec<ToolDescriptor>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("name", &self.name)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl ServerDescriptor {
    #[must_use]
    pub fn builder(name: &str) -> ServerBuilder {
        ServerBuilder {
            name: name.to_string(),
            tools: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tools in registration order.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Exact-name handler lookup.
    #[must_use]
    pub fn handler(&self, tool: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(tool).cloned()
    }

    /// Payload of the discovery `schema` event.
    #[must_use]
    pub fn schema_payload(&self, now: DateTime<Utc>) -> Value {
        json!({
            "name": self.name,
            "tools": self.tools,
            "ts": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

pub struct ServerBuilder {
    name: String,
    tools: Vec<ToolDescriptor>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ServerBuilder {
    /// Register a tool and its handler.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Registry`] if a tool with the same name is already registered.
    pub fn tool(
        mut self,
        descriptor: ToolDescriptor,
        handler: impl ToolHandler + 'static,
    ) -> Result<Self> {
        if self.handlers.contains_key(&descriptor.name) {
            return Err(GatewayError::Registry(format!(
                "duplicate tool '{}' in server '{}'",
                descriptor.name, self.name
            )));
        }
        self.handlers.insert(descriptor.name.clone(), Arc::new(handler));
        self.tools.push(descriptor);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> ServerDescriptor {
        ServerDescriptor {
            name: self.name,
            tools: self.tools,
            handlers: self.handlers,
        }
    }
}

/// Required string argument.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArgs`] if the argument is missing, not a string, or empty.
pub fn required_str<'a>(args: &'a Args, name: &str) -> std::result::Result<&'a str, ToolError> {
    match args.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            Err(ToolError::InvalidArgs(format!("{name} required")))
        }
        Some(_) => Err(ToolError::InvalidArgs(format!("{name} must be a string"))),
    }
}

/// Optional non-negative integer argument; numeric strings are accepted.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArgs`] if the argument is present but not a non-negative integer.
pub fn optional_u64(args: &Args, name: &str) -> std::result::Result<Option<u64>, ToolError> {
    let invalid = || ToolError::InvalidArgs(format!("{name} must be a non-negative integer"));
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}
