//! Declarative REST proxy kinds: `n8n-mcp`, `pm-mcp` and `stripe-mcp`.
//!
//! Each kind has a built-in descriptor. A descriptor document configured with `TOOLS_CONFIG`
//! replaces it; a document without `baseUrl` inherits the kind's configured base URL.

use crate::config::{BackendConfig, PolicyConfig};
use crate::error::{GatewayError, Result, ToolError};
use crate::kinds::ToolKind;
use crate::registry::{
    ArgSpec, Args, RequestContext, ServerDescriptor, ToolDescriptor, ToolHandler,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use toolgate_http_tools::config::{AuthConfig, DeclarativeToolConfig, ProxyDescriptor};
use toolgate_http_tools::runtime::{ProxySettings, ProxyToolSource};
use tracing::info;

struct ProxyTool {
    source: ProxyToolSource,
    tool: String,
}

#[async_trait]
impl ToolHandler for ProxyTool {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        Ok(self.source.call_tool(&self.tool, &args).await?)
    }
}

fn tool(
    name: &str,
    description: &str,
    method: &str,
    path: &str,
    path_params: &[&str],
) -> DeclarativeToolConfig {
    DeclarativeToolConfig {
        name: name.to_string(),
        description: Some(description.to_string()),
        method: method.to_string(),
        path: path.to_string(),
        path_params: path_params.iter().map(|p| (*p).to_string()).collect(),
        query_params: Vec::new(),
        query: BTreeMap::new(),
        body_arg: None,
    }
}

/// Descriptor used when no document is configured.
#[must_use]
pub fn builtin_descriptor(kind: ToolKind, base_url: &str) -> ProxyDescriptor {
    let (auth, tools) = match kind {
        ToolKind::N8n => {
            let mut trigger = tool(
                "triggerWorkflow",
                "Trigger a workflow by ID",
                "POST",
                "/api/v1/workflows/{workflowId}/test",
                &["workflowId"],
            );
            trigger.body_arg = Some("data".to_string());
            (
                Some(AuthConfig::Header {
                    name: "X-N8N-API-KEY".to_string(),
                }),
                vec![
                    tool("listWorkflows", "List all workflows", "GET", "/api/v1/workflows", &[]),
                    tool(
                        "getWorkflow",
                        "Get workflow by ID",
                        "GET",
                        "/api/v1/workflows/{workflowId}",
                        &["workflowId"],
                    ),
                    trigger,
                ],
            )
        }
        ToolKind::Pm => (
            Some(AuthConfig::Bearer),
            vec![
                tool("listProjects", "List projects", "GET", "/api/projects", &[]),
                tool(
                    "listTasks",
                    "List tasks in a project",
                    "GET",
                    "/api/projects/{projectId}/tasks",
                    &["projectId"],
                ),
            ],
        ),
        ToolKind::Stripe => {
            let mut invoices = tool(
                "listInvoices",
                "List invoices for a customer",
                "GET",
                "/invoices",
                &[],
            );
            invoices.query_params = vec!["customer".to_string()];
            invoices.query.insert("limit".to_string(), "20".to_string());
            (
                Some(AuthConfig::Basic),
                vec![
                    tool(
                        "getCustomer",
                        "Fetch a Stripe customer by ID",
                        "GET",
                        "/customers/{id}",
                        &["id"],
                    ),
                    invoices,
                ],
            )
        }
        ToolKind::Fetch | ToolKind::Fs | ToolKind::Git | ToolKind::Db => (None, Vec::new()),
    };
    ProxyDescriptor {
        base_url: base_url.to_string(),
        auth,
        tools,
    }
}

/// Argument list advertised for a declarative tool.
fn arg_specs(tool: &DeclarativeToolConfig, mutating: bool) -> Vec<ArgSpec> {
    let mut args: Vec<ArgSpec> = tool
        .path_params
        .iter()
        .map(|p| ArgSpec::required(p, "string"))
        .collect();
    args.extend(tool.query_params.iter().map(|q| ArgSpec::optional(q, "string")));
    if mutating {
        args.push(ArgSpec::optional(tool.body_arg(), "object").describe("JSON request body"));
    }
    args
}

fn backend(kind: ToolKind, policy: &PolicyConfig) -> &BackendConfig {
    match kind {
        ToolKind::Pm => &policy.pm,
        ToolKind::Stripe => &policy.stripe,
        _ => &policy.n8n,
    }
}

/// # Errors
///
/// Returns [`GatewayError::Config`] if the descriptor document cannot be read or is invalid.
pub fn server(kind: ToolKind, policy: &PolicyConfig) -> Result<ServerDescriptor> {
    if !matches!(kind, ToolKind::N8n | ToolKind::Pm | ToolKind::Stripe) {
        return Err(GatewayError::Config(format!("{kind} is not a proxy kind")));
    }
    let target = backend(kind, policy);

    let descriptor = match &policy.tools_config {
        Some(path) => {
            let mut doc = ProxyDescriptor::load(path)?;
            if doc.base_url.trim().is_empty() {
                doc.base_url.clone_from(&target.base_url);
            }
            info!(path = %path.display(), tools = doc.tools.len(), "loaded descriptor document");
            doc
        }
        None => builtin_descriptor(kind, &target.base_url),
    };

    let source = ProxyToolSource::new(
        kind.server_name(),
        descriptor,
        ProxySettings {
            secret: target.secret.clone(),
            write_enabled: policy.write_enabled,
            timeout: policy.request_timeout,
            max_response_bytes: Some(policy.max_bytes_usize()),
        },
    )?;

    let mut builder = ServerDescriptor::builder(kind.server_name());
    let tools: Vec<DeclarativeToolConfig> = source.tools().cloned().collect();
    let tools_len = tools.len();
    for config in tools {
        let description = config
            .description
            .clone()
            .unwrap_or_else(|| format!("{} {}", config.method.to_ascii_uppercase(), config.path));
        builder = builder.tool(
            ToolDescriptor::new(
                &config.name,
                &description,
                arg_specs(&config, source.is_mutating(&config.name)),
            ),
            ProxyTool {
                source: source.clone(),
                tool: config.name.clone(),
            },
        )?;
    }
    info!(
        source = source.name(),
        write_enabled = source.write_enabled(),
        tools = tools_len,
        "proxy ready"
    );
    Ok(builder.build())
}
