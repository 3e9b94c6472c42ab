//! `fetch-mcp`: outbound HTTP GET/HEAD restricted to allowlisted domains.

use crate::config::PolicyConfig;
use crate::error::{Result, ToolError};
use crate::registry::{
    ArgSpec, Args, RequestContext, ServerDescriptor, ToolDescriptor, ToolHandler, required_str,
};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use toolgate_http_tools::runtime::{HttpToolsError, decode_body};
use toolgate_http_tools::safety::{OutboundHttpSafety, read_body_limited, redact_url};
use tracing::{debug, info, warn};
use url::Url;

/// Inbound headers relayed to the upstream request. Nothing else is forwarded.
const PASSTHROUGH_HEADERS: [&str; 2] = ["CF-Access-Client-Id", "CF-Access-Client-Secret"];

struct Fetcher {
    client: Client,
    safety: OutboundHttpSafety,
    timeout: Duration,
}

impl Fetcher {
    async fn request(
        &self,
        method: Method,
        args: &Args,
        ctx: &RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let raw = required_str(args, "url")?;
        let url = Url::parse(raw).map_err(|_| ToolError::Policy("domain not allowed".into()))?;
        self.safety.check_url(&url)?;
        debug!(method = %method, url = %redact_url(&url), "fetch");

        let mut request = self.client.request(method.clone(), url).timeout(self.timeout);
        for name in PASSTHROUGH_HEADERS {
            if let Some(value) = ctx.header(name) {
                request = request.header(name, value.clone());
            }
        }

        let response = request.send().await.map_err(HttpToolsError::from)?;
        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        if method == Method::HEAD {
            return Ok(json!({ "status": status, "headers": headers }));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_body_limited(response, self.safety.max_response_bytes).await?;
        Ok(json!({
            "status": status,
            "headers": headers,
            "data": decode_body(&bytes, content_type.as_deref()),
        }))
    }
}

/// Header map as a JSON object; repeated headers are joined with `", "`.
fn flatten_headers(headers: &HeaderMap) -> Map<String, Value> {
    let mut out: Map<String, Value> = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match out.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                out.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    out
}

struct HttpGet(Arc<Fetcher>);
struct HttpHead(Arc<Fetcher>);

#[async_trait]
impl ToolHandler for HttpGet {
    async fn call(&self, args: Args, ctx: RequestContext) -> std::result::Result<Value, ToolError> {
        self.0.request(Method::GET, &args, &ctx).await
    }
}

#[async_trait]
impl ToolHandler for HttpHead {
    async fn call(&self, args: Args, ctx: RequestContext) -> std::result::Result<Value, ToolError> {
        self.0.request(Method::HEAD, &args, &ctx).await
    }
}

/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn server(policy: &PolicyConfig) -> Result<ServerDescriptor> {
    if policy.allowlist.is_empty() {
        warn!("FETCH_ALLOW is empty; every fetch will be rejected");
    } else {
        info!(domains = ?policy.allowlist.domains().collect::<Vec<_>>(), "fetch allowlist");
    }
    let safety =
        OutboundHttpSafety::allowlisted(policy.allowlist.clone(), policy.max_bytes_usize());
    let fetcher = Arc::new(Fetcher {
        client: safety.build_client()?,
        safety,
        timeout: policy.request_timeout,
    });
    let url_arg = || vec![ArgSpec::required("url", "string")];

    Ok(ServerDescriptor::builder("fetch-mcp")
        .tool(
            ToolDescriptor::new("httpGet", "GET a URL (allowlist enforced)", url_arg()),
            HttpGet(Arc::clone(&fetcher)),
        )?
        .tool(
            ToolDescriptor::new("httpHead", "HEAD a URL (allowlist enforced)", url_arg()),
            HttpHead(fetcher),
        )?
        .build())
}
