//! Runtime for executing declaratively configured REST proxy tools.
//!
//! A [`ProxyToolSource`] is built once from a validated [`ProxyDescriptor`] and the backend
//! secret taken from server configuration. It is immutable afterwards and cheap to clone.

use crate::config::{AuthConfig, DeclarativeToolConfig, ProxyDescriptor};
use crate::safety::{OutboundHttpSafety, read_body_limited, redact_url, sanitize_reqwest_error};
use crate::semantics::{is_read_only, parse_method};
use base64::Engine as _;
use mime::Mime;
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Blocked(String),
    #[error("{0}")]
    Http(String),
    #[error("http transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

/// Per-process settings that complete a descriptor.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Backend secret injected according to the descriptor's `auth` entry.
    pub secret: Option<String>,
    /// Allow tools whose method is not read-only.
    pub write_enabled: bool,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Response body limit.
    pub max_response_bytes: Option<usize>,
}

#[derive(Debug, Clone)]
struct ProxyTool {
    config: DeclarativeToolConfig,
    method: Method,
}

#[derive(Clone)]
pub struct ProxyToolSource {
    inner: Arc<ProxyToolSourceInner>,
}

struct ProxyToolSourceInner {
    name: String,
    base_url: Url,
    auth: Option<AuthConfig>,
    secret: Option<String>,
    tools: Vec<ProxyTool>,
    client: Client,
    timeout: Duration,
    write_enabled: bool,
    safety: OutboundHttpSafety,
}

impl ProxyToolSource {
    /// Build a proxy from a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the descriptor is invalid or the HTTP client cannot
    /// be built.
    pub fn new(
        name: impl Into<String>,
        descriptor: ProxyDescriptor,
        settings: ProxySettings,
    ) -> Result<Self> {
        descriptor.validate()?;
        let name = name.into();

        let base_url = Url::parse(&descriptor.base_url).map_err(|e| {
            HttpToolsError::Config(format!("invalid baseUrl '{}': {e}", descriptor.base_url))
        })?;

        let tools = descriptor
            .tools
            .into_iter()
            .map(|config| {
                let method = parse_method(&config.method).ok_or_else(|| {
                    HttpToolsError::Config(format!("invalid HTTP method '{}'", config.method))
                })?;
                Ok(ProxyTool { config, method })
            })
            .collect::<Result<Vec<_>>>()?;

        let secret = settings.secret.filter(|s| !s.is_empty());
        if descriptor.auth.is_some() && secret.is_none() {
            warn!(source = %name, "descriptor declares auth but no backend secret is configured");
        }

        let safety = OutboundHttpSafety::pinned(settings.max_response_bytes);
        let client = safety.build_client()?;

        Ok(Self {
            inner: Arc::new(ProxyToolSourceInner {
                name,
                base_url,
                auth: descriptor.auth,
                secret,
                tools,
                client,
                timeout: settings.timeout,
                write_enabled: settings.write_enabled,
                safety,
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn write_enabled(&self) -> bool {
        self.inner.write_enabled
    }

    /// Tool configurations in descriptor order.
    pub fn tools(&self) -> impl Iterator<Item = &DeclarativeToolConfig> {
        self.inner.tools.iter().map(|t| &t.config)
    }

    /// `true` if the named tool needs write mode.
    #[must_use]
    pub fn is_mutating(&self, tool_name: &str) -> bool {
        self.inner
            .tools
            .iter()
            .find(|t| t.config.name == tool_name)
            .is_some_and(|t| !is_read_only(&t.method))
    }

    /// Execute a tool call against the backend.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - [`HttpToolsError::Blocked`] for unknown tools and for mutating tools while write mode is
    ///   off (no request is sent in either case)
    /// - [`HttpToolsError::Config`] if the descriptor declares auth and no secret is configured
    /// - [`HttpToolsError::InvalidArgs`] for missing or unusable path parameters
    /// - [`HttpToolsError::Http`] / [`HttpToolsError::Transport`] for backend failures
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value> {
        let inner = &self.inner;
        let tool = inner
            .tools
            .iter()
            .find(|t| t.config.name == tool_name)
            .ok_or_else(|| HttpToolsError::Blocked(format!("unknown tool '{tool_name}'")))?;

        if !is_read_only(&tool.method) && !inner.write_enabled {
            return Err(HttpToolsError::Blocked(format!(
                "MCP_WRITE_DISABLED: tool '{tool_name}' uses {} and the server is read-only",
                tool.method
            )));
        }

        if inner.auth.is_some() && inner.secret.is_none() {
            return Err(HttpToolsError::Config(format!("{} secret not configured", inner.name)));
        }

        let url = build_url(&inner.base_url, &tool.config, arguments)?;
        inner.safety.check_url(&url)?;
        debug!(source = %inner.name, tool = %tool_name, url = %redact_url(&url), "proxy call");

        let mut request = inner
            .client
            .request(tool.method.clone(), url)
            .timeout(inner.timeout);
        request = apply_auth(inner.auth.as_ref(), inner.secret.as_deref(), request);
        if !is_read_only(&tool.method) {
            let body = arguments
                .get(tool.config.body_arg())
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| json!({}));
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_body_limited(response, inner.safety.max_response_bytes).await?;
        let body = decode_body(&bytes, content_type.as_deref());

        if status.is_success() {
            Ok(json!({ "status": status.as_u16(), "body": body }))
        } else {
            let reason = status.canonical_reason().unwrap_or("Unknown");
            Err(HttpToolsError::Http(format!(
                "API returned {} {reason}: {body}",
                status.as_u16()
            )))
        }
    }
}

fn build_url(
    base_url: &Url,
    tool: &DeclarativeToolConfig,
    arguments: &Map<String, Value>,
) -> Result<Url> {
    let mut path = tool.path.clone();
    if !path.starts_with('/') {
        path = format!("/{path}");
    }

    // Only declared path params are substituted; other argument names never reach the template.
    for param in &tool.path_params {
        let value = arguments
            .get(param)
            .filter(|v| !v.is_null())
            .ok_or_else(|| HttpToolsError::InvalidArgs(format!("{param} required")))?;
        let value = scalar_to_string(value).ok_or_else(|| {
            HttpToolsError::InvalidArgs(format!("{param} must be a string or number"))
        })?;
        if value.is_empty() || value == "." || value == ".." {
            return Err(HttpToolsError::InvalidArgs(format!(
                "{param} must be a non-empty path segment"
            )));
        }
        path = path.replace(&format!("{{{param}}}"), &encode_path_segment(&value));
    }

    let joined = format!("{}{}", base_url.as_str().trim_end_matches('/'), path);
    let mut url =
        Url::parse(&joined).map_err(|e| HttpToolsError::InvalidArgs(format!("invalid URL: {e}")))?;

    let mut pairs: Vec<(String, String)> = tool
        .query
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for name in &tool.query_params {
        if let Some(v) = arguments.get(name).filter(|v| !v.is_null()) {
            let v = scalar_to_string(v).ok_or_else(|| {
                HttpToolsError::InvalidArgs(format!("{name} must be a string, number, or bool"))
            })?;
            pairs.push((name.clone(), v));
        }
    }
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }

    if url.origin() != base_url.origin() {
        return Err(HttpToolsError::Blocked(format!(
            "resolved URL leaves backend origin {}",
            base_url.origin().ascii_serialization()
        )));
    }
    Ok(url)
}

fn apply_auth(
    auth: Option<&AuthConfig>,
    secret: Option<&str>,
    request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    let Some(secret) = secret else {
        return request;
    };
    match auth {
        Some(AuthConfig::Header { name }) => request.header(name.as_str(), secret),
        Some(AuthConfig::Bearer) => request.bearer_auth(secret),
        Some(AuthConfig::Basic) => request.basic_auth(secret, Some("")),
        None => request,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn encode_path_segment(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Decode a response body for a JSON envelope.
///
/// JSON content types are parsed (falling back to text), other UTF-8 bodies become strings,
/// and binary bodies become `{encoding: "base64", mimeType, data}`.
#[must_use]
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    let Ok(text) = std::str::from_utf8(bytes) else {
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        return json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": b64
        });
    };

    if is_json_content_type(content_type)
        && let Ok(v) = serde_json::from_str::<Value>(text)
    {
        return v;
    }
    Value::String(text.to_string())
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let Ok(m) = ct.parse::<Mime>() else {
        return false;
    };
    m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Uri};
    use axum::routing::any;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn tool(name: &str, method: &str, path: &str, path_params: &[&str]) -> DeclarativeToolConfig {
        DeclarativeToolConfig {
            name: name.to_string(),
            description: None,
            method: method.to_string(),
            path: path.to_string(),
            path_params: path_params.iter().map(|s| (*s).to_string()).collect(),
            query_params: Vec::new(),
            query: BTreeMap::new(),
            body_arg: None,
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn settings(write_enabled: bool) -> ProxySettings {
        ProxySettings {
            secret: Some("s3cret".to_string()),
            write_enabled,
            timeout: Duration::from_secs(5),
            max_response_bytes: Some(1024 * 1024),
        }
    }

    struct EchoServer {
        base_url: String,
        hits: Arc<AtomicUsize>,
        shutdown: tokio::sync::oneshot::Sender<()>,
    }

    async fn echo_server() -> EchoServer {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/{*path}",
            any(
                move |method: axum::http::Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        axum::Json(json!({
                            "method": method.as_str(),
                            "path": uri.path(),
                            "query": uri.query().unwrap_or(""),
                            "apiKey": headers.get("x-api-key").and_then(|v| v.to_str().ok()),
                            "body": String::from_utf8_lossy(&body),
                        }))
                    }
                },
            ),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let (shutdown, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });
        EchoServer {
            base_url: format!("http://{addr}"),
            hits,
            shutdown,
        }
    }

    fn source(base_url: &str, write_enabled: bool) -> ProxyToolSource {
        let mut list_tasks = tool(
            "listTasks",
            "GET",
            "/api/projects/{projectId}/tasks",
            &["projectId"],
        );
        list_tasks.query_params = vec!["status".to_string()];
        list_tasks.query.insert("limit".to_string(), "20".to_string());
        let descriptor = ProxyDescriptor {
            base_url: base_url.to_string(),
            auth: Some(AuthConfig::Header {
                name: "X-Api-Key".to_string(),
            }),
            tools: vec![list_tasks, tool("createTask", "POST", "/api/tasks", &[])],
        };
        ProxyToolSource::new("pm", descriptor, settings(write_enabled)).expect("valid descriptor")
    }

    #[test]
    fn path_params_are_encoded_and_undeclared_args_ignored() {
        let base = Url::parse("http://pm.local/").expect("url");
        let t = tool("get", "GET", "/items/{id}", &["id"]);
        let url = build_url(&base, &t, &args(json!({"id": "a/b c", "other": "{id}"})))
            .expect("url");
        assert_eq!(url.as_str(), "http://pm.local/items/a%2Fb%20c");
    }

    #[test]
    fn dot_segments_are_rejected() {
        let base = Url::parse("http://pm.local").expect("url");
        let t = tool("get", "GET", "/items/{id}/tasks", &["id"]);
        for bad in ["..", ".", ""] {
            let err = build_url(&base, &t, &args(json!({ "id": bad }))).unwrap_err();
            assert!(matches!(err, HttpToolsError::InvalidArgs(_)), "{bad:?}");
        }
    }

    #[test]
    fn missing_path_param_is_invalid_args() {
        let base = Url::parse("http://pm.local").expect("url");
        let t = tool("get", "GET", "/items/{id}", &["id"]);
        let err = build_url(&base, &t, &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "id required");
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_without_outbound_call() {
        let server = echo_server().await;
        let src = source(&server.base_url, true);
        let err = src.call_tool("dropAll", &Map::new()).await.unwrap_err();
        assert!(matches!(err, HttpToolsError::Blocked(_)));
        assert_eq!(server.hits.load(Ordering::SeqCst), 0);
        let _ = server.shutdown.send(());
    }

    #[tokio::test]
    async fn mutating_tool_requires_write_mode() {
        let server = echo_server().await;

        let read_only = source(&server.base_url, false);
        let err = read_only
            .call_tool("createTask", &args(json!({"body": {"title": "x"}})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("MCP_WRITE_DISABLED"));
        assert_eq!(server.hits.load(Ordering::SeqCst), 0);

        let writable = source(&server.base_url, true);
        let out = writable
            .call_tool("createTask", &args(json!({"body": {"title": "x"}})))
            .await
            .expect("write allowed");
        assert_eq!(out["status"], 200);
        assert_eq!(out["body"]["method"], "POST");
        assert_eq!(out["body"]["body"], r#"{"title":"x"}"#);
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
        let _ = server.shutdown.send(());
    }

    #[tokio::test]
    async fn head_and_options_tools_require_write_mode() {
        let server = echo_server().await;
        for method in ["HEAD", "OPTIONS"] {
            let descriptor = ProxyDescriptor {
                base_url: server.base_url.clone(),
                auth: None,
                tools: vec![tool("probeItems", method, "/api/items", &[])],
            };
            let src = ProxyToolSource::new("pm", descriptor, settings(false)).expect("valid");
            assert!(src.is_mutating("probeItems"), "{method}");
            let err = src.call_tool("probeItems", &Map::new()).await.unwrap_err();
            assert!(matches!(err, HttpToolsError::Blocked(_)), "{method}");
            assert!(err.to_string().contains("MCP_WRITE_DISABLED"), "{method}");
        }
        assert_eq!(server.hits.load(Ordering::SeqCst), 0);
        let _ = server.shutdown.send(());
    }

    #[tokio::test]
    async fn declared_auth_without_secret_fails_before_sending() {
        let server = echo_server().await;
        let descriptor = ProxyDescriptor {
            base_url: server.base_url.clone(),
            auth: Some(AuthConfig::Basic),
            tools: vec![tool("listInvoices", "GET", "/invoices", &[])],
        };
        let src = ProxyToolSource::new(
            "stripe-mcp",
            descriptor,
            ProxySettings {
                secret: Some(String::new()),
                ..settings(false)
            },
        )
        .expect("missing secret is not a startup error");
        let err = src.call_tool("listInvoices", &Map::new()).await.unwrap_err();
        assert!(matches!(err, HttpToolsError::Config(_)));
        assert!(err.to_string().contains("stripe-mcp secret not configured"));
        assert_eq!(server.hits.load(Ordering::SeqCst), 0);
        let _ = server.shutdown.send(());
    }

    #[tokio::test]
    async fn read_tool_injects_secret_and_query() {
        let server = echo_server().await;
        let src = source(&server.base_url, false);
        let out = src
            .call_tool(
                "listTasks",
                &args(json!({"projectId": 42, "status": "open", "apiKey": "caller-supplied"})),
            )
            .await
            .expect("call");
        let body = &out["body"];
        assert_eq!(body["path"], "/api/projects/42/tasks");
        assert_eq!(body["apiKey"], "s3cret");
        let query = body["query"].as_str().unwrap_or_default();
        assert!(query.contains("limit=20"));
        assert!(query.contains("status=open"));
        let _ = server.shutdown.send(());
    }

    #[tokio::test]
    async fn non_success_status_is_an_http_error() {
        let app = Router::new().route(
            "/missing",
            any(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        let handle = tokio::spawn(async move { axum::serve(listener, app).await });

        let descriptor = ProxyDescriptor {
            base_url: format!("http://{addr}"),
            auth: None,
            tools: vec![tool("missing", "GET", "/missing", &[])],
        };
        let src = ProxyToolSource::new("t", descriptor, settings(false)).expect("valid");
        let err = src.call_tool("missing", &Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "API returned 404 Not Found: \"nope\"");
        handle.abort();
    }

    #[test]
    fn decode_body_handles_json_text_and_binary() {
        assert_eq!(
            decode_body(br#"{"a":1}"#, Some("application/json; charset=utf-8")),
            json!({"a": 1})
        );
        assert_eq!(
            decode_body(br#"{"a":1}"#, Some("text/plain")),
            json!(r#"{"a":1}"#)
        );
        let bin = decode_body(&[0xff, 0xfe], Some("application/octet-stream"));
        assert_eq!(bin["encoding"], "base64");
    }
}
