//! Declarative REST proxy descriptor.
//!
//! A descriptor document names one backend base URL, where the backend secret goes, and the
//! list of tools the proxy exposes. The secret value itself is never part of the document: it
//! is supplied by the server configuration when the runtime is built.

use crate::runtime::{HttpToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use url::Url;

/// A whole descriptor document (`tools.json` / `tools.yaml`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDescriptor {
    /// Backend base URL every tool path is appended to. May be left out of a document and
    /// filled in from server configuration before validation.
    #[serde(default)]
    pub base_url: String,

    /// Where to inject the backend secret.
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Tools exposed by this proxy, in discovery order.
    #[serde(default)]
    pub tools: Vec<DeclarativeToolConfig>,
}

/// Secret placement. The secret value comes from server configuration only.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// `<name>: <secret>`
    Header { name: String },
    /// `Authorization: Bearer <secret>`
    Bearer,
    /// `Authorization: Basic base64(<secret>:)`
    Basic,
}

/// One declaratively configured tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeToolConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_method")]
    pub method: String,

    /// Path template, e.g. `/api/projects/{projectId}/tasks`.
    #[serde(alias = "pathTemplate")]
    pub path: String,

    /// Arguments substituted into `{placeholder}`s of `path`.
    #[serde(default)]
    pub path_params: Vec<String>,

    /// Arguments forwarded as query parameters when present.
    #[serde(default)]
    pub query_params: Vec<String>,

    /// Fixed query parameters sent on every call.
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Argument whose value becomes the JSON request body (non-read methods only).
    #[serde(default)]
    pub body_arg: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl DeclarativeToolConfig {
    /// Argument carrying the request body (`body` unless overridden).
    #[must_use]
    pub fn body_arg(&self) -> &str {
        self.body_arg.as_deref().unwrap_or("body")
    }
}

impl ProxyDescriptor {
    /// Read a descriptor document. `.yaml`/`.yml` files are parsed as YAML, everything else as
    /// JSON. The result is not validated yet; [`crate::runtime::ProxyToolSource::new`] does that.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HttpToolsError::Config(format!("read descriptor {}: {e}", path.display()))
        })?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let descriptor: Self = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| {
                HttpToolsError::Config(format!("parse descriptor {}: {e}", path.display()))
            })?
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                HttpToolsError::Config(format!("parse descriptor {}: {e}", path.display()))
            })?
        };
        Ok(descriptor)
    }

    /// Check the document's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the base URL is not an absolute http(s) URL, a tool
    /// name is empty or repeated, a method is not a valid HTTP method, or the declared path
    /// parameters and the `{placeholders}` of the path template disagree.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            HttpToolsError::Config(format!("invalid baseUrl '{}': {e}", self.base_url))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(HttpToolsError::Config(format!(
                "baseUrl '{}' must use http or https",
                self.base_url
            )));
        }
        if let Some(AuthConfig::Header { name }) = &self.auth
            && reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err()
        {
            return Err(HttpToolsError::Config(format!(
                "invalid auth header name '{name}'"
            )));
        }

        let mut names: HashSet<&str> = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(HttpToolsError::Config("tool name must be non-empty".into()));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(HttpToolsError::Config(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
            if crate::semantics::parse_method(&tool.method).is_none() {
                return Err(HttpToolsError::Config(format!(
                    "invalid HTTP method '{}' in tool '{}'",
                    tool.method, tool.name
                )));
            }
            validate_path_template(tool)?;
        }
        Ok(())
    }
}

fn validate_path_template(tool: &DeclarativeToolConfig) -> Result<()> {
    let placeholders = path_placeholders(&tool.path).map_err(|msg| {
        HttpToolsError::Config(format!("tool '{}': {msg}", tool.name))
    })?;

    for param in &tool.path_params {
        if !placeholders.iter().any(|p| p == param) {
            return Err(HttpToolsError::Config(format!(
                "tool '{}': pathParam '{param}' has no {{{param}}} placeholder in '{}'",
                tool.name, tool.path
            )));
        }
    }
    for placeholder in &placeholders {
        if !tool.path_params.contains(placeholder) {
            return Err(HttpToolsError::Config(format!(
                "tool '{}': placeholder {{{placeholder}}} is not declared in pathParams",
                tool.name
            )));
        }
    }
    Ok(())
}

/// Extract `{name}` placeholders from a path template.
pub(crate) fn path_placeholders(template: &str) -> std::result::Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        if rest[..start].contains('}') {
            return Err(format!("stray '}}' in '{template}'"));
        }
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(format!("unterminated placeholder in '{template}'"));
        };
        let name = &after[..end];
        if name.is_empty() || name.contains('{') {
            return Err(format!("malformed placeholder in '{template}'"));
        }
        out.push(name.to_string());
        rest = &after[end + 1..];
    }
    if rest.contains('}') {
        return Err(format!("stray '}}' in '{template}'"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn tool(path: &str, params: &[&str]) -> DeclarativeToolConfig {
        DeclarativeToolConfig {
            name: "t".to_string(),
            description: None,
            method: "GET".to_string(),
            path: path.to_string(),
            path_params: params.iter().map(|s| (*s).to_string()).collect(),
            query_params: Vec::new(),
            query: BTreeMap::new(),
            body_arg: None,
        }
    }

    fn descriptor(tools: Vec<DeclarativeToolConfig>) -> ProxyDescriptor {
        ProxyDescriptor {
            base_url: "http://pm.local".to_string(),
            auth: None,
            tools,
        }
    }

    #[test]
    fn placeholders_are_extracted_in_order() {
        assert_eq!(
            path_placeholders("/a/{x}/b/{y}").expect("valid"),
            vec!["x".to_string(), "y".to_string()]
        );
        assert!(path_placeholders("/a/{x").is_err());
        assert!(path_placeholders("/a/{}").is_err());
    }

    #[test]
    fn declared_param_without_placeholder_is_rejected() {
        let d = descriptor(vec![tool("/projects", &["projectId"])]);
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("projectId"));
    }

    #[test]
    fn undeclared_placeholder_is_rejected() {
        let d = descriptor(vec![tool("/projects/{projectId}", &[])]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let d = descriptor(vec![tool("/a", &[]), tool("/b", &[])]);
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let mut t = tool("/a", &[]);
        t.method = "GE T".to_string();
        assert!(descriptor(vec![t]).validate().is_err());
    }

    #[test]
    fn load_reads_json_and_yaml() {
        let mut json_file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(
            json_file,
            r#"{{"baseUrl":"http://pm.local","auth":{{"type":"header","name":"X-Api-Key"}},
               "tools":[{{"name":"listTasks","path":"/api/projects/{{projectId}}/tasks","pathParams":["projectId"]}}]}}"#
        )
        .expect("write");
        let d = ProxyDescriptor::load(json_file.path()).expect("json descriptor");
        d.validate().expect("valid");
        assert_eq!(d.tools[0].method, "GET");
        assert_eq!(
            d.auth,
            Some(AuthConfig::Header {
                name: "X-Api-Key".to_string()
            })
        );

        let mut yaml_file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("tempfile");
        write!(
            yaml_file,
            "baseUrl: http://pm.local\ntools:\n  - name: createTask\n    method: POST\n    pathTemplate: /api/tasks\n"
        )
        .expect("write");
        let d = ProxyDescriptor::load(yaml_file.path()).expect("yaml descriptor");
        d.validate().expect("valid");
        assert_eq!(d.tools[0].path, "/api/tasks");
        assert_eq!(d.tools[0].body_arg(), "body");
    }

    #[test]
    fn missing_base_url_parses_but_does_not_validate() {
        let mut f = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(f, r#"{{"tools":[{{"name":"a","path":"/a"}}]}}"#).expect("write");
        let mut d = ProxyDescriptor::load(f.path()).expect("parses");
        assert!(d.base_url.is_empty());
        assert!(d.validate().is_err());
        d.base_url = "https://api.example.com".to_string();
        d.validate().expect("valid once filled");
    }

    #[test]
    fn load_rejects_malformed_document() {
        let mut f = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(f, "{{\"tools\": 3}}").expect("write");
        assert!(matches!(
            ProxyDescriptor::load(f.path()),
            Err(HttpToolsError::Config(_))
        ));
    }
}
