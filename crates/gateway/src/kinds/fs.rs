//! `fs-mcp`: directory listing, file reads, glob search and (in write mode) file writes, all
//! confined to the configured roots.

use crate::config::PolicyConfig;
use crate::error::{Result, ToolError};
use crate::policy::PathSandbox;
use crate::registry::{
    ArgSpec, Args, RequestContext, ServerDescriptor, ToolDescriptor, ToolHandler, required_str,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on `search` results.
const MAX_SEARCH_RESULTS: usize = 1000;

struct FsContext {
    sandbox: PathSandbox,
    max_bytes: u64,
}

struct ListDir(Arc<FsContext>);
struct ReadFile(Arc<FsContext>);
struct Search(Arc<FsContext>);
struct WriteFile(Arc<FsContext>);

#[async_trait]
impl ToolHandler for ListDir {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let dir = self.0.sandbox.resolve(required_str(&args, "dir")?)?;
        let mut reader = tokio::fs::read_dir(&dir).await?;
        let mut entries: Vec<(String, &'static str)> = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() {
                "dir"
            } else {
                "file"
            };
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort();
        Ok(Value::Array(
            entries
                .into_iter()
                .map(|(name, kind)| json!({ "name": name, "type": kind }))
                .collect(),
        ))
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let path = self.0.sandbox.resolve(required_str(&args, "file")?)?;
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(ToolError::InvalidArgs(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if meta.len() > self.0.max_bytes {
            return Err(ToolError::Policy(format!(
                "file is {} bytes, limit is {}",
                meta.len(),
                self.0.max_bytes
            )));
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok(json!({
            "path": path.to_string_lossy(),
            "content": String::from_utf8_lossy(&bytes),
        }))
    }
}

#[async_trait]
impl ToolHandler for Search {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let pattern = required_str(&args, "pattern")?.to_string();
        if pattern.starts_with('/') || pattern.split(['/', '\\']).any(|part| part == "..") {
            return Err(ToolError::Policy(
                "pattern must be relative and may not contain '..'".into(),
            ));
        }
        glob::Pattern::new(&pattern)
            .map_err(|e| ToolError::InvalidArgs(format!("invalid pattern: {e}")))?;

        let ctx = Arc::clone(&self.0);
        let (matches, truncated) =
            tokio::task::spawn_blocking(move || search_roots(&ctx.sandbox, &pattern))
                .await
                .map_err(|e| ToolError::Backend(format!("search task failed: {e}")))??;
        Ok(json!({ "matches": matches, "truncated": truncated }))
    }
}

fn search_roots(
    sandbox: &PathSandbox,
    pattern: &str,
) -> std::result::Result<(Vec<String>, bool), ToolError> {
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();
    let mut truncated = false;
    'roots: for root in sandbox.roots() {
        let root_pattern = glob::Pattern::escape(&root.to_string_lossy());
        let full = format!("{}/{pattern}", root_pattern.trim_end_matches('/'));
        let paths = glob::glob(&full)
            .map_err(|e| ToolError::InvalidArgs(format!("invalid pattern: {e}")))?;
        // Unreadable entries are skipped.
        for path in paths.flatten() {
            if !path.is_file() || !sandbox.contains_real(&path) {
                continue;
            }
            if found.len() >= MAX_SEARCH_RESULTS && !found.contains(&path) {
                truncated = true;
                break 'roots;
            }
            found.insert(path);
        }
    }
    debug!(pattern, hits = found.len(), truncated, "fs search");
    Ok((
        found
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        truncated,
    ))
}

#[async_trait]
impl ToolHandler for WriteFile {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let path = self.0.sandbox.resolve(required_str(&args, "file")?)?;
        let content = match args.get("content") {
            Some(Value::String(s)) => s.as_str(),
            _ => return Err(ToolError::InvalidArgs("content must be a string".into())),
        };
        if content.len() as u64 > self.0.max_bytes {
            return Err(ToolError::Policy(format!(
                "content is {} bytes, limit is {}",
                content.len(),
                self.0.max_bytes
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content.as_bytes()).await?;
        Ok(json!({ "path": path.to_string_lossy(), "bytes": content.len() }))
    }
}

/// # Errors
///
/// Returns [`crate::error::GatewayError::Config`] if `FS_ROOTS` is unusable.
pub fn server(policy: &PolicyConfig) -> Result<ServerDescriptor> {
    let ctx = Arc::new(FsContext {
        sandbox: policy.fs_sandbox()?,
        max_bytes: policy.max_bytes,
    });

    let mut builder = ServerDescriptor::builder("fs-mcp")
        .tool(
            ToolDescriptor::new(
                "listDir",
                "List directory entries",
                vec![ArgSpec::required("dir", "string")],
            ),
            ListDir(Arc::clone(&ctx)),
        )?
        .tool(
            ToolDescriptor::new(
                "readFile",
                "Read a text file",
                vec![ArgSpec::required("file", "string")],
            ),
            ReadFile(Arc::clone(&ctx)),
        )?
        .tool(
            ToolDescriptor::new(
                "search",
                "Find files under the allowed roots by glob pattern",
                vec![
                    ArgSpec::required("pattern", "string")
                        .describe("relative glob, e.g. **/*.md"),
                ],
            ),
            Search(Arc::clone(&ctx)),
        )?;
    if policy.write_enabled {
        builder = builder.tool(
            ToolDescriptor::new(
                "write",
                "Write a text file, creating parent directories",
                vec![
                    ArgSpec::required("file", "string"),
                    ArgSpec::required("content", "string"),
                ],
            ),
            WriteFile(ctx),
        )?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::test_policy;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("docs/nested")).expect("mkdir");
        std::fs::write(dir.path().join("b.txt"), "bee").expect("write");
        std::fs::write(dir.path().join("docs/a.md"), "# a").expect("write");
        std::fs::write(dir.path().join("docs/nested/c.md"), "# c").expect("write");
        std::fs::write(dir.path().join("big.bin"), vec![b'x'; 2048]).expect("write");
        dir
    }

    fn fs_server(dir: &TempDir, write: bool) -> ServerDescriptor {
        let policy = test_policy::policy(dir.path().to_str().expect("utf8"), write);
        server(&policy).expect("fs server")
    }

    fn args(value: Value) -> Args {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn call(
        server: &ServerDescriptor,
        tool: &str,
        value: Value,
    ) -> std::result::Result<Value, ToolError> {
        server
            .handler(tool)
            .expect("registered tool")
            .call(args(value), RequestContext::default())
            .await
    }

    #[tokio::test]
    async fn list_dir_is_sorted_and_typed() {
        let dir = fixture();
        let server = fs_server(&dir, false);
        let root = dir.path().to_str().expect("utf8");
        let out = call(&server, "listDir", json!({ "dir": root })).await.expect("list");
        assert_eq!(
            out,
            json!([
                {"name": "b.txt", "type": "file"},
                {"name": "big.bin", "type": "file"},
                {"name": "docs", "type": "dir"},
            ])
        );
    }

    #[tokio::test]
    async fn read_file_respects_roots_and_size() {
        let dir = fixture();
        let server = fs_server(&dir, false);
        let out = call(&server, "readFile", json!({ "file": "docs/a.md" })).await.expect("read");
        assert_eq!(out["content"], "# a");
        assert!(out["path"].as_str().expect("path").ends_with("docs/a.md"));

        let err = call(&server, "readFile", json!({ "file": "big.bin" })).await.unwrap_err();
        assert!(matches!(err, ToolError::Policy(_)));

        let err = call(&server, "readFile", json!({ "file": "../../etc/passwd" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Policy(ref m) if m == "path outside allowed roots"));

        let err = call(&server, "readFile", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn search_matches_files_under_roots() {
        let dir = fixture();
        let server = fs_server(&dir, false);
        let out = call(&server, "search", json!({ "pattern": "**/*.md" })).await.expect("search");
        let matches: Vec<&str> = out["matches"]
            .as_array()
            .expect("array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].ends_with("docs/a.md"));
        assert!(matches[1].ends_with("docs/nested/c.md"));
        assert_eq!(out["truncated"], false);

        for bad in ["/etc/*", "../*", "docs/../../*"] {
            let err = call(&server, "search", json!({ "pattern": bad })).await.unwrap_err();
            assert!(matches!(err, ToolError::Policy(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn write_is_only_registered_in_write_mode() {
        let dir = fixture();
        assert!(fs_server(&dir, false).handler("write").is_none());

        let server = fs_server(&dir, true);
        let out = call(&server, "write", json!({ "file": "new/dir/out.txt", "content": "hello" }))
            .await
            .expect("write");
        assert_eq!(out["bytes"], 5);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new/dir/out.txt")).expect("written"),
            "hello"
        );

        let err = call(&server, "write", json!({ "file": "x.txt", "content": "y".repeat(2048) }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Policy(_)));
    }
}
