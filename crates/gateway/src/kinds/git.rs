//! `git-mcp`: recent commits and diffs of repositories under the configured roots.
//!
//! Every call runs `git` as an isolated subprocess: no stdin, no pager, no prompts, no external
//! diff or textconv drivers, a wall-clock timeout, and a cap on captured output.

use crate::config::PolicyConfig;
use crate::error::{Result, ToolError};
use crate::policy::PathSandbox;
use crate::registry::{
    ArgSpec, Args, RequestContext, ServerDescriptor, ToolDescriptor, ToolHandler, optional_u64,
    required_str,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_COMMITS: u64 = 10;
const MAX_COMMITS: u64 = 1000;

struct GitContext {
    sandbox: PathSandbox,
    timeout: Duration,
}

impl GitContext {
    fn repo(&self, args: &Args) -> std::result::Result<std::path::PathBuf, ToolError> {
        let repo = self.sandbox.resolve(required_str(args, "repo")?)?;
        if !repo.is_dir() {
            return Err(ToolError::InvalidArgs(format!(
                "repository {} does not exist",
                repo.display()
            )));
        }
        Ok(repo)
    }

    /// Run git in `repo` and return stdout as UTF-8 (lossy).
    async fn run(&self, repo: &Path, args: &[&str]) -> std::result::Result<String, ToolError> {
        debug!(repo = %repo.display(), ?args, "git");
        let mut child = Command::new("git")
            .arg("--no-pager")
            .args(args)
            .current_dir(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_OPTIONAL_LOCKS", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Backend(format!("failed to start git: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let work = async {
            let (out, err) = tokio::join!(read_capped(stdout), read_capped(stderr));
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out?, err?))
        };

        let (status, out, err) = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ToolError::Backend(format!(
                    "git timed out after {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        if out.len() as u64 > MAX_OUTPUT_BYTES {
            return Err(ToolError::Policy(format!(
                "git output exceeds {MAX_OUTPUT_BYTES} bytes"
            )));
        }
        if !status.success() {
            let stderr = String::from_utf8_lossy(&err);
            let message = stderr.trim();
            return Err(ToolError::Backend(if message.is_empty() {
                format!("git exited with {status}")
            } else {
                message.to_string()
            }));
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Read at most one byte past the output cap, then drop the pipe.
async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.take(MAX_OUTPUT_BYTES + 1).read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Reject empty and option-like revisions.
fn revision<'a>(args: &'a Args, name: &str) -> std::result::Result<&'a str, ToolError> {
    let rev = required_str(args, name)?;
    if rev.starts_with('-') {
        return Err(ToolError::Policy(format!("{name} may not start with '-'")));
    }
    if rev.contains('\0') {
        return Err(ToolError::InvalidArgs(format!("{name} contains NUL")));
    }
    Ok(rev)
}

fn parse_log(output: &str) -> Vec<Value> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.splitn(4, '\t');
            let mut next = || parts.next().unwrap_or_default();
            json!({
                "hash": next(),
                "author": next(),
                "date": next(),
                "subject": next(),
            })
        })
        .collect()
}

struct RecentCommits(Arc<GitContext>);
struct Diff(Arc<GitContext>);

#[async_trait]
impl ToolHandler for RecentCommits {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let repo = self.0.repo(&args)?;
        let branch = revision(&args, "branch")?;
        let n = optional_u64(&args, "n")?
            .unwrap_or(DEFAULT_COMMITS)
            .min(MAX_COMMITS)
            .to_string();
        let output = self
            .0
            .run(
                &repo,
                &[
                    "log",
                    "-n",
                    n.as_str(),
                    "--date=iso-strict",
                    "--pretty=format:%h%x09%an%x09%ad%x09%s",
                    branch,
                    "--",
                ],
            )
            .await?;
        Ok(Value::Array(parse_log(&output)))
    }
}

#[async_trait]
impl ToolHandler for Diff {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        let repo = self.0.repo(&args)?;
        let rev = revision(&args, "rev")?;
        let diff = self
            .0
            .run(
                &repo,
                &["diff", "--no-ext-diff", "--no-textconv", "--no-color", rev, "--"],
            )
            .await?;
        Ok(json!({ "rev": rev, "diff": diff }))
    }
}

/// # Errors
///
/// Returns [`crate::error::GatewayError::Config`] if `GIT_ROOT` is unusable.
pub fn server(policy: &PolicyConfig) -> Result<ServerDescriptor> {
    let ctx = Arc::new(GitContext {
        sandbox: policy.git_sandbox()?,
        timeout: policy.request_timeout,
    });
    Ok(ServerDescriptor::builder("git-mcp")
        .tool(
            ToolDescriptor::new(
                "recentCommits",
                "List recent commits on a branch",
                vec![
                    ArgSpec::required("repo", "string"),
                    ArgSpec::required("branch", "string"),
                    ArgSpec::optional("n", "number")
                        .describe("number of commits (0-1000), default 10"),
                ],
            ),
            RecentCommits(Arc::clone(&ctx)),
        )?
        .tool(
            ToolDescriptor::new(
                "diff",
                "Diff for a ref or range",
                vec![
                    ArgSpec::required("repo", "string"),
                    ArgSpec::required("rev", "string").describe("e.g. HEAD~1..HEAD"),
                ],
            ),
            Diff(ctx),
        )?
        .build())
}
