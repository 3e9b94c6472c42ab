//! Helpers shared by the gateway's integration tests: port picking, readiness polling, child
//! process cleanup and git repository fixtures.

use anyhow::Context as _;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status (2xx/3xx).
///
/// # Errors
///
/// Returns an error if the timeout elapses before the endpoint returns a success status.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// A running gateway child process.
pub struct Gateway {
    pub base_url: String,
    _child: KillOnDrop,
}

/// Start the gateway binary on a free port with the given environment and wait for
/// `/healthz`.
///
/// The child inherits the test's environment; pass every variable the test depends on.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned or does not become healthy in time.
pub async fn spawn_gateway(bin: &str, env: &[(&str, &str)]) -> anyhow::Result<Gateway> {
    let port = pick_unused_port()?;
    let child = Command::new(bin)
        .env("BIND", format!("127.0.0.1:{port}"))
        .env("LOG_LEVEL", "debug")
        .envs(env.iter().copied())
        .spawn()
        .with_context(|| format!("spawn {bin}"))?;
    let child = KillOnDrop(child);
    let base_url = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base_url}/healthz"), Duration::from_secs(20)).await?;
    Ok(Gateway {
        base_url,
        _child: child,
    })
}

fn git(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> anyhow::Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Fixture Author")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_COMMITTER_NAME", "Fixture Author")
        .env("GIT_COMMITTER_EMAIL", "author@example.com")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .envs(env.iter().copied())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("run git {args:?}"))?;
    anyhow::ensure!(status.success(), "git {args:?} failed with {status}");
    Ok(())
}

/// Create a repository at `dir` on branch `main` with one commit per subject, oldest first.
/// Commit dates are one day apart starting 2026-01-01.
///
/// # Errors
///
/// Returns an error if git is unavailable or any git command fails.
pub fn init_git_repo(dir: &Path, subjects: &[&str]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    git(dir, &["init", "-q", "-b", "main"], &[])?;
    for (i, subject) in subjects.iter().enumerate() {
        std::fs::write(dir.join("file.txt"), format!("revision {i}\n"))
            .context("write fixture file")?;
        git(dir, &["add", "file.txt"], &[])?;
        let date = format!("2026-01-{:02}T12:00:00+00:00", i + 1);
        git(
            dir,
            &["commit", "-q", "--no-gpg-sign", "-m", subject],
            &[("GIT_AUTHOR_DATE", date.as_str()), ("GIT_COMMITTER_DATE", date.as_str())],
        )?;
    }
    Ok(())
}
