#![allow(dead_code)]

pub mod pg;
pub mod sse;

use anyhow::Context as _;
use serde_json::Value;

pub use toolgate_test_support::{Gateway, init_git_repo};

pub async fn spawn_gateway(env: &[(&str, &str)]) -> anyhow::Result<Gateway> {
    toolgate_test_support::spawn_gateway(env!("CARGO_BIN_EXE_toolgate"), env).await
}

/// POST a dispatch request and return the status code and the JSON envelope.
pub async fn invoke(base_url: &str, body: &Value) -> anyhow::Result<(u16, Value)> {
    let resp = reqwest::Client::new()
        .post(format!("{base_url}/invoke"))
        .json(body)
        .send()
        .await
        .context("send invoke")?;
    let status = resp.status().as_u16();
    let envelope = resp.json().await.context("parse invoke envelope")?;
    Ok((status, envelope))
}
