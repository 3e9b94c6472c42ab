use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::Value;

/// Read SSE events until `count` events have been seen; returns `(event name, JSON data)`.
pub async fn read_events(
    resp: reqwest::Response,
    count: usize,
) -> anyhow::Result<Vec<(String, Value)>> {
    let mut stream = sse_stream::SseStream::from_byte_stream(resp.bytes_stream());
    let mut out = Vec::new();
    while let Some(evt) = stream.next().await {
        let evt = evt.context("read SSE event")?;
        let payload = evt.data.unwrap_or_default();
        if payload.trim().is_empty() {
            continue;
        }
        let data = serde_json::from_str(&payload).context("parse SSE data as JSON")?;
        out.push((evt.event.unwrap_or_default(), data));
        if out.len() == count {
            return Ok(out);
        }
    }
    anyhow::bail!("event-stream ended after {} events", out.len())
}
