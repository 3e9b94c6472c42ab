mod common;

use common::{invoke, spawn_gateway};
use serde_json::json;

#[tokio::test]
async fn reads_inside_roots_and_rejects_escapes() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    std::fs::write(root.path().join("notes.txt"), "hello")?;
    let root_str = root.path().to_str().unwrap_or_default();
    let gw = spawn_gateway(&[("MCP_KIND", "fs"), ("FS_ROOTS", root_str), ("MODE", "read-only")])
        .await?;

    let (status, body) =
        invoke(&gw.base_url, &json!({ "tool": "readFile", "args": { "file": "notes.txt" } }))
            .await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["result"]["content"], "hello");

    let escape = format!("{root_str}/../etc/passwd");
    let (status, body) =
        invoke(&gw.base_url, &json!({ "tool": "readFile", "args": { "file": escape } })).await?;
    assert_eq!(
        (status, body),
        (403, json!({ "ok": false, "error": "path outside allowed roots" }))
    );

    let sibling = format!("{root_str}-other/secret");
    let (status, _) =
        invoke(&gw.base_url, &json!({ "tool": "listDir", "args": { "dir": sibling } })).await?;
    assert_eq!(status, 403);

    let (status, _) = invoke(
        &gw.base_url,
        &json!({ "tool": "write", "args": { "file": "x.txt", "content": "y" } }),
    )
    .await?;
    assert_eq!(status, 404, "write is not registered in read-only mode");
    Ok(())
}

#[tokio::test]
async fn write_mode_registers_write() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let root_str = root.path().to_str().unwrap_or_default();
    let gw = spawn_gateway(&[("MCP_KIND", "fs"), ("FS_ROOTS", root_str), ("MODE", "write")]).await?;

    let (status, body) = invoke(
        &gw.base_url,
        &json!({ "tool": "write", "args": { "file": "a/b.txt", "content": "data" } }),
    )
    .await?;
    assert_eq!(status, 200, "{body}");
    assert_eq!(std::fs::read_to_string(root.path().join("a/b.txt"))?, "data");
    Ok(())
}
