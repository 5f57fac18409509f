//! Unix socket client for the modax daemon.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use modax_shared::ipc::{Method, Request, Response, ResponseData};

/// Send one request and wait for the daemon's answer.
pub async fn call(socket_path: &Path, method: Method) -> Result<ResponseData> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("cannot reach modaxd at {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();

    let request = Request { id: 1, method };
    let mut payload = serde_json::to_string(&request)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("daemon closed the connection")?;

    let response: Response = serde_json::from_str(&line).context("invalid daemon response")?;
    response.result.map_err(|e| anyhow!(e))
}
