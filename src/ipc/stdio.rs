use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{dispatch, RpcRequest, ToolHandler};
use crate::error::Result;

/// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
pub async fn serve_stdio(handler: &dyn ToolHandler) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_lines(handler, stdin, stdout).await
}

/// Read one request per line from `input`, write one response per line to
/// `output`. Blank and unparseable lines are skipped.
pub async fn serve_lines<R, W>(handler: &dyn ToolHandler, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed request line");
                continue;
            }
        };

        if let Some(response) = dispatch(handler, &request).await {
            let mut json = serde_json::to_string(&response)?;
            json.push('\n');
            output.write_all(json.as_bytes()).await?;
            output.flush().await?;
        }
    }
    Ok(())
}
