//! Newline-delimited JSON-RPC over stdio.
//!
//! Each request runs on its own task; responses are funnelled through a
//! channel to a single writer so frames never interleave on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{
    stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines,
    Stdin, Stdout,
};
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::rpc::{self, RpcError};
use crate::server::McpServerState;

/// Responses waiting for the writer before handlers start to block.
const OUTBOUND_CAPACITY: usize = 64;

/// Line-oriented transport over any async reader/writer pair.
pub struct StdioTransport<R, W> {
    lines: Lines<R>,
    writer: MessageWriter<W>,
}

impl StdioTransport<BufReader<Stdin>, Stdout> {
    /// Transport bound to the process stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(stdin()), stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: reader.lines(),
            writer: MessageWriter { writer },
        }
    }
}

/// Writes one JSON frame per line and flushes after each.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    // Keep BrokenPipe as an io::Error so the caller can treat it as a disconnect.
    fn check_io<T>(res: std::io::Result<T>) -> Result<T> {
        match res {
            Ok(v) => Ok(v),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Client disconnected",
            )
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_message(&mut self, msg: &Value) -> Result<()> {
        let s = serde_json::to_string(msg)?;
        Self::check_io(self.writer.write_all(s.as_bytes()).await)?;
        Self::check_io(self.writer.write_all(b"\n").await)?;
        Self::check_io(self.writer.flush().await)?;
        Ok(())
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::BrokenPipe)
}

async fn write_loop<W>(mut writer: MessageWriter<W>, mut outbound: mpsc::Receiver<Value>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(e) = writer.write_message(&message).await {
            if is_broken_pipe(&e) {
                info!("Client disconnected (broken pipe)");
                return Ok(());
            }
            return Err(e.context("failed to write response"));
        }
    }
    Ok(())
}

/// Run the server loop until EOF, Ctrl-C or client disconnect.
///
/// On EOF, handlers already in flight finish and their responses are written
/// before this returns.
pub async fn run_server_loop<R, W>(
    transport: StdioTransport<R, W>,
    state: Arc<McpServerState>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let StdioTransport { mut lines, writer } = transport;
    let (tx, rx) = mpsc::channel::<Value>(OUTBOUND_CAPACITY);
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let mut handlers = JoinSet::new();

    info!("MCP server initialized, waiting for requests...");

    loop {
        select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, exiting gracefully");
                handlers.abort_all();
                break;
            }

            _ = tx.closed() => {
                break;
            }

            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    error!("request handler panicked: {}", e);
                }
            }

            line = lines.next_line() => {
                match line.context("failed to read line")? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Value>(line) {
                            Ok(message) => {
                                let state = Arc::clone(&state);
                                let tx = tx.clone();
                                handlers.spawn(async move {
                                    if let Some(response) = rpc::handle_message(&state, message).await {
                                        if tx.send(response).await.is_err() {
                                            debug!("response dropped; writer has stopped");
                                        }
                                    }
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "unparsable frame");
                                let response = rpc::failure(Value::Null, RpcError::parse_error(e));
                                if tx.send(response).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    None => {
                        info!("Client disconnected (EOF)");
                        break;
                    }
                }
            }
        }
    }

    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                error!("request handler panicked: {}", e);
            }
        }
    }
    drop(tx);

    writer_task
        .await
        .context("response writer task failed")??;
    info!("Shutdown complete");
    Ok(())
}
