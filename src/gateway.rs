//! Transport seam between the chat platform and the dispatcher.
//!
//! The platform connection itself lives outside this crate. A bridge
//! process feeds invocations in as JSON lines and reads responses back the
//! same way, which keeps the bot testable without a live gateway.

use crate::dispatch::{CommandInvocation, Dispatcher, Response};
use crate::BotError;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};

/// Source of invocations and sink for responses.
#[async_trait]
pub trait Gateway: Send {
    /// Next invocation, or `None` once the transport is closed.
    ///
    /// Must be cancel safe: [`serve`] races it against shutdown and
    /// completed handlers, checking those first.
    async fn next_invocation(&mut self) -> Result<Option<CommandInvocation>, BotError>;

    /// Hand a response back to the transport.
    async fn deliver(&mut self, response: &Response) -> Result<(), BotError>;
}

/// Line-delimited JSON over any async reader/writer pair.
pub struct LineGateway<R, W> {
    lines: Lines<R>,
    writer: W,
}

impl LineGateway<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Read invocations from stdin, write responses to stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineGateway<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: reader.lines(),
            writer,
        }
    }

    /// Give back the writer, e.g. to inspect output in tests.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn io_err(e: std::io::Error) -> BotError {
    BotError::Internal(format!("gateway I/O: {}", e))
}

#[async_trait]
impl<R, W> Gateway for LineGateway<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_invocation(&mut self) -> Result<Option<CommandInvocation>, BotError> {
        loop {
            let Some(line) = self.lines.next_line().await.map_err(io_err)? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line)
                .map(Some)
                .map_err(|e| BotError::invalid("invocation", e.to_string()));
        }
    }

    async fn deliver(&mut self, response: &Response) -> Result<(), BotError> {
        let mut line = serde_json::to_vec(response)
            .map_err(|e| BotError::Internal(format!("response encoding: {}", e)))?;
        line.push(b'\n');
        self.writer.write_all(&line).await.map_err(io_err)?;
        self.writer.flush().await.map_err(io_err)
    }
}

/// Pump invocations from `gateway` through `dispatcher` until the transport
/// closes or `shutdown` resolves.
///
/// Invocations run concurrently and responses are delivered in completion
/// order. After shutdown no new invocations are read, but those already in
/// flight run to completion and are delivered.
pub async fn serve<G, S>(
    gateway: &mut G,
    dispatcher: Arc<Dispatcher>,
    shutdown: S,
) -> Result<(), BotError>
where
    G: Gateway + ?Sized,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut in_flight = FuturesUnordered::new();
    let mut reading = true;

    while reading || !in_flight.is_empty() {
        tokio::select! {
            biased;

            _ = &mut shutdown, if reading => {
                tracing::info!(in_flight = in_flight.len(), "shutdown requested, draining");
                reading = false;
            }
            Some(response) = in_flight.next(), if !in_flight.is_empty() => {
                gateway.deliver(&response).await?;
            }
            next = gateway.next_invocation(), if reading => match next {
                Ok(Some(invocation)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    in_flight.push(async move { dispatcher.dispatch(invocation).await });
                }
                Ok(None) => {
                    tracing::info!("gateway closed");
                    reading = false;
                }
                Err(e @ BotError::InvalidFormat { .. }) => {
                    tracing::warn!(error = %e, "dropping malformed invocation");
                }
                Err(e) => return Err(e),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    async fn run(input: &str) -> Vec<serde_json::Value> {
        let d = Arc::new(dispatcher(Arc::new(MockApi::new()), Arc::new(MockStore::new())));
        let mut gateway = LineGateway::new(input.as_bytes(), Vec::new());
        serve(&mut gateway, d, std::future::pending()).await.unwrap();
        String::from_utf8(gateway.into_writer())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_serves_until_eof() {
        let input = concat!(
            r#"{"name":"help","caller":{"identity":"u1"}}"#,
            "\n\n",
            r#"{"name":"frobnicate","caller":{"identity":"u1"}}"#,
            "\n"
        );
        let out = run(input).await;
        assert_eq!(out.len(), 2);
        let mut commands: Vec<_> = out.iter().map(|r| r["command"].as_str().unwrap()).collect();
        commands.sort();
        assert_eq!(commands, ["frobnicate", "help"]);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let input = "not json\n{\"name\":\"help\",\"caller\":{\"identity\":\"u1\"}}\n";
        let out = run(input).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["result"]["status"], "success");
    }

    #[tokio::test]
    async fn test_shutdown_stops_reading() {
        let d = Arc::new(dispatcher(Arc::new(MockApi::new()), Arc::new(MockStore::new())));
        let input = r#"{"name":"help","caller":{"identity":"u1"}}"#;
        let mut gateway = LineGateway::new(input.as_bytes(), Vec::new());
        serve(&mut gateway, d, std::future::ready(())).await.unwrap();
        assert!(gateway.into_writer().is_empty());
    }
}
