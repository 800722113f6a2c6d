use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error};

use super::types::RelayMessage;

/// JSON-lines framing of [`RelayMessage`]s over a byte stream pair.
///
/// One message per line. Used by the standalone worker on stdin/stdout.
pub struct LineTransport<R, W> {
    reader: FramedRead<BufReader<R>, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
}

pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        LineTransport::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        let reader = FramedRead::new(BufReader::new(reader), LinesCodec::new());
        let writer = FramedWrite::new(writer, LinesCodec::new());

        Self { reader, writer }
    }

    /// Reads the next message.
    ///
    /// Returns `Ok(None)` on EOF. Blank lines are skipped; a line that is not
    /// a JSON object with a `type` field is an error, which the caller may
    /// log and continue past.
    pub async fn read_message(&mut self) -> Result<Option<RelayMessage>> {
        loop {
            match self.reader.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!("Received: {}", line);

                    let message = serde_json::from_str::<RelayMessage>(&line)
                        .with_context(|| format!("invalid relay message: {}", line))?;
                    return Ok(Some(message));
                }
                Some(Err(e)) => {
                    error!("Error reading from input stream: {}", e);
                    return Err(anyhow::anyhow!("Transport error: {}", e));
                }
                None => {
                    debug!("EOF reached");
                    return Ok(None);
                }
            }
        }
    }

    pub async fn write_message(&mut self, message: &RelayMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        debug!("Sending: {}", json);

        self.writer.send(json).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_messages_and_skips_blank_lines() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (sink, _unused) = tokio::io::duplex(1024);
        let mut transport = LineTransport::new(server, sink);

        client
            .write_all(b"\n{\"type\":\"extract\",\"url\":\"a.pdf\"}\n")
            .await
            .unwrap();
        drop(client);

        let first = transport.read_message().await.unwrap();
        assert!(matches!(first, Some(RelayMessage::Extract(ref r)) if r.url == "a.pdf"));
        assert!(transport.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_non_json_lines() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (sink, _unused) = tokio::io::duplex(1024);
        let mut transport = LineTransport::new(server, sink);

        client.write_all(b"not json\n").await.unwrap();
        drop(client);

        assert!(transport.read_message().await.is_err());
    }

    #[tokio::test]
    async fn writes_one_message_per_line() {
        let (source, _unused) = tokio::io::duplex(1024);
        let (sink, mut peer) = tokio::io::duplex(1024);
        let mut transport = LineTransport::new(source, sink);

        transport
            .write_message(&RelayMessage::extracted(None, "page one"))
            .await
            .unwrap();
        drop(transport);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut peer, &mut out)
            .await
            .unwrap();
        assert_eq!(out, "{\"type\":\"extracted\",\"text\":\"page one\"}\n");
    }
}
