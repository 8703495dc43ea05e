//! Identifier exchange performed right after a TCP connection opens.
//!
//! The accepting side reads the dialler's identifier and then sends its own;
//! the dialling side does the reverse. Each identifier travels as a single
//! frame. Bytes that arrive behind the identifier frame belong to the
//! channel and are handed back in the returned decoder.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{NetError, Result};
use crate::frame::{FrameDecoder, Framing};
use crate::identity::NodeId;
use crate::peer::Direction;

/// Longest identifier accepted from a peer, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 4096;

/// Exchange identifiers over `stream`.
///
/// Returns the remote identifier and a decoder already holding any
/// application bytes received after it.
pub(crate) async fn exchange_identifiers<S>(
    stream: &mut S,
    direction: Direction,
    local: &NodeId,
    framing: Framing,
    limit: Duration,
) -> Result<(NodeId, FrameDecoder)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        match direction {
            Direction::Outbound => {
                send_identifier(stream, local, framing).await?;
                receive_identifier(stream, framing).await
            }
            Direction::Inbound => {
                let received = receive_identifier(stream, framing).await?;
                send_identifier(stream, local, framing).await?;
                Ok(received)
            }
        }
    };

    timeout(limit, exchange)
        .await
        .map_err(|_| NetError::Handshake("timed out waiting for peer identifier".into()))?
}

async fn send_identifier<S>(stream: &mut S, local: &NodeId, framing: Framing) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let frame = framing.encode_payload(local.as_str().as_bytes())?;
    stream
        .write_all(&frame)
        .await
        .map_err(|e| NetError::Handshake(format!("sending identifier: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| NetError::Handshake(format!("sending identifier: {}", e)))
}

async fn receive_identifier<S>(stream: &mut S, framing: Framing) -> Result<(NodeId, FrameDecoder)>
where
    S: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::with_max_len(framing, MAX_IDENTIFIER_LEN);
    let mut chunk = [0u8; 1024];

    loop {
        match decoder.next_frame() {
            Ok(Some(frame)) => {
                let id = std::str::from_utf8(&frame)
                    .map_err(|_| NetError::Handshake("identifier is not UTF-8".into()))?;
                if id.is_empty() {
                    return Err(NetError::Handshake("empty identifier".into()));
                }
                let id = NodeId::new(id);

                let mut channel = FrameDecoder::new(framing);
                channel.extend(&decoder.into_remaining());
                return Ok((id, channel));
            }
            Ok(None) => {}
            Err(NetError::FrameTooLarge { .. }) => {
                return Err(NetError::Handshake(format!(
                    "identifier longer than {} bytes",
                    MAX_IDENTIFIER_LEN
                )));
            }
            Err(e) => return Err(e),
        }

        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| NetError::Handshake(format!("reading identifier: {}", e)))?;
        if n == 0 {
            return Err(NetError::Handshake(
                "peer closed before sending its identifier".into(),
            ));
        }
        decoder.extend(&chunk[..n]);
    }
}
