//! Adapts a WebSocket connection into the byte-stream interface `rmcp`
//! expects from its stdio-style transport constructor.
//!
//! `rmcp` has first-class stdio and Streamable-HTTP client transports but no
//! bundled WebSocket one; the MCP `websocket` transport is just newline- or
//! frame-delimited JSON-RPC carried over WS text frames, so we pump frames
//! through a `tokio::io::duplex` pipe and hand rmcp the near end.

use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

const DUPLEX_BUFFER_SIZE: usize = 64 * 1024;

/// Connects to `url`, returning the end of a duplex pipe rmcp should read
/// and write JSON-RPC frames on, plus the join handle of the pump task that
/// forwards bytes to and from the underlying WebSocket.
pub async fn connect(
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<(DuplexStream, JoinHandle<()>), anyhow::Error> {
    let mut request = url.into_client_request()?;
    for (key, value) in headers {
        request
            .headers_mut()
            .insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(value)?);
    }
    // Some servers key the MCP subprotocol off the standard WS handshake key;
    // ensure one is always present even if the caller didn't pre-populate it.
    request
        .headers_mut()
        .entry("sec-websocket-key")
        .or_insert_with(|| HeaderValue::from_str(&generate_key()).expect("valid header value"));

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let (rmcp_side, mut app_side) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);

    let pump = tokio::spawn(async move {
        let mut read_buf = vec![0u8; DUPLEX_BUFFER_SIZE];
        loop {
            tokio::select! {
                read_result = app_side.read(&mut read_buf) => {
                    match read_result {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let payload = read_buf[..n].to_vec();
                            if ws_write.send(Message::Binary(payload.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if app_side.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if app_side.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    }
                }
            }
        }
    });

    Ok((rmcp_side, pump))
}
