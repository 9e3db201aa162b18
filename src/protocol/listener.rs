// Protocol Listener
//
// Accepts TCP clients and drives one ConnectionHandler per client from the
// newline-delimited JSON frames it receives.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerMessage, WireColumn};
use crate::models::QueryResponse;
use crate::services::datafusion::DataFusionResultConverter;
use crate::services::{ConnectionHandler, HandlerContext, QueryError};

/// Longest accepted client frame, newline included
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Everything a connection task needs
#[derive(Clone)]
pub struct ProtocolContext {
    pub handler: HandlerContext,
    /// Failed startups tolerated before the socket is closed
    pub max_auth_attempts: u32,
}

/// Accept clients until the listener fails; one task per client
pub async fn run(listener: TcpListener, ctx: ProtocolContext) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Semantic SQL protocol listening");
    }

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer_addr, ctx).await;
        });
    }
}

/// Run the full lifecycle of one client connection
pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: ProtocolContext) {
    let handler = ConnectionHandler::new(ctx.handler.clone());

    if !handler.on_connect(peer_addr) {
        return;
    }

    if let Err(e) = run_session(&handler, stream, peer_addr, ctx.max_auth_attempts).await {
        error!(%peer_addr, connection_id = %handler.id(), error = %e, "Connection error");
    }

    handler.on_disconnect(peer_addr);
}

/// One unit read off the socket
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    Malformed(String),
    Eof,
}

/// Splits the byte stream into newline-terminated frames of bounded size
///
/// `next_frame` is cancel safe: bytes of a partial frame stay buffered here,
/// so it can race other futures in `select!`.
struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
    oversized: bool,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            oversized: false,
        }
    }

    async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(Frame::Eof);
            }

            let (consumed, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(newline) => (newline + 1, true),
                None => (available.len(), false),
            };

            if !self.oversized {
                if self.buf.len() + consumed > MAX_FRAME_BYTES {
                    self.oversized = true;
                    self.buf = Vec::new();
                } else {
                    self.buf.extend_from_slice(&available[..consumed]);
                }
            }
            self.reader.consume(consumed);

            if complete {
                return Ok(self.take_frame());
            }
        }
    }

    fn take_frame(&mut self) -> Frame {
        if std::mem::take(&mut self.oversized) {
            return Frame::Malformed(format!("Message exceeds {} bytes", MAX_FRAME_BYTES));
        }

        let bytes = std::mem::take(&mut self.buf);
        match String::from_utf8(bytes) {
            Ok(line) => Frame::Line(line),
            Err(e) => Frame::Malformed(format!("Message is not valid UTF-8: {}", e)),
        }
    }
}

async fn run_session(
    handler: &ConnectionHandler,
    stream: TcpStream,
    peer_addr: SocketAddr,
    max_auth_attempts: u32,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut frames = FrameReader::new(BufReader::new(reader));
    let mut pending = None;
    let mut failed_attempts = 0u32;

    loop {
        let frame = match pending.take() {
            Some(frame) => frame,
            None => frames.next_frame().await?,
        };

        let line = match frame {
            Frame::Line(line) => line,
            Frame::Malformed(reason) => {
                warn!(connection_id = %handler.id(), reason = %reason, "Malformed client message");
                send(&mut writer, &ServerMessage::error("PROTOCOL_ERROR", reason)).await?;
                continue;
            }
            Frame::Eof => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<ClientMessage>(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection_id = %handler.id(), error = %e, "Malformed client message");
                send(&mut writer, &ServerMessage::error("PROTOCOL_ERROR", format!("Invalid message: {}", e)))
                    .await?;
                continue;
            }
        };

        match message {
            ClientMessage::Startup {
                user,
                password,
                database,
            } => {
                let host = peer_addr.ip().to_string();
                if handler.on_authenticate(&user, &password, &host, database.as_deref()) {
                    send(&mut writer, &ServerMessage::AuthOk).await?;
                    continue;
                }

                failed_attempts += 1;
                let attempts_left = max_auth_attempts.saturating_sub(failed_attempts);
                send(&mut writer, &ServerMessage::AuthFailed { attempts_left }).await?;

                if attempts_left == 0 {
                    warn!(%peer_addr, connection_id = %handler.id(), "Too many failed authentication attempts");
                    break;
                }
            }
            ClientMessage::Query { sql } => {
                let (outcome, next) = execute_watching(handler, &sql, &mut frames, peer_addr).await;
                if next == Some(Frame::Eof) {
                    // Client is gone; nothing to deliver the outcome to
                    return Ok(());
                }
                pending = next;

                let reply = match outcome {
                    Ok(response) => result_message(handler, &response),
                    Err(e) => ServerMessage::from(&e),
                };
                send(&mut writer, &reply).await?;
            }
            ClientMessage::Terminate => break,
        }
    }

    writer.shutdown().await
}

/// Run a query while still reading the socket
///
/// A hangup during execution is reported to the handler at once, which
/// abandons the query. A frame that arrives early is handed back to be
/// processed after the reply.
async fn execute_watching(
    handler: &ConnectionHandler,
    sql: &str,
    frames: &mut FrameReader<BufReader<OwnedReadHalf>>,
    peer_addr: SocketAddr,
) -> (Result<QueryResponse, QueryError>, Option<Frame>) {
    let query = handler.on_query(sql);
    tokio::pin!(query);

    let next = tokio::select! {
        outcome = &mut query => return (outcome, None),
        next = frames.next_frame() => next,
    };

    let next = match next {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection_id = %handler.id(), error = %e, "Read failed during query");
            Frame::Eof
        }
    };

    if next == Frame::Eof {
        handler.on_disconnect(peer_addr);
    }

    (query.await, Some(next))
}

fn result_message(handler: &ConnectionHandler, response: &QueryResponse) -> ServerMessage {
    match DataFusionResultConverter::batch_rows(&response.batch) {
        Ok(rows) => ServerMessage::Result {
            columns: response.columns.iter().map(WireColumn::from).collect(),
            rows,
        },
        Err(e) => {
            warn!(connection_id = %handler.id(), error = %e, "Failed to encode result rows");
            ServerMessage::error("RESULT_ENCODING_ERROR", e.to_string())
        }
    }
}

async fn send(writer: &mut OwnedWriteHalf, message: &ServerMessage) -> io::Result<()> {
    let mut payload = serde_json::to_vec(message).map_err(io::Error::other)?;
    payload.push(b'\n');
    writer.write_all(&payload).await
}
