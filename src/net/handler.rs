//! Per-connection task: join handshake, read loop, writer task

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::app::ServerContext;
use crate::game::tank::PlayerId;
use crate::game::PlayerCommand;
use crate::util::rate_limit::ConnectionRateLimiter;

use super::connection::ConnectionHandle;
use super::lines::LineReader;
use super::protocol::{ClientMessage, ProtocolError, ServerMessage};

/// `ERROR_MSG` reason when the first line is not a join
pub const REASON_EXPECTED_CONNECT: &str = "expected_connect";
/// `ERROR_MSG` reason when no join line arrives in time
pub const REASON_JOIN_TIMEOUT: &str = "join_timeout";

/// Serve one client socket until it closes or the server stops.
pub async fn handle_connection<S>(stream: S, peer: String, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (handle, outbound) =
        ConnectionHandle::new(ctx.next_connection_id(), peer, ctx.config.send_buffer);
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = LineReader::new(BufReader::new(reader));

    debug!(conn_id = handle.id, peer = %handle.peer, "Connection accepted");

    let name = match await_join(&mut lines, &ctx).await {
        Ok(name) => name,
        Err(Rejection::Silent(reason)) => {
            ctx.disconnect(&handle, reason);
            return;
        }
        Err(Rejection::Notify(reason)) => {
            reject(&mut writer, &reason, &ctx).await;
            ctx.disconnect(&handle, &reason);
            return;
        }
    };

    let player_id = match ctx.join_player(&handle, &name) {
        Ok(player_id) => player_id,
        Err(e) => {
            warn!(conn_id = handle.id, peer = %handle.peer, error = %e, "Join refused");
            reject(&mut writer, &e.to_string(), &ctx).await;
            ctx.disconnect(&handle, "join refused");
            return;
        }
    };

    let writer_task = tokio::spawn(write_loop(writer, outbound, handle.clone(), ctx.clone()));
    let reason = read_loop(&mut lines, &handle, player_id, &ctx).await;

    ctx.disconnect(&handle, reason);
    if let Err(e) = writer_task.await {
        warn!(conn_id = handle.id, error = %e, "Writer task failed");
    }
    info!(conn_id = handle.id, player_id, reason, "Connection closed");
}

enum Rejection {
    /// Close without telling the client
    Silent(&'static str),
    /// Send `ERROR_MSG;<reason>` first
    Notify(String),
}

/// Wait for the first line and require it to be a join.
async fn await_join<R>(lines: &mut LineReader<R>, ctx: &ServerContext) -> Result<String, Rejection>
where
    R: AsyncBufRead + Unpin,
{
    let mut stopping = ctx.subscribe_stop();
    let first = tokio::select! {
        _ = stopping.wait_for(|s| *s) => return Err(Rejection::Silent("server stopping")),
        first = timeout(ctx.config.join_timeout, lines.next_line()) => first,
    };
    let first = match first {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Err(Rejection::Silent("eof before join")),
        Ok(Err(e)) => {
            debug!(error = %e, "Read failed before join");
            return Err(Rejection::Silent("read error before join"));
        }
        Err(_) => return Err(Rejection::Notify(REASON_JOIN_TIMEOUT.to_string())),
    };

    match ClientMessage::decode(&first) {
        Ok(ClientMessage::Connect { name }) => Ok(name),
        Ok(other) => {
            debug!(?other, "First line was not a join");
            Err(Rejection::Notify(REASON_EXPECTED_CONNECT.to_string()))
        }
        Err(e) => {
            debug!(error = %e, "Undecodable first line");
            Err(Rejection::Notify(REASON_EXPECTED_CONNECT.to_string()))
        }
    }
}

/// Decode lines and apply them until the connection ends. Returns why it ended.
async fn read_loop<R>(
    lines: &mut LineReader<R>,
    handle: &ConnectionHandle,
    player_id: PlayerId,
    ctx: &ServerContext,
) -> &'static str
where
    R: AsyncBufRead + Unpin,
{
    let limiter = ConnectionRateLimiter::new();
    let mut closed = handle.closed_signal();
    let mut stopping = ctx.subscribe_stop();

    loop {
        let line = tokio::select! {
            _ = closed.wait_for(|c| *c) => return "closed",
            _ = stopping.wait_for(|s| *s) => return "server stopping",
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return "eof",
            Err(e) => {
                debug!(conn_id = handle.id, player_id, error = %e, "Read failed");
                return "read error";
            }
        };

        if !limiter.check_line() {
            warn!(conn_id = handle.id, player_id, "Rate limited inbound line");
            continue;
        }

        match ClientMessage::decode(&line) {
            Ok(ClientMessage::Input(flags)) => ctx.set_input(player_id, flags),
            Ok(ClientMessage::Shoot) => ctx.enqueue(PlayerCommand::Shoot { player_id }),
            Ok(ClientMessage::Connect { .. }) => {
                debug!(conn_id = handle.id, player_id, "Ignoring repeated CONNECT");
            }
            Err(ProtocolError::Empty) => {}
            Err(e) => {
                warn!(conn_id = handle.id, player_id, error = %e, "Discarding malformed line");
            }
        }
    }
}

/// Drain queued frames to the socket, one write and flush per line.
async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    handle: Arc<ConnectionHandle>,
    ctx: Arc<ServerContext>,
) where
    W: AsyncWrite + Unpin,
{
    let mut closed = handle.closed_signal();
    let send_timeout = ctx.config.send_timeout;

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => break,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        match timeout(send_timeout, write_frame(&mut writer, &frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(conn_id = handle.id, error = %e, "Write failed");
                ctx.disconnect(&handle, "write error");
                break;
            }
            Err(_) => {
                warn!(conn_id = handle.id, peer = %handle.peer, "Send timed out");
                ctx.disconnect(&handle, "send timeout");
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Tell a client why it is being dropped, then close the write side.
async fn reject<W>(writer: &mut W, reason: &str, ctx: &ServerContext)
where
    W: AsyncWrite + Unpin,
{
    let line = ServerMessage::Error {
        reason: reason.to_string(),
    }
    .encode();
    match timeout(ctx.config.send_timeout, write_frame(writer, line.as_bytes())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to send rejection"),
        Err(_) => debug!("Timed out sending rejection"),
    }
    let _ = writer.shutdown().await;
}
