//! Per-connection handling: line framing and the channel-backed transport.

use crate::config::ServerConfig;
use parking_lot::Mutex;
use socksync_engine::{ConnectionHooks, EngineError, EngineResult, ErrorCode, Socket, Transport};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A transport that queues frames for a connection's writer task.
///
/// Sending never blocks, so it is safe from synchronous engine code running
/// inside the reader task. A peer that stops reading fills the queue; the
/// transport then closes and the connection is dropped.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl ChannelTransport {
    /// Creates a transport feeding `outbound`.
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
        }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, text: &str) -> EngineResult<()> {
        let mut outbound = self.outbound.lock();
        let sender = outbound
            .as_ref()
            .ok_or_else(|| EngineError::Transport("connection closed".into()))?;
        match sender.try_send(text.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                outbound.take();
                warn!("outbound queue full, closing connection");
                Err(EngineError::Transport("outbound queue full".into()))
            }
            Err(TrySendError::Closed(_)) => Err(EngineError::Transport("writer stopped".into())),
        }
    }

    fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    fn close(&self) -> EngineResult<()> {
        // Dropping the sender lets the writer flush and exit.
        self.outbound.lock().take();
        Ok(())
    }
}

/// One newline-delimited frame read from a peer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete line without its terminator.
    Line(Vec<u8>),
    /// A line longer than the limit. Its bytes were discarded unbuffered.
    Oversized,
    /// The peer closed its side.
    Eof,
}

/// Reads the next line, never buffering more than `max + 1` bytes of it.
pub(crate) async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<Frame> {
    buf.clear();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(Frame::Line(std::mem::take(buf)));
    }
    if buf.len() <= max {
        // Last line of the stream, unterminated.
        return Ok(Frame::Line(std::mem::take(buf)));
    }
    skip_line(reader).await?;
    Ok(Frame::Oversized)
}

/// Discards input up to and including the next newline.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        let (consumed, done) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

/// State shared by every connection of one server.
pub(crate) struct HandlerContext {
    pub(crate) config: ServerConfig,
    pub(crate) hooks: Arc<ConnectionHooks>,
    pub(crate) connections: AtomicUsize,
}

impl HandlerContext {
    pub(crate) fn new(config: ServerConfig) -> Self {
        Self {
            config,
            hooks: Arc::new(ConnectionHooks::new()),
            connections: AtomicUsize::new(0),
        }
    }
}

/// Serves one connection until EOF, a read error, or shutdown.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<HandlerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (outbound, mut queue) = mpsc::channel::<String>(context.config.max_queued_messages.max(1));
    let transport = Arc::new(ChannelTransport::new(outbound));
    let socket = Socket::with_config(transport.clone(), context.config.engine.clone());
    info!(%peer, socket = %socket.id(), "connection opened");

    let mut writer = tokio::spawn(async move {
        while let Some(mut line) = queue.recv().await {
            line.push('\n');
            if let Err(err) = write_half.write_all(line.as_bytes()).await {
                warn!(%peer, "socket write failed: {err}");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });
    let mut writer_done = false;

    socket.connect(&context.hooks);

    let max = context.config.max_message_size;
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(%peer, "shutdown requested");
                    break;
                }
            }
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                debug!(%peer, "writer stopped");
                break;
            }
            next = read_frame(&mut reader, &mut buf, max) => match next {
                Ok(Frame::Line(line)) => match String::from_utf8(line) {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => socket.receive(&line),
                    Err(_) => socket.send_error(ErrorCode::InvalidJson, "message is not valid UTF-8"),
                },
                Ok(Frame::Oversized) => socket.send_error(
                    ErrorCode::InvalidJson,
                    format!("message exceeds limit of {max} bytes"),
                ),
                Ok(Frame::Eof) => break,
                Err(err) => {
                    warn!(%peer, "socket read failed: {err}");
                    break;
                }
            }
        }
    }

    socket.disconnect(None);
    let _ = transport.close();
    if !writer_done {
        let _ = writer.await;
    }
    context.connections.fetch_sub(1, Ordering::SeqCst);
    info!(%peer, socket = %socket.id(), "connection closed");
}
