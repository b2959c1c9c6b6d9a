//! Connection handler.
//!
//! Each accepted client is served by its own thread. The thread owns the
//! socket, waits for readiness with a short timeout so it can notice a
//! shutdown request, frames incoming bytes into lines and writes back echo,
//! command output and prompts. The socket is closed when the handler is
//! dropped, whichever way the loop ends.

use crate::config::ServerOptions;
use crate::protocols::line::{
    CommandContext, CommandTable, Frame, LineFramer, LINE_SEPARATOR, PROMPT,
};
use crate::runtime::{ShutdownFlag, ShutdownReason};
use bytes::{Buf, BufMut, BytesMut};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Bytes read from the socket per call
const READ_CHUNK: usize = 256;

const CLIENT: Token = Token(0);

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionExit {
    /// The client closed its end.
    PeerClosed,
    /// The shutdown flag was observed.
    Shutdown,
    /// An I/O error ended this connection.
    Failed(io::ErrorKind),
}

/// I/O step that failed.
#[derive(Debug, Clone, Copy)]
enum Op {
    Poll,
    Receive,
    Send,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Poll => "poll",
            Op::Receive => "receive",
            Op::Send => "send",
        })
    }
}

struct IoFailure {
    op: Op,
    error: io::Error,
}

impl IoFailure {
    fn new(op: Op, error: io::Error) -> Self {
        Self { op, error }
    }
}

enum ReadState {
    Open,
    Closed,
}

/// Services a single client socket until it closes, fails, or shutdown.
pub struct ConnectionHandler {
    conn_id: u64,
    stream: TcpStream,
    poll: Poll,
    events: Events,
    framer: LineFramer,
    /// Echo, separators, responses and prompts waiting to be written.
    output: BytesMut,
    commands: Arc<CommandTable>,
    shutdown: ShutdownFlag,
    options: ServerOptions,
}

impl ConnectionHandler {
    pub fn new(
        conn_id: u64,
        mut stream: TcpStream,
        commands: Arc<CommandTable>,
        shutdown: ShutdownFlag,
        options: ServerOptions,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry().register(
            &mut stream,
            CLIENT,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(conn_id, error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(Self {
            conn_id,
            stream,
            poll,
            events: Events::with_capacity(8),
            framer: LineFramer::new(),
            output: BytesMut::with_capacity(READ_CHUNK),
            commands,
            shutdown,
            options,
        })
    }

    /// Serve the client. Consumes the handler so the socket is released on
    /// return.
    pub fn run(mut self) -> ConnectionExit {
        match self.serve() {
            Ok(exit) => exit,
            Err(IoFailure { op, error }) => {
                warn!(
                    conn_id = self.conn_id,
                    op = %op,
                    code = error.raw_os_error(),
                    error = %error,
                    "Connection I/O failed"
                );
                if self.options.halt_on_connection_error {
                    self.shutdown.trigger(ShutdownReason::FatalIo);
                }
                ConnectionExit::Failed(error.kind())
            }
        }
    }

    fn serve(&mut self) -> Result<ConnectionExit, IoFailure> {
        self.output.extend_from_slice(PROMPT);
        self.flush()?;

        // Input that arrived before registration has no readiness edge.
        if let ReadState::Closed = self.drain()? {
            return Ok(self.peer_closed());
        }

        while !self.shutdown.is_set() {
            match self
                .poll
                .poll(&mut self.events, Some(self.options.poll_interval))
            {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoFailure::new(Op::Poll, e)),
            }

            let readable = self
                .events
                .iter()
                .any(|event| event.is_readable() || event.is_read_closed() || event.is_error());
            if !readable {
                continue;
            }

            if let ReadState::Closed = self.drain()? {
                return Ok(self.peer_closed());
            }
        }

        debug!(
            conn_id = self.conn_id,
            pending = self.framer.pending(),
            "Shutdown observed"
        );
        Ok(ConnectionExit::Shutdown)
    }

    fn peer_closed(&self) -> ConnectionExit {
        info!(conn_id = self.conn_id, "Connection closed by client");
        ConnectionExit::PeerClosed
    }

    /// Read until the socket would block, processing each chunk as it comes.
    fn drain(&mut self) -> Result<ReadState, IoFailure> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return Ok(ReadState::Closed),
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadState::Open)
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoFailure::new(Op::Receive, e)),
            };

            trace!(conn_id = self.conn_id, bytes = n, "Received data");
            self.process(&buf[..n]);
            self.flush()?;
        }
    }

    fn process(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            match self.framer.push(byte) {
                Frame::Dropped => {}
                Frame::Echo(b) => self.output.put_u8(b),
                Frame::Line(line) => self.complete_line(&line),
            }
        }
    }

    fn complete_line(&mut self, line: &str) {
        let mut ctx = CommandContext::new(self.conn_id, &self.shutdown);
        if !line.is_empty() {
            let executed = self.commands.dispatch(line, &mut ctx);
            debug!(conn_id = self.conn_id, line, executed, "Dispatched line");
        }

        self.output.extend_from_slice(LINE_SEPARATOR);
        self.output.extend_from_slice(ctx.response.as_bytes());
        self.output.extend_from_slice(PROMPT);
    }

    /// Write all queued output, waiting for writability when the socket
    /// buffer is full. Gives up quietly once shutdown is requested.
    fn flush(&mut self) -> Result<(), IoFailure> {
        while !self.output.is_empty() {
            match self.stream.write(&self.output) {
                Ok(0) => {
                    return Err(IoFailure::new(
                        Op::Send,
                        io::Error::new(io::ErrorKind::WriteZero, "write returned 0"),
                    ))
                }
                Ok(n) => self.output.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.shutdown.is_set() {
                        self.output.clear();
                        break;
                    }
                    match self
                        .poll
                        .poll(&mut self.events, Some(self.options.poll_interval))
                    {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(IoFailure::new(Op::Poll, e)),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(IoFailure::new(Op::Send, e)),
            }
        }
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        let _ = self.poll.registry().deregister(&mut self.stream);
        debug!(conn_id = self.conn_id, "Connection closed");
    }
}
