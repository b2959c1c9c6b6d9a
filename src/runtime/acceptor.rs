//! Acceptor loop.
//!
//! Polls the listening socket with a short timeout. Ready means accept and
//! hand every new socket to its own handler thread; a timeout is used to reap
//! handler threads that have already finished. Once shutdown is requested the
//! loop stops accepting, joins every outstanding handler, and only then
//! releases the listener.

use crate::config::ServerOptions;
use crate::protocols::line::CommandTable;
use crate::runtime::connection::{ConnectionExit, ConnectionHandler};
use crate::runtime::handoff::{handoff, HandoffOutcome};
use crate::runtime::registry::{HandlerTask, TaskRegistry};
use crate::runtime::ShutdownFlag;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(0);

/// Totals reported when the acceptor returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Handler threads started.
    pub spawned: usize,
    /// Handler threads joined.
    pub joined: usize,
    /// Handler threads joined by idle-poll reaping while still accepting.
    pub reaped: usize,
}

/// Listening endpoint plus the acceptor's own bookkeeping.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    poll: Poll,
    events: Events,
    commands: Arc<CommandTable>,
    shutdown: ShutdownFlag,
    options: ServerOptions,
    registry: TaskRegistry<ConnectionExit>,
    next_conn_id: u64,
    /// An accept failed before the backlog was drained; try again next
    /// iteration even without a fresh readiness event.
    accept_pending: bool,
}

impl Server {
    /// Bind the listening socket and register it for readiness.
    pub fn bind(addr: SocketAddr, options: ServerOptions) -> io::Result<Self> {
        let listener = create_listener(addr, options.backlog)?;
        let mut listener = TcpListener::from_std(listener);
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            listener,
            local_addr,
            poll,
            events: Events::with_capacity(16),
            commands: Arc::new(CommandTable::builtin()),
            shutdown: ShutdownFlag::new(),
            options,
            registry: TaskRegistry::new(),
            next_conn_id: 0,
            accept_pending: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the flag every loop of this server observes.
    #[cfg(test)]
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Run until shutdown, then join every handler and close the listener.
    pub fn run(mut self) -> RunSummary {
        while !self.shutdown.is_set() {
            match self
                .poll
                .poll(&mut self.events, Some(self.options.poll_interval))
            {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(code = e.raw_os_error(), error = %e, "Failed to poll listener");
                    continue;
                }
            }

            if self.events.is_empty() {
                let reaped = self.registry.reap();
                if reaped > 0 {
                    trace!(reaped, outstanding = self.registry.len(), "Reaped handlers");
                }
                if !self.accept_pending {
                    continue;
                }
            }

            self.accept_ready();
        }

        let reaped = self.registry.joined();

        if !self.registry.is_empty() {
            info!(
                outstanding = self.registry.len(),
                "Shutting down, waiting for connections to finish"
            );
            self.registry.join_all();
        }

        let summary = RunSummary {
            spawned: self.next_conn_id as usize,
            joined: self.registry.joined(),
            reaped,
        };
        info!(
            spawned = summary.spawned,
            joined = summary.joined,
            reaped = summary.reaped,
            "Server stopped"
        );
        summary
    }

    /// Accept until the backlog is empty.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_handler(stream, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.accept_pending = false;
                    return;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(code = e.raw_os_error(), error = %e, "Failed to accept connection");
                    self.accept_pending = true;
                    return;
                }
            }
        }
    }

    /// Start a handler thread for `stream` and wait until it owns the socket.
    fn spawn_handler(&mut self, stream: TcpStream, peer: SocketAddr) {
        let conn_id = self.next_conn_id;
        let (handoff, wait) = handoff(stream);
        let commands = Arc::clone(&self.commands);
        let shutdown = self.shutdown.clone();
        let options = self.options;

        let spawned = thread::Builder::new()
            .name(format!("conn-{conn_id}"))
            .spawn(move || {
                let stream = handoff.take();
                match ConnectionHandler::new(conn_id, stream, commands, shutdown, options) {
                    Ok(handler) => handler.run(),
                    Err(e) => {
                        warn!(
                            conn_id,
                            code = e.raw_os_error(),
                            error = %e,
                            "Failed to set up connection"
                        );
                        ConnectionExit::Failed(e.kind())
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The closure, and the socket inside it, is dropped here.
                error!(
                    conn_id,
                    peer = %peer,
                    code = e.raw_os_error(),
                    error = %e,
                    "Failed to spawn connection handler"
                );
                return;
            }
        };

        self.next_conn_id += 1;
        self.registry.push(HandlerTask::new(conn_id, peer, handle));
        debug!(conn_id, peer = %peer, "Accepted connection");

        match wait.wait(self.options.handoff_wait, &self.shutdown) {
            (HandoffOutcome::Acknowledged, timeouts) => {
                trace!(conn_id, timeouts, "Socket handed off");
            }
            (HandoffOutcome::Abandoned, _) => {
                warn!(conn_id, "Handler exited before taking its socket");
            }
        }
    }
}

/// Create a non-blocking listening socket.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
