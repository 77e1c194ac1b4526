//! The connection-multiplexing reactor.
//!
//! This module implements the single-threaded server runtime. It is the one
//! place that decides which descriptors are waited on and what happens when
//! they become ready:
//! - accepting TCP connections on the listening endpoints,
//! - reading raw bytes and feeding them to the per-connection parser,
//! - writing response bytes back across as many readiness events as needed,
//! - evicting idle connections and tearing state down.
//!
//! Protocol knowledge lives elsewhere: the `http` namespace assembles
//! requests and frames responses, the `handler` namespace decides what a
//! response contains. This module only moves bytes and bookkeeping.
//!
//! The process blocks only inside the readiness wait; every socket is
//! non-blocking and every read or write must tolerate transferring nothing.
//! The epoll set and the connection table are owned exclusively by
//! [`Server`] and kept in 1:1 correspondence: a descriptor is registered
//! exactly while its [`Connection`] record exists.
//!
//! ## Connection lifecycle
//!
//! 1. Accept on a listening endpoint, register with read interest
//! 2. Read-readiness: one bounded read, fed to the resumable parser
//! 3. Request complete (or failed): flip the registration to write interest
//! 4. Write-readiness: build the response once, then drain it incrementally
//! 5. Fully drained: reset for the next request (keep-alive) or tear down

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::handler;
use crate::http::parser::ParserOutcome;
use crate::net::connection::Connection;
use crate::net::poller::{Interest, Poller};
use crate::net::shutdown::ShutdownToken;

const EVENT_CAPACITY: usize = 1024;
const READ_CHUNK: usize = 4096;
/// Upper bound on one readiness wait, so idle sweeps run even when no
/// traffic arrives.
const SWEEP_TICK_MS: i32 = 1000;

struct Listener {
    socket: TcpListener,
    server_idx: usize,
}

pub struct Server {
    poller: Poller,
    listeners: HashMap<RawFd, Listener>,
    connections: HashMap<RawFd, Connection>,
    config: Config,
    shutdown: ShutdownToken,
}

impl Server {
    pub fn new(config: Config, shutdown: ShutdownToken) -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            config,
            shutdown,
        })
    }

    /// Bind one listening endpoint per distinct port and register it with
    /// read interest. Several server blocks may declare the same port; the
    /// first one owns the endpoint. Failure here is startup-fatal.
    pub fn bind(&mut self) -> io::Result<()> {
        let mut bound: Vec<u16> = Vec::new();

        for (idx, block) in self.config.servers.iter().enumerate() {
            if bound.contains(&block.listen) {
                continue;
            }

            let socket = TcpListener::bind(("0.0.0.0", block.listen))?;
            socket.set_nonblocking(true)?;

            let fd = socket.as_raw_fd();
            self.poller.add(fd, Interest::Read)?;

            info!(
                "{} listening on port {}",
                block.server_name,
                socket.local_addr()?.port()
            );

            self.listeners.insert(
                fd,
                Listener {
                    socket,
                    server_idx: idx,
                },
            );
            bound.push(block.listen);
        }

        Ok(())
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .values()
            .filter_map(|l| l.socket.local_addr().ok())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The main loop. Returns once the shutdown token is flipped, after
    /// closing every listening and client descriptor.
    pub fn run(&mut self) {
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; EVENT_CAPACITY];
        info!("event loop started");

        while !self.shutdown.is_requested() {
            let n = match self.poller.wait(&mut events, SWEEP_TICK_MS) {
                Ok(n) => n,
                // A signal landed during the wait; the loop condition decides.
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("poll wait failed: {e}");
                    break;
                }
            };

            for event in &events[..n] {
                let fd = event.u64 as RawFd;
                if self.listeners.contains_key(&fd) {
                    self.accept(fd);
                } else {
                    self.dispatch(fd, event.events);
                }
            }

            self.sweep_idle();
        }

        self.teardown();
    }

    /// Drain the listener's backlog. Accept failures never stop the loop.
    fn accept(&mut self, listener_fd: RawFd) {
        let Some(listener) = self.listeners.get(&listener_fd) else {
            return;
        };
        let server_idx = listener.server_idx;
        let body_limit = self.config.servers[server_idx].client_body_size;

        loop {
            match listener.socket.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("{addr}: cannot set non-blocking: {e}");
                        continue;
                    }
                    let fd = stream.as_raw_fd();
                    if let Err(e) = self.poller.add(fd, Interest::Read) {
                        warn!("{addr}: cannot register fd {fd}: {e}");
                        continue;
                    }
                    self.connections
                        .insert(fd, Connection::new(stream, server_idx, body_limit));
                    debug!("accepted {addr} as fd {fd}");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, fd: RawFd, flags: u32) {
        if flags & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0 {
            debug!("fd {fd}: error/hangup");
            self.destroy(fd);
            return;
        }
        if flags & libc::EPOLLIN as u32 != 0 {
            self.handle_readable(fd);
        }
        if flags & libc::EPOLLOUT as u32 != 0 {
            self.handle_writable(fd);
        }
    }

    /// One bounded read per readiness event. A zero-byte read means the
    /// peer closed; level-triggered epoll re-arms while data remains.
    fn handle_readable(&mut self, fd: RawFd) {
        let Some(conn) = self.connections.get_mut(&fd) else {
            return;
        };

        let mut chunk = [0u8; READ_CHUNK];
        let n = match conn.stream.read(&mut chunk) {
            Ok(0) => {
                debug!("fd {fd}: peer closed");
                self.destroy(fd);
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("fd {fd}: read failed: {e}");
                self.destroy(fd);
                return;
            }
        };

        conn.touch();
        self.advance_parser(fd, &chunk[..n]);
    }

    /// Feed bytes to the connection's parser (an empty slice lets it
    /// progress on already-buffered data) and flip to write interest once
    /// a request is complete or has failed.
    fn advance_parser(&mut self, fd: RawFd, chunk: &[u8]) {
        let Some(conn) = self.connections.get_mut(&fd) else {
            return;
        };

        let ready = match conn.parser.feed(chunk, &mut conn.request) {
            ParserOutcome::Done => true,
            ParserOutcome::Incomplete | ParserOutcome::Ok => false,
            outcome => {
                // Malformed input still gets a framed error response.
                conn.error = Some(outcome.into_http_status());
                true
            }
        };
        if !ready {
            return;
        }

        conn.interest = Interest::Write;
        if self.poller.modify(fd, Interest::Write).is_err() {
            self.destroy(fd);
        }
    }

    /// Build the response on the first writable event after completion,
    /// then drain it; partial sends keep write interest.
    fn handle_writable(&mut self, fd: RawFd) {
        let Some(conn) = self.connections.get_mut(&fd) else {
            return;
        };

        if !conn.response_built {
            let block = &self.config.servers[conn.server_idx];
            let response = match conn.error {
                Some(status) => handler::handle_error(status),
                None => handler::handle_request(&conn.request, block),
            };
            conn.keep_alive = conn.error.is_none()
                && conn.request.keep_alive()
                && !conn.request.has_unread_body();
            conn.write_buffer = response.to_bytes(conn.keep_alive);
            conn.written = 0;
            conn.response_built = true;
        }

        if conn.written == conn.write_buffer.len() {
            conn.interest = Interest::Read;
            if self.poller.modify(fd, Interest::Read).is_err() {
                self.destroy(fd);
            }
            return;
        }

        match conn.stream.write(&conn.write_buffer[conn.written..]) {
            Ok(0) => self.destroy(fd),
            Ok(n) => {
                conn.written += n;
                conn.touch();
                if conn.written == conn.write_buffer.len() {
                    self.finish_response(fd);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("fd {fd}: write failed: {e}");
                self.destroy(fd);
            }
        }
    }

    /// The response has fully drained: rearm for the next request on this
    /// connection or tear it down.
    fn finish_response(&mut self, fd: RawFd) {
        let Some(conn) = self.connections.get_mut(&fd) else {
            return;
        };

        if !conn.keep_alive {
            debug!("fd {fd}: response sent, closing");
            self.destroy(fd);
            return;
        }

        conn.reset();
        if self.poller.modify(fd, Interest::Read).is_err() {
            self.destroy(fd);
            return;
        }

        // A pipelined request may already sit in the parser buffer.
        self.advance_parser(fd, &[]);
    }

    /// Evict connections that made no progress within their server block's
    /// timeout: keepalive on the read side, send on the write side.
    fn sweep_idle(&mut self) {
        let now = Instant::now();
        let expired: Vec<RawFd> = self
            .connections
            .iter()
            .filter(|(_, conn)| {
                let block = &self.config.servers[conn.server_idx];
                let limit = match conn.interest {
                    Interest::Read => block.keepalive_timeout,
                    Interest::Write => block.send_timeout,
                };
                now.duration_since(conn.last_activity) > limit
            })
            .map(|(&fd, _)| fd)
            .collect();

        for fd in expired {
            debug!("fd {fd}: idle timeout");
            self.destroy(fd);
        }
    }

    /// Deregistration, close, and record removal happen as one step.
    /// Calling it again for the same handle is a no-op.
    fn destroy(&mut self, fd: RawFd) {
        let Some(conn) = self.connections.remove(&fd) else {
            return;
        };
        let _ = self.poller.delete(fd);
        drop(conn);
    }

    fn teardown(&mut self) {
        info!(
            "shutting down: closing {} connections",
            self.connections.len()
        );

        let fds: Vec<RawFd> = self.connections.keys().copied().collect();
        for fd in fds {
            self.destroy(fd);
        }

        let listener_fds: Vec<RawFd> = self.listeners.keys().copied().collect();
        for fd in listener_fds {
            let _ = self.poller.delete(fd);
            self.listeners.remove(&fd);
        }
    }
}
