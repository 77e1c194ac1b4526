use std::net::TcpStream;
use std::time::Instant;

use crate::http::parser::RequestParser;
use crate::http::request::HttpRequest;
use crate::http::status::HttpStatus;
use crate::net::poller::Interest;

/// Everything the reactor needs to resume one connection across readiness
/// events: the socket, the parser (which owns the unconsumed read bytes),
/// the request assembled so far, the pending output, and timing.
pub struct Connection {
    pub stream: TcpStream,
    pub parser: RequestParser,
    pub request: HttpRequest,

    pub write_buffer: Vec<u8>,
    pub written: usize,
    /// Guards the once-per-request response construction.
    pub response_built: bool,
    pub keep_alive: bool,

    /// Parse failure mapped to the status the error response will carry.
    pub error: Option<HttpStatus>,

    pub interest: Interest,
    pub last_activity: Instant,
    /// Index of the server block whose endpoint accepted this connection.
    pub server_idx: usize,
}

impl Connection {
    pub fn new(stream: TcpStream, server_idx: usize, body_limit: usize) -> Self {
        Self {
            stream,
            parser: RequestParser::new(body_limit),
            request: HttpRequest::new(),
            write_buffer: Vec::new(),
            written: 0,
            response_built: false,
            keep_alive: false,
            error: None,
            interest: Interest::Read,
            last_activity: Instant::now(),
            server_idx,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Keep-alive: drop all per-request state and await the next request.
    /// Bytes already buffered in the parser carry over.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.request = HttpRequest::new();
        self.write_buffer.clear();
        self.written = 0;
        self.response_built = false;
        self.keep_alive = false;
        self.error = None;
        self.interest = Interest::Read;
        self.touch();
    }
}
