use std::time::SystemTime;

use indexmap::IndexMap;

use crate::http::status::HttpStatus;

const SERVER_NAME: &str = concat!("rustyserv/", env!("CARGO_PKG_VERSION"));

/// Response headers that may be set through the typed wrapper API.
pub enum ResponseHeader {
    ContentLength,
    ContentType,
    Connection,
    Server,
    Location,
    Date,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: HttpStatus,
    headers: IndexMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: HttpStatus) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: Vec::new(),
        }
    }

    pub fn set_header(&mut self, h: ResponseHeader, value: &str) {
        let name = match h {
            ResponseHeader::ContentLength => "Content-Length",
            ResponseHeader::ContentType => "Content-Type",
            ResponseHeader::Connection => "Connection",
            ResponseHeader::Server => "Server",
            ResponseHeader::Location => "Location",
            ResponseHeader::Date => "Date",
        };

        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Serialize as status line + header block + body. The framing headers
    /// (Content-Length, Content-Type, Connection, Server, Date) are stamped
    /// here so every response that leaves the server carries them.
    pub fn to_bytes(mut self, keep_alive: bool) -> Vec<u8> {
        if self.header("Content-Type").is_none() {
            self.set_header(ResponseHeader::ContentType, "text/html");
        }
        self.set_header(ResponseHeader::ContentLength, &self.body.len().to_string());
        self.set_header(
            ResponseHeader::Connection,
            if keep_alive { "keep-alive" } else { "close" },
        );
        if self.header("Server").is_none() {
            self.set_header(ResponseHeader::Server, SERVER_NAME);
        }
        self.set_header(
            ResponseHeader::Date,
            &httpdate::fmt_http_date(SystemTime::now()),
        );

        let status_line = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );

        let mut out = Vec::with_capacity(status_line.len() + self.body.len() + 256);
        out.extend_from_slice(status_line.as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}
