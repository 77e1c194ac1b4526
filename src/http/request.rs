use crate::http::HttpMethod;
use crate::http::headers::HeaderMap;

/// A structured request, built incrementally by the
/// [`RequestParser`](crate::http::parser::RequestParser) as bytes arrive.
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Request target exactly as received, query string included.
    pub target: String,
    /// Target with the query string split off.
    pub path: String,
    pub query: String,
    pub http_version: (u8, u8),

    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Declared Content-Length, once the header section has been parsed.
    pub content_length: Option<usize>,
    /// Multipart boundary lifted out of Content-Type, when present.
    pub boundary: Option<String>,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            method: HttpMethod::Unknown,
            target: String::new(),
            path: String::new(),
            query: String::new(),
            http_version: (0, 0),
            headers: HeaderMap::new(),
            body: Vec::new(),
            content_length: None,
            boundary: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Whether the connection should survive this request/response cycle.
    /// An explicit Connection header wins; otherwise HTTP/1.1 defaults to
    /// keep-alive and HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.http_version == (1, 1),
        }
    }

    /// A body was declared but the method does not take one, so the bytes
    /// were never consumed. Such a connection cannot be reused safely.
    pub fn has_unread_body(&self) -> bool {
        self.content_length.unwrap_or(0) > 0 && !self.method.allows_body()
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}
