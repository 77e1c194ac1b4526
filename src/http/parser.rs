//! Resumable HTTP/1.1 request parser.
//!
//! The parser owns the unconsumed byte buffer for one connection and is fed
//! whatever the socket produced, however small. Each consumed line or body
//! slice is dropped from the front of the buffer, so bytes are parsed exactly
//! once and a token split across two reads survives the gap. Feeding the
//! whole request in one chunk or one byte at a time yields the same result.

use crate::http::request::HttpRequest;
use crate::http::status::HttpStatus;
use crate::http::{HttpMethod, http_method_from_str};

/// Ceiling on the request line plus header section, consumed bytes included.
const MAX_HEAD_BYTES: usize = 8192;

#[derive(PartialEq, Debug)]
pub enum ParserOutcome {
    Ok,
    Incomplete,
    Done,

    // Protocol failures are kept apart from HTTP status codes here and
    // mapped when the error response is built.
    Error,
    PayloadTooLarge,
}

impl ParserOutcome {
    pub fn into_http_status(self) -> HttpStatus {
        match self {
            ParserOutcome::Error => HttpStatus::BadRequest,
            ParserOutcome::PayloadTooLarge => HttpStatus::PayloadTooLarge,
            _ => HttpStatus::Ok,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    Complete,
    Failed,
}

pub struct RequestParser {
    buf: Vec<u8>,
    state: ParseState,
    /// Bytes consumed so far by the request line and headers, counted
    /// against [`MAX_HEAD_BYTES`].
    head_bytes: usize,
    body_limit: usize,
}

impl RequestParser {
    pub fn new(body_limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            state: ParseState::RequestLine,
            head_bytes: 0,
            body_limit,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Rearm for the next request on the same connection. Bytes already
    /// received beyond the previous request stay buffered (pipelining).
    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.head_bytes = 0;
    }

    /// Append newly received bytes and advance as far as they allow.
    pub fn feed(&mut self, chunk: &[u8], req: &mut HttpRequest) -> ParserOutcome {
        self.buf.extend_from_slice(chunk);

        loop {
            let outcome = match self.state {
                ParseState::RequestLine => self.parse_request_line(req),
                ParseState::Headers => self.parse_header_line(req),
                ParseState::Body => self.parse_body(req),
                ParseState::Complete => ParserOutcome::Done,
                ParseState::Failed => ParserOutcome::Error,
            };

            match outcome {
                ParserOutcome::Ok => continue,
                ParserOutcome::Error | ParserOutcome::PayloadTooLarge => {
                    self.state = ParseState::Failed;
                    return outcome;
                }
                other => return other,
            }
        }
    }

    fn parse_request_line(&mut self, req: &mut HttpRequest) -> ParserOutcome {
        let Some(line) = self.take_line() else {
            return self.head_pressure();
        };

        let Ok(text) = std::str::from_utf8(&line) else {
            return ParserOutcome::Error;
        };

        // METHOD SP TARGET SP VERSION
        let parts: Vec<&str> = text.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() != 3 {
            return ParserOutcome::Error;
        }

        let method = http_method_from_str(parts[0]);
        if method == HttpMethod::Unknown {
            return ParserOutcome::Error;
        }

        let version = parts[2]
            .strip_prefix("HTTP/")
            .and_then(|v| v.split_once('.'))
            .and_then(|(maj, min)| Some((maj.parse::<u8>().ok()?, min.parse::<u8>().ok()?)));
        let version = match version {
            Some(v) if v == (1, 0) || v == (1, 1) => v,
            _ => return ParserOutcome::Error,
        };

        req.method = method;
        req.target = parts[1].to_string();
        match parts[1].split_once('?') {
            Some((path, query)) => {
                req.path = path.to_string();
                req.query = query.to_string();
            }
            None => {
                req.path = parts[1].to_string();
                req.query = String::new();
            }
        }
        req.http_version = version;

        self.state = ParseState::Headers;
        ParserOutcome::Ok
    }

    fn parse_header_line(&mut self, req: &mut HttpRequest) -> ParserOutcome {
        let Some(line) = self.take_line() else {
            return self.head_pressure();
        };

        // A bare CRLF terminates the header section.
        if line.is_empty() {
            return self.end_of_headers(req);
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            return ParserOutcome::Error;
        };

        let Some((name, value)) = text.split_once(':') else {
            return ParserOutcome::Error;
        };
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return ParserOutcome::Error;
        }

        if name.eq_ignore_ascii_case("content-length") {
            match value.parse::<usize>() {
                Ok(n) => req.content_length = Some(n),
                Err(_) => return ParserOutcome::Error,
            }
        } else if name.eq_ignore_ascii_case("content-type") {
            if let Some(boundary) = extract_boundary(value) {
                req.boundary = Some(boundary);
            }
        }

        req.headers.append(name, value);
        ParserOutcome::Ok
    }

    fn end_of_headers(&mut self, req: &mut HttpRequest) -> ParserOutcome {
        match req.content_length {
            // The declared length alone is enough to refuse the request;
            // the body is never accumulated.
            Some(n) if n > self.body_limit => ParserOutcome::PayloadTooLarge,
            Some(n) if n > 0 && req.method.allows_body() => {
                self.state = ParseState::Body;
                ParserOutcome::Ok
            }
            _ => {
                self.state = ParseState::Complete;
                ParserOutcome::Done
            }
        }
    }

    fn parse_body(&mut self, req: &mut HttpRequest) -> ParserOutcome {
        let declared = req.content_length.unwrap_or(0);
        let missing = declared - req.body.len();
        let take = missing.min(self.buf.len());

        req.body.extend_from_slice(&self.buf[..take]);
        self.drop_front(take);

        if req.body.len() == declared {
            self.state = ParseState::Complete;
            ParserOutcome::Done
        } else {
            ParserOutcome::Incomplete
        }
    }

    /// Remove and return the next CRLF-terminated line, without the CRLF.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buf.windows(2).position(|w| w == b"\r\n")?;
        let line = self.buf[..end].to_vec();
        self.drop_front(end + 2);
        self.head_bytes += end + 2;
        Some(line)
    }

    /// No complete line in the buffer: wait for more bytes unless the head
    /// section has already outgrown its ceiling.
    fn head_pressure(&self) -> ParserOutcome {
        if self.head_bytes + self.buf.len() > MAX_HEAD_BYTES {
            ParserOutcome::Error
        } else {
            ParserOutcome::Incomplete
        }
    }

    fn drop_front(&mut self, n: usize) {
        let rest = self.buf.len() - n;
        self.buf.copy_within(n.., 0);
        self.buf.truncate(rest);
    }
}

fn extract_boundary(content_type: &str) -> Option<String> {
    let idx = content_type.find("boundary=")?;
    let raw = content_type[idx + "boundary=".len()..]
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('"');
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_extraction() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=----abc123"),
            Some("----abc123".to_string())
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"quoted\""),
            Some("quoted".to_string())
        );
        assert_eq!(extract_boundary("text/html"), None);
    }
}
