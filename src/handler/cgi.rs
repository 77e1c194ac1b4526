//! CGI execution.
//!
//! The child receives request metadata in its environment and the request
//! body on stdin; its entire stdout becomes the response. Invocation is
//! synchronous: the event loop waits for the child to exit. There is no
//! execution limit on the child.

use std::io::Write;
use std::process::{Command, Stdio};

use log::warn;

use crate::config::{Location, ServerBlock};
use crate::handler::{responses, static_files};
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

pub fn execute(req: &HttpRequest, server: &ServerBlock, location: &Location) -> HttpResponse {
    let script = match static_files::resolve_target(&req.path, server, location) {
        Ok(p) => p,
        Err(status) => return responses::error_page(status),
    };
    if !script.is_file() {
        return responses::error_page(HttpStatus::NotFound);
    }

    let mut command = match &location.cgi_interpreter {
        Some(interpreter) => {
            let mut c = Command::new(interpreter);
            c.arg(&script);
            c
        }
        None => Command::new(&script),
    };

    command
        .env("REQUEST_METHOD", req.method.as_str())
        .env("SCRIPT_FILENAME", &script)
        .env("PATH_INFO", &script)
        .env("QUERY_STRING", &req.query)
        .env("CONTENT_TYPE", req.header("Content-Type").unwrap_or(""))
        .env("CONTENT_LENGTH", req.body.len().to_string())
        .env("SERVER_PROTOCOL", "HTTP/1.1")
        .env("GATEWAY_INTERFACE", "CGI/1.1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("cannot spawn {}: {e}", script.display());
            return responses::error_page(HttpStatus::BadGateway);
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        // A child that never reads its stdin closes the pipe early;
        // that is not a failure.
        let _ = stdin.write_all(&req.body);
    }

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(e) => {
            warn!("cgi {} failed: {e}", script.display());
            return responses::error_page(HttpStatus::BadGateway);
        }
    };

    if output.stdout.is_empty() {
        return responses::error_page(HttpStatus::BadGateway);
    }

    wrap_output(&output.stdout)
}

/// Reframe child stdout as an HTTP response. A leading header block may
/// carry `Status:` and `Content-Type:`; everything after the blank line is
/// the body. Without a header block, the whole output is the body.
fn wrap_output(raw: &[u8]) -> HttpResponse {
    let (head, body) = match split_head(raw) {
        Some((head, body)) => (head, body),
        None => ("", raw),
    };

    let mut status = HttpStatus::Ok;
    let mut content_type = "text/html".to_string();

    for line in head.split("\r\n").flat_map(|l| l.split('\n')) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("status") {
            let code = value
                .split_whitespace()
                .next()
                .and_then(|c| c.parse::<u16>().ok());
            // Codes outside the table fall back to a generic failure.
            status = code
                .and_then(HttpStatus::from_code)
                .unwrap_or(HttpStatus::InternalServerError);
        } else if name.eq_ignore_ascii_case("content-type") {
            content_type = value.to_string();
        }
    }

    let mut response = HttpResponse::new(status);
    response.set_header(ResponseHeader::ContentType, &content_type);
    response.body = body.to_vec();
    response
}

fn split_head(raw: &[u8]) -> Option<(&str, &[u8])> {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n");
    let (head_end, sep) = match crlf {
        Some(pos) => (pos, 4),
        None => {
            let pos = raw.windows(2).position(|w| w == b"\n\n")?;
            (pos, 2)
        }
    };

    let head = std::str::from_utf8(&raw[..head_end]).ok()?;
    // Only treat the prefix as CGI headers if every line looks like one.
    if !head
        .lines()
        .all(|l| l.trim().is_empty() || l.contains(':'))
    {
        return None;
    }
    Some((head, &raw[head_end + sep..]))
}
