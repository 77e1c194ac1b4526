use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::config::{Location, ServerBlock};
use crate::handler::{responses, static_files};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::status::HttpStatus;

/// POST: multipart parts are saved as files under the resolved directory;
/// any other body is written verbatim to the resolved path.
pub fn store(req: &HttpRequest, server: &ServerBlock, location: &Location) -> HttpResponse {
    let target = match static_files::resolve_target(&req.path, server, location) {
        Ok(p) => p,
        Err(status) => return responses::error_page(status),
    };

    match &req.boundary {
        Some(boundary) => store_multipart(&req.body, boundary, &target),
        None => store_raw(&target, &req.body),
    }
}

fn store_raw(path: &Path, body: &[u8]) -> HttpResponse {
    if path.is_dir() {
        return responses::error_page(HttpStatus::Forbidden);
    }

    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return responses::error_page(HttpStatus::InternalServerError);
        }
    }

    match fs::write(path, body) {
        Ok(()) => {
            debug!("stored {} ({} bytes)", path.display(), body.len());
            responses::created()
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            responses::error_page(HttpStatus::Forbidden)
        }
        Err(e) => {
            warn!("cannot store {}: {e}", path.display());
            responses::error_page(HttpStatus::InternalServerError)
        }
    }
}

fn store_multipart(body: &[u8], boundary: &str, dir: &Path) -> HttpResponse {
    if fs::create_dir_all(dir).is_err() {
        return responses::error_page(HttpStatus::InternalServerError);
    }

    let mut stored = 0;
    for part in split_parts(body, boundary) {
        let Some(raw_name) = part.filename else {
            continue;
        };
        // Keep only the final path component of the client-supplied name.
        let Some(file_name) = Path::new(&raw_name).file_name() else {
            continue;
        };

        let full_path = dir.join(file_name);
        match fs::write(&full_path, &part.data) {
            Ok(()) => {
                debug!(
                    "stored {} ({} bytes)",
                    full_path.display(),
                    part.data.len()
                );
                stored += 1;
            }
            Err(e) => {
                warn!("cannot store {}: {e}", full_path.display());
                return responses::error_page(HttpStatus::InternalServerError);
            }
        }
    }

    if stored == 0 {
        return responses::error_page(HttpStatus::BadRequest);
    }
    responses::created()
}

struct Part {
    filename: Option<String>,
    data: Vec<u8>,
}

/// Split a multipart body on its `--boundary` markers. Each segment is a
/// header block and content separated by a blank line.
fn split_parts(body: &[u8], boundary: &str) -> Vec<Part> {
    let marker = format!("--{boundary}");
    let marker = marker.as_bytes();

    let mut parts = Vec::new();
    let Some(first) = find_bytes(body, marker) else {
        return parts;
    };
    let mut pos = first + marker.len();

    loop {
        if body[pos..].starts_with(b"--") {
            break;
        }
        let rest = &body[pos..];
        let Some(end) = find_bytes(rest, marker) else {
            break;
        };
        if let Some(part) = parse_part(&rest[..end]) {
            parts.push(part);
        }
        pos += end + marker.len();
    }

    parts
}

fn parse_part(segment: &[u8]) -> Option<Part> {
    let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);

    let header_end = find_bytes(segment, b"\r\n\r\n")?;
    let (head, data) = (&segment[..header_end], &segment[header_end + 4..]);
    let data = data.strip_suffix(b"\r\n").unwrap_or(data);

    let head = std::str::from_utf8(head).ok()?;
    let mut filename = None;
    for line in head.split("\r\n") {
        if line
            .to_ascii_lowercase()
            .starts_with("content-disposition")
        {
            filename = extract_quoted(line, "filename=");
        }
    }

    Some(Part {
        filename,
        data: data.to_vec(),
    })
}

fn extract_quoted(line: &str, key: &str) -> Option<String> {
    let idx = line.find(key)?;
    let rest = &line[idx + key.len()..];
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
