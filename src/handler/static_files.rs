use std::fs::{self, File};
use std::io::ErrorKind::*;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::{Location, ServerBlock};
use crate::handler::responses;
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

/// GET: a file, the directory's index file, or an autoindex listing.
pub fn serve(req: &HttpRequest, server: &ServerBlock, location: &Location) -> HttpResponse {
    let full_path = match resolve_target(&req.path, server, location) {
        Ok(p) => p,
        Err(status) => return responses::error_page(status),
    };

    if full_path.is_dir() {
        let with_index = full_path.join(&server.index);
        if with_index.is_file() {
            return serve_file(&with_index);
        }
        if server.autoindex {
            return directory_listing(&full_path, &req.path);
        }
        return responses::error_page(HttpStatus::Forbidden);
    }

    serve_file(&full_path)
}

/// DELETE: remove a regular file under the route's root.
pub fn remove(req: &HttpRequest, server: &ServerBlock, location: &Location) -> HttpResponse {
    let full_path = match resolve_target(&req.path, server, location) {
        Ok(p) => p,
        Err(status) => return responses::error_page(status),
    };

    if !full_path.is_file() {
        return responses::error_page(HttpStatus::NotFound);
    }

    match fs::remove_file(&full_path) {
        Ok(()) => {
            debug!("deleted {}", full_path.display());
            responses::html(
                HttpStatus::Ok,
                format!("<h1>Deleted {}</h1>\n", req.path),
            )
        }
        Err(e) if e.kind() == PermissionDenied => responses::error_page(HttpStatus::Forbidden),
        Err(_) => responses::error_page(HttpStatus::InternalServerError),
    }
}

fn serve_file(path: &Path) -> HttpResponse {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(err) => {
            return match err.kind() {
                NotFound => responses::error_page(HttpStatus::NotFound),
                PermissionDenied => responses::error_page(HttpStatus::Forbidden),
                _ => responses::error_page(HttpStatus::InternalServerError),
            };
        }
    };

    let mut body = Vec::new();
    if file.read_to_end(&mut body).is_err() {
        return responses::error_page(HttpStatus::InternalServerError);
    }

    let mut response = HttpResponse::new(HttpStatus::Ok);
    response.set_header(ResponseHeader::ContentType, guess_mime(path));
    response.body = body;
    response
}

/// HTML listing of a directory, one entry per row, sorted by name.
fn directory_listing(dir: &Path, request_path: &str) -> HttpResponse {
    let entries = match fs::read_dir(dir) {
        Ok(iter) => iter,
        Err(e) if e.kind() == PermissionDenied => {
            return responses::error_page(HttpStatus::Forbidden);
        }
        Err(_) => return responses::error_page(HttpStatus::InternalServerError),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let base = request_path.trim_end_matches('/');
    let mut body = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Index of {0}/</title></head>\n\
         <body>\n<h1>Index of {0}/</h1>\n<hr>\n<ul>\n",
        base
    );
    for name in &names {
        body.push_str(&format!("<li><a href=\"{base}/{name}\">{name}</a></li>\n"));
    }
    body.push_str("</ul>\n</body>\n</html>\n");

    responses::html(HttpStatus::Ok, body)
}

/// Map a request path onto the filesystem under the route's document root.
/// Traversal components are refused outright.
pub(crate) fn resolve_target(
    path: &str,
    server: &ServerBlock,
    location: &Location,
) -> Result<PathBuf, HttpStatus> {
    let relative = path.strip_prefix(location.path.as_str()).unwrap_or(path);

    let mut full = PathBuf::from(&server.root);
    for component in relative.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(HttpStatus::Forbidden),
            c => full.push(c),
        }
    }
    Ok(full)
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str());
    match ext {
        Some("htm") | Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
