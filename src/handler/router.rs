use crate::config::{Location, ServerBlock};
use crate::handler::{cgi, responses, static_files, uploads};
use crate::http::HttpMethod;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::status::HttpStatus;

pub fn route(req: &HttpRequest, server: &ServerBlock) -> HttpResponse {
    let Some(location) = matching_location(server, &req.path) else {
        return responses::error_page(HttpStatus::NotFound);
    };

    if let Some(target) = &location.redirect {
        return responses::redirect(target);
    }

    if !location.allows(req.method) {
        return responses::error_page(HttpStatus::MethodNotAllowed);
    }

    if let Some(ext) = &location.cgi {
        if req.path.ends_with(ext.as_str()) {
            return cgi::execute(req, server, location);
        }
    }

    match req.method {
        HttpMethod::Get | HttpMethod::Head => static_files::serve(req, server, location),
        HttpMethod::Post => uploads::store(req, server, location),
        HttpMethod::Delete => static_files::remove(req, server, location),
        _ => responses::error_page(HttpStatus::NotImplemented),
    }
}

/// Longest matching path prefix wins.
fn matching_location<'a>(server: &'a ServerBlock, path: &str) -> Option<&'a Location> {
    server
        .locations
        .iter()
        .filter(|l| path.starts_with(l.path.as_str()))
        .max_by_key(|l| l.path.len())
}
