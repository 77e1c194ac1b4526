pub mod cgi;
pub mod responses;
pub mod router;
pub mod static_files;
pub mod uploads;

use crate::config::ServerBlock;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::status::HttpStatus;

/// Map a completed request plus its server block to a response. Never
/// fails: anything that goes wrong inside becomes an error response.
pub fn handle_request(req: &HttpRequest, server: &ServerBlock) -> HttpResponse {
    router::route(req, server)
}

/// Response for a request that never completed parsing.
pub fn handle_error(status: HttpStatus) -> HttpResponse {
    responses::error_page(status)
}
