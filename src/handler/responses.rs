use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

/// Synthesized HTML page for any status in the table. This path cannot
/// fail; whatever happens elsewhere, some well-formed response exists.
pub fn error_page(status: HttpStatus) -> HttpResponse {
    html(status, render_page(status.code(), status.reason()))
}

pub fn created() -> HttpResponse {
    html(
        HttpStatus::Created,
        render_page(
            HttpStatus::Created.code(),
            HttpStatus::Created.reason(),
        ),
    )
}

pub fn redirect(target: &str) -> HttpResponse {
    let status = HttpStatus::MovedPermanently;
    let mut res = html(status, render_page(status.code(), status.reason()));
    res.set_header(ResponseHeader::Location, target);
    res
}

pub fn html(status: HttpStatus, body: String) -> HttpResponse {
    let mut res = HttpResponse::new(status);
    res.set_header(ResponseHeader::ContentType, "text/html");
    res.body = body.into_bytes();
    res
}

fn render_page(code: u16, reason: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>{code} {reason}</title></head>\n\
         <body>\n\
         <h1>{code} {reason}</h1>\n\
         <hr>\n\
         <p>rustyserv</p>\n\
         </body>\n\
         </html>\n"
    )
}
