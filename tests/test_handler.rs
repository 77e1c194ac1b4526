use std::fs;
use std::path::PathBuf;

use rustyserv::config::{Config, ServerBlock};
use rustyserv::handler;
use rustyserv::http::HttpMethod;
use rustyserv::http::request::HttpRequest;
use rustyserv::http::status::HttpStatus;

struct TempRoot {
    path: PathBuf,
}

impl TempRoot {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "rustyserv-handler-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    fn write(&self, name: &str, content: &[u8]) {
        fs::write(self.path.join(name), content).unwrap();
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn server_block(root: &TempRoot, extra: &str) -> ServerBlock {
    let toml = format!(
        r#"
        [[server]]
        listen = 0
        root = "{}"
        autoindex = true
        {extra}
        "#,
        root.path.display()
    );
    Config::from_toml(&toml).unwrap().servers.remove(0)
}

fn request(method: HttpMethod, path: &str) -> HttpRequest {
    let mut req = HttpRequest::new();
    req.method = method;
    req.target = path.to_string();
    req.path = path.to_string();
    req.http_version = (1, 1);
    req
}

#[test]
fn get_serves_file_byte_identical() {
    let root = TempRoot::new("get");
    root.write("index.html", b"<h1>hello</h1>");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Get, "/index.html"), &server);
    assert_eq!(res.status, HttpStatus::Ok);
    assert_eq!(res.body, b"<h1>hello</h1>");
    assert_eq!(res.header("Content-Type"), Some("text/html"));
}

#[test]
fn get_on_directory_serves_index_file() {
    let root = TempRoot::new("index");
    root.write("index.html", b"front page");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Get, "/"), &server);
    assert_eq!(res.status, HttpStatus::Ok);
    assert_eq!(res.body, b"front page");
}

#[test]
fn autoindex_lists_every_entry_once() {
    let root = TempRoot::new("autoindex");
    root.write("alpha.txt", b"a");
    root.write("beta.txt", b"b");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Get, "/"), &server);
    assert_eq!(res.status, HttpStatus::Ok);

    let body = String::from_utf8(res.body).unwrap();
    assert_eq!(body.matches(">alpha.txt<").count(), 1);
    assert_eq!(body.matches(">beta.txt<").count(), 1);
    assert_eq!(body.matches("<li>").count(), 2);
}

#[test]
fn directory_without_index_and_autoindex_off_is_forbidden() {
    let root = TempRoot::new("noindex");
    root.write("something.txt", b"x");
    let toml = format!(
        r#"
        [[server]]
        listen = 0
        root = "{}"
        "#,
        root.path.display()
    );
    let server = Config::from_toml(&toml).unwrap().servers.remove(0);

    let res = handler::handle_request(&request(HttpMethod::Get, "/"), &server);
    assert_eq!(res.status, HttpStatus::Forbidden);
}

#[test]
fn missing_file_is_404() {
    let root = TempRoot::new("missing");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Get, "/nope.txt"), &server);
    assert_eq!(res.status, HttpStatus::NotFound);
}

#[test]
fn mime_type_follows_extension() {
    let root = TempRoot::new("mime");
    root.write("data.json", b"{}");
    root.write("notes.txt", b"n");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Get, "/data.json"), &server);
    assert_eq!(res.header("Content-Type"), Some("application/json"));

    let res = handler::handle_request(&request(HttpMethod::Get, "/notes.txt"), &server);
    assert_eq!(res.header("Content-Type"), Some("text/plain"));
}

#[test]
fn post_then_get_round_trips() {
    let root = TempRoot::new("roundtrip");
    let server = server_block(&root, "");

    let mut post = request(HttpMethod::Post, "/upload.bin");
    post.body = vec![0, 1, 2, 3, 250, 251, 252];
    post.content_length = Some(post.body.len());

    let res = handler::handle_request(&post, &server);
    assert_eq!(res.status, HttpStatus::Created);

    let res = handler::handle_request(&request(HttpMethod::Get, "/upload.bin"), &server);
    assert_eq!(res.status, HttpStatus::Ok);
    assert_eq!(res.body, vec![0, 1, 2, 3, 250, 251, 252]);
}

#[test]
fn multipart_post_stores_named_file() {
    let root = TempRoot::new("multipart");
    let server = server_block(&root, "");

    let mut post = request(HttpMethod::Post, "/incoming");
    post.boundary = Some("XX".to_string());
    post.body = b"--XX\r\n\
                  Content-Disposition: form-data; name=\"f\"; filename=\"../report.txt\"\r\n\
                  \r\n\
                  quarterly\r\n\
                  --XX--\r\n"
        .to_vec();

    let res = handler::handle_request(&post, &server);
    assert_eq!(res.status, HttpStatus::Created);

    // The client-supplied path is reduced to its file name.
    let stored = root.path.join("incoming").join("report.txt");
    assert_eq!(fs::read(stored).unwrap(), b"quarterly");
}

#[test]
fn delete_removes_existing_file() {
    let root = TempRoot::new("delete");
    root.write("victim.txt", b"bye");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Delete, "/victim.txt"), &server);
    assert_eq!(res.status, HttpStatus::Ok);
    assert!(!root.path.join("victim.txt").exists());
}

#[test]
fn delete_missing_file_is_404_with_page_not_found() {
    let root = TempRoot::new("delete404");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Delete, "/missing.txt"), &server);
    assert_eq!(res.status, HttpStatus::NotFound);

    let body = String::from_utf8(res.body).unwrap();
    assert!(body.contains("Page Not Found"));
}

#[test]
fn excluded_method_is_405() {
    let root = TempRoot::new("methods");
    root.write("page.html", b"x");
    let server = server_block(
        &root,
        r#"
        [[server.location]]
        path = "/"
        methods = ["GET"]
        "#,
    );

    let res = handler::handle_request(&request(HttpMethod::Patch, "/page.html"), &server);
    assert_eq!(res.status, HttpStatus::MethodNotAllowed);

    let res = handler::handle_request(&request(HttpMethod::Post, "/page.html"), &server);
    assert_eq!(res.status, HttpStatus::MethodNotAllowed);
}

#[test]
fn traversal_is_rejected() {
    let root = TempRoot::new("traversal");
    let server = server_block(&root, "");

    let res = handler::handle_request(&request(HttpMethod::Get, "/../secrets.txt"), &server);
    assert_eq!(res.status, HttpStatus::Forbidden);
}

#[test]
fn redirect_route_returns_301() {
    let root = TempRoot::new("redirect");
    let server = server_block(
        &root,
        r#"
        [[server.location]]
        path = "/old"
        redirect = "/new/place.html"
        "#,
    );

    let res = handler::handle_request(&request(HttpMethod::Get, "/old/page.html"), &server);
    assert_eq!(res.status, HttpStatus::MovedPermanently);
    assert_eq!(res.header("Location"), Some("/new/place.html"));
}

#[test]
fn longest_prefix_location_wins() {
    let root = TempRoot::new("longest");
    fs::create_dir_all(root.path.join("deep")).unwrap();
    root.write("deep/file.txt", b"deep");
    let server = server_block(
        &root,
        r#"
        [[server.location]]
        path = "/"
        methods = ["GET"]

        [[server.location]]
        path = "/deep"
        methods = ["DELETE"]
        "#,
    );

    // "/deep" is the better match, and it only allows DELETE.
    let res = handler::handle_request(&request(HttpMethod::Get, "/deep/file.txt"), &server);
    assert_eq!(res.status, HttpStatus::MethodNotAllowed);
}
