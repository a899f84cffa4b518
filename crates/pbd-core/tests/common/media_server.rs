//! Minimal HTTP/1.1 forward proxy that answers requests itself, for integration tests.
//!
//! Clients configured with this server as their proxy send absolute-form
//! request lines (`GET http://media.test/a.mp4 HTTP/1.1`); the server routes on
//! the path, records the `Proxy-Authorization` header of every request, and
//! closes the connection after each response.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Canned response for one path.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Sleep before responding.
    pub delay: Duration,
    /// Answer this many requests with 503 before serving the route.
    pub fail_first: usize,
}

impl Route {
    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body,
            delay: Duration::ZERO,
            fail_first: 0,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: b"nope".to_vec(),
            delay: Duration::ZERO,
            fail_first: 0,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }
}

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub proxy_auth: Option<String>,
    pub referer: Option<String>,
}

/// Handle to a running server. The server lives until the process exits.
#[derive(Clone)]
pub struct MediaServer {
    port: u16,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl MediaServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|s| s.path == path).count()
    }
}

/// Starts the server in a background thread with the given routes; unknown paths get 404.
pub fn start(routes: Vec<(&str, Route)>) -> MediaServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = MediaServer {
        port,
        seen: Arc::clone(&seen),
    };
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let seen = Arc::clone(&seen);
            thread::spawn(move || handle(stream, &routes, &seen));
        }
    });
    server
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Route>, seen: &Mutex<Vec<Seen>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(head) = read_head(&mut stream) else {
        return;
    };
    let Some(request) = parse_request(&head) else {
        let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n");
        return;
    };

    let earlier = {
        let mut seen = seen.lock().unwrap();
        let earlier = seen.iter().filter(|s| s.path == request.path).count();
        seen.push(request.clone());
        earlier
    };

    let response = match routes.get(&request.path) {
        Some(route) if earlier < route.fail_first => Route::status(503),
        Some(route) => {
            if !route.delay.is_zero() {
                thread::sleep(route.delay);
            }
            route.clone()
        }
        None => Route::status(404),
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason(response.status),
        response.content_type,
        response.body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&response.body);
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(buf).ok()
}

/// Path of the absolute-form target plus the headers the tests look at.
fn parse_request(head: &str) -> Option<Seen> {
    let mut lines = head.lines();
    let target = lines.next()?.split_whitespace().nth(1)?;
    let path = match target.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
        None => target,
    };
    let mut proxy_auth = None;
    let mut referer = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("proxy-authorization") {
                proxy_auth = Some(value.trim().to_string());
            } else if name.eq_ignore_ascii_case("referer") {
                referer = Some(value.trim().to_string());
            }
        }
    }
    Some(Seen {
        path: path.to_string(),
        proxy_auth,
        referer,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        407 => "Proxy Authentication Required",
        410 => "Gone",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
