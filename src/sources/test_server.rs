//! Canned HTTP responses on a local port, for driving adapters end to end.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One canned response.
///
/// The pattern is a path with an optional query: `/forecast` matches any
/// query, `/playlistItems?pageToken=P2` only requests whose query contains
/// `pageToken=P2`. The first matching route wins; anything else is a 404.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: String,
    status: u16,
    body: String,
}

pub fn route(pattern: &str, status: u16, body: impl Into<String>) -> Route {
    Route {
        pattern: pattern.to_string(),
        status,
        body: body.into(),
    }
}

impl Route {
    fn matches(&self, target: &str) -> bool {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let (want_path, want_query) = self
            .pattern
            .split_once('?')
            .unwrap_or((self.pattern.as_str(), ""));
        path == want_path
            && want_query
                .split('&')
                .filter(|needle| !needle.is_empty())
                .all(|needle| query.contains(needle))
    }
}

pub struct TestServer {
    base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(respond(socket, routes.clone(), log.clone()));
            }
        });

        Self { base, requests }
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:40123`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests served so far whose path starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|target| target.starts_with(prefix))
            .count()
    }
}

async fn respond(mut socket: TcpStream, routes: Arc<Vec<Route>>, log: Arc<Mutex<Vec<String>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    log.lock().unwrap().push(target.clone());

    let (status, body) = routes
        .iter()
        .find(|r| r.matches(&target))
        .map(|r| (r.status, r.body.clone()))
        .unwrap_or((404, "not found".to_string()));
    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_matching() {
        let page_two = route("/playlistItems?pageToken=P2", 200, "");
        assert!(page_two.matches("/playlistItems?part=snippet&pageToken=P2&key=k"));
        assert!(!page_two.matches("/playlistItems?part=snippet&key=k"));

        let any = route("/forecast", 200, "");
        assert!(any.matches("/forecast?lat=1&lon=2"));
        assert!(!any.matches("/forecast/extra"));
    }
}
