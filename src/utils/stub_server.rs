// src/utils/stub_server.rs

//! Local HTTP server with canned responses for exercising the clients and
//! job handlers without the real sources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Routes = HashMap<String, (u16, String)>;

/// Answers GETs by request target (path plus query). Unknown targets get
/// an empty 404.
pub struct StubServer {
    base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub async fn start<'a>(routes: impl IntoIterator<Item = (&'a str, u16, String)>) -> Self {
        let routes: Arc<Routes> = Arc::new(
            routes
                .into_iter()
                .map(|(target, status, body)| (target.to_string(), (status, body)))
                .collect(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Mutex::new(Vec::new()));

        let log = hits.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(respond(socket, routes.clone(), log.clone()));
            }
        });
        Self { base_url, hits }
    }

    pub fn url(&self, target: &str) -> String {
        format!("{}{}", self.base_url, target)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request targets seen so far, in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn respond(mut socket: TcpStream, routes: Arc<Routes>, hits: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }
    let target = String::from_utf8_lossy(&head)
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    hits.lock().unwrap().push(target.clone());

    let (status, body) = routes.get(&target).cloned().unwrap_or((404, String::new()));
    let response = format!(
        "HTTP/1.1 {status} STUB\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
