//! Archives that go wrong partway through: a server that hangs up before the
//! announced body length, and tarballs that make `tar` very chatty.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::mock_archive::tar_archive;

/// Announces the full body in `Content-Length`, sends only the first `sent`
/// bytes, then closes the connection.
pub struct TruncatedArchiveServer {
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl TruncatedArchiveServer {
    pub async fn start(body: Vec<u8>, sent: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body[..sent.min(body.len())]).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base_url, handle }
    }

    pub fn url(&self, archive: &str) -> String {
        format!("{}{}", self.base_url, archive)
    }
}

impl Drop for TruncatedArchiveServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Consensus archive with one block file of `len` bytes
pub fn large_story_archive(len: usize) -> Vec<u8> {
    let blocks = vec![7u8; len];
    tar_archive(&[("data/blockstore.db/000001.log", &blocks[..])])
}

/// A plain file `x` followed by `entries` members under `x/`. Every member
/// fails to extract, so `tar` writes one complaint per entry to stderr.
pub fn noisy_archive(entries: usize) -> Vec<u8> {
    let mut owned: Vec<(String, Vec<u8>)> = vec![("x".to_string(), b"plain file".to_vec())];
    for i in 0..entries {
        owned.push((format!("x/f{:05}", i), b"y".to_vec()));
    }
    let borrowed: Vec<(&str, &[u8])> = owned
        .iter()
        .map(|(path, contents)| (path.as_str(), contents.as_slice()))
        .collect();
    tar_archive(&borrowed)
}
