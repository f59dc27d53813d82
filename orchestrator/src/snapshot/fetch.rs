use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, Command as AsyncCommand};
use tracing::{debug, error, info};

use crate::constants::http;
use crate::errors::{OrchestratorError, Result};

/// Lines of extractor stderr carried into `SnapshotExtractError`
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Lz4,
    Zstd,
    Gzip,
    None,
}

impl Compression {
    /// Guess from the archive name, ignoring any query string
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".tar.lz4") || path.ends_with(".lz4") {
            Some(Compression::Lz4)
        } else if path.ends_with(".tar.zst") || path.ends_with(".zst") {
            Some(Compression::Zstd)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if path.ends_with(".tar") {
            Some(Compression::None)
        } else {
            None
        }
    }

    fn decoder(&self) -> Option<&'static str> {
        match self {
            Compression::Lz4 => Some("lz4 -dc -"),
            Compression::Zstd => Some("zstd -dc -"),
            Compression::Gzip => Some("gzip -dc -"),
            Compression::None => None,
        }
    }

    /// `decoder | tar -x` reading the archive from stdin
    pub fn pipeline(&self, target: &Path) -> String {
        let untar = format!("tar -xf - -C {}", shell_quote(&target.display().to_string()));
        match self.decoder() {
            Some(decoder) => format!("{} | {}", decoder, untar),
            None => untar,
        }
    }
}

/// Reads the extractor's stderr to the end, logging each line and keeping
/// only the last few for the error report.
async fn drain_stderr(stderr: ChildStderr) -> String {
    let mut reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if text.is_empty() {
                    continue;
                }
                debug!("extractor stderr: {}", text);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text);
            }
        }
    }

    Vec::from(tail).join("\n")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Streams remote archives straight into an unpacking pipeline; the archive
/// is never buffered whole in memory or on disk.
#[derive(Clone)]
pub struct ArchiveFetcher {
    client: Client,
}

impl ArchiveFetcher {
    pub fn new() -> anyhow::Result<Self> {
        // No overall timeout - archive downloads run as long as they need
        let client = Client::builder()
            .connect_timeout(http::ARCHIVE_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `url` and unpack it under `target`. Returns the number of
    /// archive bytes received.
    pub async fn fetch_and_extract(
        &self,
        url: &str,
        compression: Option<Compression>,
        target: &Path,
    ) -> Result<u64> {
        let compression = compression
            .or_else(|| Compression::from_url(url))
            .ok_or_else(|| OrchestratorError::SnapshotExtractError {
                target: target.to_path_buf(),
                reason: format!("cannot tell archive compression from {}", url),
            })?;

        info!("Fetching snapshot archive {} into {}", url, target.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OrchestratorError::SnapshotFetchError {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(OrchestratorError::SnapshotFetchError {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let pipeline = compression.pipeline(target);
        debug!("Extraction pipeline: {}", pipeline);

        let mut child = AsyncCommand::new("bash")
            .arg("-o")
            .arg("pipefail")
            .arg("-c")
            .arg(&pipeline)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestratorError::SnapshotExtractError {
                target: target.to_path_buf(),
                reason: format!("failed to spawn extractor: {}", e),
            })?;

        let (mut stdin, stderr) = match (child.stdin.take(), child.stderr.take()) {
            (Some(stdin), Some(stderr)) => (stdin, stderr),
            _ => {
                return Err(OrchestratorError::SnapshotExtractError {
                    target: target.to_path_buf(),
                    reason: "extractor stdio unavailable".to_string(),
                })
            }
        };

        // Drained while streaming: a child blocked on a full stderr pipe stops reading stdin
        let stderr_handle = tokio::spawn(drain_stderr(stderr));

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut write_error = None;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    drop(stdin);
                    let _ = child.kill().await;
                    stderr_handle.abort();
                    error!("Archive stream from {} broke after {} bytes", url, received);
                    return Err(OrchestratorError::SnapshotFetchError {
                        url: url.to_string(),
                        reason: format!("stream interrupted after {} bytes: {}", received, e),
                    });
                }
            };

            if let Err(e) = stdin.write_all(&bytes).await {
                // extractor exited early; its stderr says why
                write_error = Some(e);
                break;
            }
            received += bytes.len() as u64;
        }

        let _ = stdin.shutdown().await;
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| OrchestratorError::SnapshotExtractError {
                target: target.to_path_buf(),
                reason: e.to_string(),
            })?;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if !status.success() || write_error.is_some() {
            let reason = match (stderr_tail.is_empty(), write_error) {
                (false, _) => stderr_tail,
                (true, Some(e)) => format!("extractor closed its input: {}", e),
                (true, None) => format!("extractor exited with {}", status),
            };
            return Err(OrchestratorError::SnapshotExtractError {
                target: target.to_path_buf(),
                reason,
            });
        }

        info!(
            "✓ Extracted {:.1} MB from {}",
            received as f64 / 1024.0 / 1024.0,
            url
        );
        Ok(received)
    }
}
