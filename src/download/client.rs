//! HTTP client wrapper for streaming page images to disk.
//!
//! This module provides the `HttpClient` struct which handles streaming
//! downloads with proper timeout configuration and error handling.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use super::error::DownloadError;

/// Leading bytes inspected to recognize the image format.
const SNIFF_BYTES: usize = 16;

/// Default User-Agent for page requests (identifies the tool).
fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("comicdl/{version}")
}

/// HTTP client for downloading page images with streaming support.
///
/// This client is designed to be created once and shared by every worker,
/// taking advantage of connection pooling. Cloning is cheap.
///
/// # Example
///
/// ```no_run
/// use comicdl_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let bytes = client
///     .download_to_path("https://cdn.example.com/01.jpg", Path::new("./1/0/1.jpg"))
///     .await?;
/// println!("wrote {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Request timeout: 30 seconds
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, request_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, request_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Streams `url` into the file at `dest`, returning the bytes written.
    ///
    /// The file is created or truncated before the first chunk is written, so
    /// a retry always fully replaces what an earlier attempt left behind. If
    /// the body stream fails midway, the partial file is removed.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - Writing to disk fails
    #[must_use = "download result contains the number of bytes written"]
    #[instrument(skip(self, dest), fields(url = %url, dest = %dest.display()))]
    pub async fn download_to_path(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        debug!("starting download");

        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        let stream_result = stream_to_file(&mut file, response, url, dest).await;
        if stream_result.is_err() {
            debug!(path = %dest.display(), "cleaning up partial file after error");
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
        }
        let bytes_written = stream_result?;

        info!(path = %dest.display(), bytes = bytes_written, "download complete");
        Ok(bytes_written)
    }
}

/// Streams response body to file in chunks, returning bytes written.
///
/// Memory use is bounded by the chunk and buffer size, not the image size.
/// The body is rejected with [`DownloadError::NotAnImage`] as soon as its
/// leading bytes show it is not a readable image.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_BYTES);
    let mut sniffed = false;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        if !sniffed {
            let take = (SNIFF_BYTES - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            if head.len() == SNIFF_BYTES {
                ensure_image(&head, url)?;
                sniffed = true;
            }
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    if !sniffed {
        ensure_image(&head, url)?;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

fn ensure_image(head: &[u8], url: &str) -> Result<(), DownloadError> {
    match image::guess_format(head) {
        Ok(format) if format.reading_enabled() => Ok(()),
        _ => Err(DownloadError::not_an_image(url)),
    }
}

fn build_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .gzip(true)
        .user_agent(default_user_agent())
        .build()
}
