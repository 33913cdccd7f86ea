//! Shared HTTP client and sync bridge over async reqwest.
//!
//! Uses async reqwest internally but presents a blocking interface: crawls
//! are sequential and paced by sleeps, so each call is driven to completion
//! on a small shared runtime.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;

use crate::error::FetchError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-request timeout for API calls and page scrapes
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("devline/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Send a request and return `(status, body)` for any HTTP status.
///
/// Only transport failures become errors here; status classification is
/// left to the caller so it can read error bodies.
pub fn send_text(request: reqwest::RequestBuilder) -> Result<(u16, String), FetchError> {
    SHARED_RUNTIME.handle().block_on(async {
        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| FetchError::from_reqwest(&e))?;
        Ok((status, body))
    })
}

/// Stream a URL into `dest` via `<dest>.tmp` → rename. Returns bytes written.
pub fn download_to_file(url: &str, dest: &Path) -> Result<u64, FetchError> {
    let tmp = dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    let io_err = |e: std::io::Error| FetchError::Request(format!("write {}: {e}", tmp.display()));

    let written = SHARED_RUNTIME.handle().block_on(async {
        let resp = SHARED_CLIENT
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(FetchError::from_status(status));
        }

        let mut out = BufWriter::new(File::create(&tmp).map_err(io_err)?);
        let mut written = 0u64;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(&e))?;
            out.write_all(&chunk).map_err(io_err)?;
            written += chunk.len() as u64;
        }
        out.flush().map_err(io_err)?;
        Ok(written)
    });

    match written {
        Ok(n) => {
            fs::rename(&tmp, dest).map_err(io_err)?;
            Ok(n)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
