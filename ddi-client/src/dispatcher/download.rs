//! Streamed artifact download: exposes both "download to a path" and
//! "download with a receiver callback" so
//! callers can hash or inspect bytes as they arrive without buffering the
//! whole artifact in memory.

use std::{path::Path, time::Duration};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{auth::AuthStrategy, dispatcher::client::build_http_client, error::runtime::RequestError};

/// A single artifact's resolved download location and the session
/// configuration needed to fetch it. Created fresh per artifact by the
/// deployment flow; discarded once the download completes.
pub struct ArtifactDownload {
    url: Url,
    auth: AuthStrategy,
    default_headers: Vec<(String, String)>,
    verify_server_certificate: bool,
    timeout: Duration,
}

impl ArtifactDownload {
    pub(crate) fn new(
        url: Url,
        auth: AuthStrategy,
        default_headers: Vec<(String, String)>,
        verify_server_certificate: bool,
        timeout: Duration,
    ) -> Self {
        Self { url, auth, default_headers, verify_server_certificate, timeout }
    }

    /// Streams the artifact into the file at `path`, creating/truncating it.
    ///
    /// # Errors
    /// Returns a [`RequestError`] on any transport failure; the caller
    /// decides whether/how to verify the downloaded bytes against the
    /// artifact's declared hashes, which is offered but not enforced by
    /// the core.
    pub async fn download_to(&self, path: &Path) -> Result<(), RequestError> {
        let mut file = tokio::fs::File::create(path).await?;
        self.stream_into(&mut file).await
    }

    async fn stream_into(&self, file: &mut tokio::fs::File) -> Result<(), RequestError> {
        let client = build_http_client(
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.timeout,
        )
        .expect("auth/TLS configuration was already validated at build time");

        let request = self.auth.apply_header(client.get(self.url.clone()));
        let response = request.send().await?;
        let mut stream = response.error_for_status()?.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Streams the artifact, invoking `receiver` with each chunk as it
    /// arrives. Returning `false` from `receiver` stops the download early.
    ///
    /// # Errors
    /// Returns a [`RequestError`] on any transport failure.
    pub async fn download_with_receiver<F>(&self, mut receiver: F) -> Result<(), RequestError>
    where
        F: FnMut(&[u8]) -> bool + Send,
    {
        let client = build_http_client(
            &self.auth,
            &self.default_headers,
            self.verify_server_certificate,
            self.timeout,
        )
        .expect("auth/TLS configuration was already validated at build time");

        let request = self.auth.apply_header(client.get(self.url.clone()));
        let response = request.send().await?;
        let mut stream = response.error_for_status()?.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !receiver(&chunk) {
                break;
            }
        }
        Ok(())
    }
}
