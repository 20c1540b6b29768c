//! Streaming HTTP download of source media.

use futures_util::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Download `url` into `dest`, streaming the body to disk.
///
/// Returns the number of bytes written. A partially written file is removed
/// on failure.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> MediaResult<u64> {
    debug!(url = %url, dest = ?dest, "Downloading source media");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::download_failed(format!(
            "GET {} returned HTTP {}",
            url, status
        )));
    }

    let result = write_stream(response, dest).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }

    let bytes = result?;
    if bytes == 0 {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(MediaError::download_failed(format!("{} returned an empty body", url)));
    }

    info!(url = %url, bytes, "Source media downloaded");
    Ok(bytes)
}

async fn write_stream(response: reqwest::Response, dest: &Path) -> MediaResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_streams_body_to_disk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("media/source.mp4");
        let client = reqwest::Client::new();

        let bytes = download_to_file(&client, &format!("{}/clip.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 4096);
        assert_eq!(tokio::fs::read(&dest).await.unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.mp4");
        let client = reqwest::Client::new();

        let err = download_to_file(&client, &format!("{}/missing.mp4", server.uri()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_empty_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("source.mp4");
        let client = reqwest::Client::new();

        assert!(download_to_file(&client, &format!("{}/empty.mp4", server.uri()), &dest)
            .await
            .is_err());
        assert!(!dest.exists());
    }
}
