use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Time allowed for downloading a whole video.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

// shared by every request for the lifetime of the process
static DOWNLOAD_CLIENT: LazyLock<reqwest::blocking::Client> =
    LazyLock::new(reqwest::blocking::Client::new);

/// Where the bytes of a video come from.
#[derive(Clone, Debug, PartialEq)]
pub enum VideoSource {
    /// Fetched over HTTP(S).
    Url(String),
    /// Already in memory.
    Bytes(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("error reading response body: {0}")]
    Stream(std::io::Error),

    #[error("failed to create temporary file: {0}")]
    TempFile(std::io::Error),

    #[error("failed to write temporary file: {0}")]
    Write(std::io::Error),
}

impl FetchError {
    /// Whether the failure happened while talking to the remote host.
    pub fn is_download(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Stream(_))
    }
}

/// Copies `source` into a new randomly named temporary file.
///
/// The file is created in `dir`, or the system temporary directory, and is
/// deleted when the returned handle is dropped. On error nothing is left
/// behind.
pub fn materialize(source: &VideoSource, dir: Option<&Path>) -> Result<NamedTempFile, FetchError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("video-").suffix(".mp4");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(FetchError::TempFile)?;

    match source {
        VideoSource::Url(url) => {
            log::info!("Downloading video from {}", url);
            let mut response = DOWNLOAD_CLIENT
                .get(url)
                .timeout(DOWNLOAD_TIMEOUT)
                .send()?
                .error_for_status()?;
            let written =
                std::io::copy(&mut response, file.as_file_mut()).map_err(FetchError::Stream)?;
            log::info!(
                "Video downloaded successfully to {} ({} bytes)",
                file.path().display(),
                written
            );
        }
        VideoSource::Bytes(bytes) => {
            file.write_all(bytes).map_err(FetchError::Write)?;
        }
    }

    file.flush().map_err(FetchError::Write)?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_land_in_a_file_that_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = materialize(&VideoSource::Bytes(b"not a video".to_vec()), Some(dir.path())).unwrap();

        let path = file.path().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"not a video");

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn unreachable_host_is_a_download_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();

        let err = materialize(
            &VideoSource::Url(format!("http://127.0.0.1:{port}/clip.mp4")),
            Some(dir.path()),
        )
        .unwrap_err();

        assert!(err.is_download());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
