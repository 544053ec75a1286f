use crate::types::{GrabError, RetryPolicy, USER_AGENT};
use futures::StreamExt;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const ALLOWED_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "jfif"];

/// Extension for a `Content-Type` value, falling back to `jpg` for anything
/// outside the allow-set.
pub fn extension_for(content_type: Option<&str>) -> String {
    let subtype = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| mime.rsplit('/').next())
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&subtype.as_str()) {
        subtype
    } else {
        "jpg".to_string()
    }
}

/// `Page<page>_No<index + 1>.<ext>`, the position padded to two digits.
pub fn file_name(page: u32, index: usize, ext: &str) -> String {
    format!("Page{}_No{:02}.{}", page, index + 1, ext)
}

pub struct Fetcher {
    client: reqwest::Client,
    dir: PathBuf,
    read_timeout: Duration,
    retry: RetryPolicy,
}

impl Fetcher {
    /// `read_timeout` bounds the wait for the response head and for each
    /// body chunk, not the transfer as a whole.
    pub fn new(
        dir: impl Into<PathBuf>,
        read_timeout: Duration,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            dir: dir.into(),
            read_timeout,
            retry,
        })
    }

    /// Removes `.part` files left by a run that was interrupted mid-download.
    pub fn clear_partials(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "part") {
                std::fs::remove_file(&path)?;
                warn!("Removed partial download {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Saves the image to the download directory. Failures are logged and
    /// swallowed after the last attempt.
    pub async fn download(&self, url: &str, page: u32, index: usize) {
        for attempt in 1..=self.retry.attempts {
            self.retry.pause(attempt).await;

            match self.try_download(url, page, index).await {
                Ok(name) => {
                    info!("[Saved] {}", name);
                    return;
                }
                Err(e) => warn!("[Retry {}] Error downloading {} - {}", attempt, url, e),
            }
        }

        warn!("[Fail] Gave up on {}", url);
    }

    async fn try_download(&self, url: &str, page: u32, index: usize) -> Result<String, GrabError> {
        let response = tokio::time::timeout(self.read_timeout, self.client.get(url).send())
            .await
            .map_err(|_| GrabError::Timeout(self.read_timeout))??;
        if !response.status().is_success() {
            return Err(GrabError::Status(response.status()));
        }

        let ext = extension_for(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let name = file_name(page, index, &ext);
        let target = self.dir.join(&name);
        let partial = self.dir.join(format!("{}.part", name));

        let saved = match stream_to(response, &partial, self.read_timeout).await {
            Ok(()) => tokio::fs::rename(&partial, &target).await.map_err(GrabError::from),
            Err(e) => Err(e),
        };
        if saved.is_err() {
            tokio::fs::remove_file(&partial).await.ok();
        }

        saved.map(|_| name)
    }
}

async fn stream_to(
    response: reqwest::Response,
    path: &Path,
    read_timeout: Duration,
) -> Result<(), GrabError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::time::timeout(read_timeout, stream.next())
            .await
            .map_err(|_| GrabError::Timeout(read_timeout))?;
        match next {
            Some(chunk) => file.write_all(&chunk?).await?,
            None => break,
        }
    }

    file.flush().await?;
    Ok(())
}
