use std::path::PathBuf;
use tracing::info;

/// Flat list of resolved image URLs, rewritten on every run.
pub struct UrlListSink {
    path: PathBuf,
}

impl UrlListSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write(&self, urls: &[String]) -> std::io::Result<()> {
        let text: String = urls.iter().map(|url| format!("{}\n", url)).collect();
        std::fs::write(&self.path, text)?;
        info!("Image URLs have been written to {}", self.path.display());
        Ok(())
    }
}
