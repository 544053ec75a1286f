use crate::{
    browser::PageRenderer, extractor::LinkExtractor, fetcher::Fetcher, sink::UrlListSink,
    types::RunResult,
};
use tracing::{error, info, warn};

pub struct PageWalker<R> {
    extractor: LinkExtractor<R>,
    fetcher: Fetcher,
    sink: UrlListSink,
}

impl<R: PageRenderer> PageWalker<R> {
    pub fn new(extractor: LinkExtractor<R>, fetcher: Fetcher, sink: UrlListSink) -> Self {
        Self {
            extractor,
            fetcher,
            sink,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Walks gallery pages from 1 up to `max_pages`, stopping early at the
    /// first page that yields no detail links. Items that fail to resolve
    /// are skipped.
    pub async fn run(&self, max_pages: u32) -> RunResult {
        let mut result = RunResult::default();

        for page in 1..=max_pages {
            let links = self.extractor.detail_links(page).await;
            if links.is_empty() {
                info!("Page {} has no screenshots, stopping", page);
                break;
            }
            result.pages += 1;

            for (index, link) in links.iter().enumerate() {
                info!("Processing: {}", link);
                match self.extractor.full_image_url(link).await {
                    Some(url) => {
                        info!("[OK] {}", url);
                        result.urls.push(url.clone());
                        self.fetcher.download(&url, page, index).await;
                    }
                    None => {
                        warn!("Failed to extract image from {}", link);
                        result.failed += 1;
                    }
                }
            }
        }

        if result.urls.is_empty() {
            info!("No image URLs found.");
        } else if let Err(e) = self.sink.write(&result.urls) {
            error!("Failed to write image URLs: {}", e);
        }

        info!(
            "Walked {} pages: {} images resolved, {} failed",
            result.pages,
            result.urls.len(),
            result.failed
        );
        result
    }
}
