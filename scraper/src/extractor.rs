use crate::{
    browser::PageRenderer,
    types::{Config, GrabError, RetryPolicy},
};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{info, warn};

fn attr_selector(tag: &str, attr: &str, pattern: &str) -> anyhow::Result<Selector> {
    let css = format!("{}[{}*=\"{}\"]", tag, attr, pattern.replace('"', "\\\""));
    Selector::parse(&css).map_err(|e| anyhow::anyhow!("bad selector {}: {}", css, e))
}

/// Hrefs of every anchor matching `selector`, in document order. Empty hrefs
/// are skipped, duplicates kept.
pub fn parse_detail_links(markup: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(markup);
    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.is_empty())
        .map(|href| href.to_string())
        .collect()
}

/// First image matching `selector`, resolved against `base` with its query
/// string removed.
pub fn parse_full_image_url(
    markup: &str,
    selector: &Selector,
    base: &str,
) -> Result<Option<String>, GrabError> {
    let src = {
        let document = Html::parse_document(markup);
        let found = document
            .select(selector)
            .filter_map(|img| img.value().attr("src"))
            .find(|src| !src.is_empty())
            .map(|src| src.to_string());
        match found {
            Some(src) => src,
            None => return Ok(None),
        }
    };

    let mut url = url::Url::parse(base)?.join(&src)?;
    url.set_query(None);
    Ok(Some(url.to_string()))
}

/// How one kind of page is loaded: the render wait after each navigation and
/// the retry discipline around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub settle: Duration,
    pub retry: RetryPolicy,
}

pub struct LinkExtractor<R> {
    renderer: R,
    gallery_base: String,
    detail_selector: Selector,
    asset_selector: Selector,
    gallery: Pacing,
    detail: Pacing,
}

impl<R: PageRenderer> LinkExtractor<R> {
    pub fn new(
        renderer: R,
        community: &str,
        profile: &str,
        detail_pattern: &str,
        asset_pattern: &str,
        gallery: Pacing,
        detail: Pacing,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            renderer,
            gallery_base: format!(
                "{}/profiles/{}/screenshots/",
                community.trim_end_matches('/'),
                profile
            ),
            detail_selector: attr_selector("a", "href", detail_pattern)?,
            asset_selector: attr_selector("img", "src", asset_pattern)?,
            gallery,
            detail,
        })
    }

    pub fn from_config(renderer: R, config: &Config) -> anyhow::Result<Self> {
        Self::new(
            renderer,
            &config.community,
            &config.profile,
            &config.detail_pattern,
            &config.asset_pattern,
            Pacing {
                settle: config.gallery_settle(),
                retry: config.gallery_retry,
            },
            Pacing {
                settle: config.detail_settle(),
                retry: config.detail_retry,
            },
        )
    }

    #[cfg(test)]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Oldest-first grid of the profile's own screenshots.
    pub fn gallery_url(&self, page: u32) -> String {
        format!(
            "{}?p={}&sort=oldestfirst&browsefilter=myfiles&view=grid&privacy=30",
            self.gallery_base, page
        )
    }

    /// Detail links on a gallery page. An empty result after every attempt
    /// means the walk is over; it is never reported as an error.
    pub async fn detail_links(&self, page: u32) -> Vec<String> {
        let url = self.gallery_url(page);

        for attempt in 1..=self.gallery.retry.attempts {
            self.gallery.retry.pause(attempt).await;
            info!("Loading screenshot grid page: {} (attempt {})", url, attempt);

            match self.renderer.navigate(&url, self.gallery.settle).await {
                Ok(markup) => {
                    let links = parse_detail_links(&markup, &self.detail_selector);
                    if !links.is_empty() {
                        info!("Found {} screenshot detail links", links.len());
                        return links;
                    }
                    warn!("No screenshot links found on page {}, refreshing", page);
                }
                Err(e) => warn!("Error loading grid page {}: {}", page, e),
            }
        }

        warn!(
            "No screenshot links on page {} after {} attempts",
            page, self.gallery.retry.attempts
        );
        Vec::new()
    }

    /// Full-size image URL behind a detail link, or `None` once every attempt
    /// has failed.
    pub async fn full_image_url(&self, detail_url: &str) -> Option<String> {
        for attempt in 1..=self.detail.retry.attempts {
            self.detail.retry.pause(attempt).await;
            info!("Opening detail page: {} (attempt {})", detail_url, attempt);

            let markup = match self.renderer.navigate(detail_url, self.detail.settle).await {
                Ok(markup) => markup,
                Err(e) => {
                    warn!("Error loading detail page: {}", e);
                    continue;
                }
            };

            match parse_full_image_url(&markup, &self.asset_selector, detail_url) {
                Ok(Some(url)) => return Some(url),
                Ok(None) => warn!("Image not found on {}, refreshing", detail_url),
                Err(e) => warn!("Unusable image url on {}: {}", detail_url, e),
            }
        }

        warn!(
            "Failed to load image from {} after {} attempts",
            detail_url, self.detail.retry.attempts
        );
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{collections::HashMap, sync::Mutex};

    /// Serves canned markup per URL and records every navigation with its
    /// settle time. URLs without an entry fail like a dead browser tab.
    #[derive(Default)]
    pub(crate) struct ScriptedRenderer {
        pages: HashMap<String, String>,
        visits: Mutex<Vec<(String, Duration)>>,
    }

    impl ScriptedRenderer {
        pub(crate) fn with(mut self, url: &str, markup: &str) -> Self {
            self.pages.insert(url.to_string(), markup.to_string());
            self
        }

        pub(crate) fn visits_to(&self, needle: &str) -> usize {
            self.visits
                .lock()
                .unwrap()
                .iter()
                .filter(|(url, _)| url.contains(needle))
                .count()
        }

        pub(crate) fn settles_for(&self, needle: &str) -> Vec<Duration> {
            self.visits
                .lock()
                .unwrap()
                .iter()
                .filter(|(url, _)| url.contains(needle))
                .map(|(_, settle)| *settle)
                .collect()
        }
    }

    impl PageRenderer for ScriptedRenderer {
        async fn navigate(&self, url: &str, settle: Duration) -> Result<String, GrabError> {
            self.visits.lock().unwrap().push((url.to_string(), settle));
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| GrabError::Unknown(anyhow::anyhow!("no page at {}", url)))
        }
    }

    pub(crate) const NO_WAIT: Pacing = Pacing {
        settle: Duration::ZERO,
        retry: RetryPolicy::new(6, 0),
    };

    pub(crate) fn extractor(renderer: ScriptedRenderer) -> LinkExtractor<ScriptedRenderer> {
        LinkExtractor::new(
            renderer,
            "https://community.test/",
            "42",
            "/filedetails/",
            "/ugc/",
            NO_WAIT,
            NO_WAIT,
        )
        .unwrap()
    }

    #[test]
    fn gallery_url_carries_fixed_view_parameters() {
        let extractor = extractor(ScriptedRenderer::default());
        assert_eq!(
            extractor.gallery_url(3),
            "https://community.test/profiles/42/screenshots/?p=3&sort=oldestfirst&browsefilter=myfiles&view=grid&privacy=30"
        );
    }

    #[test]
    fn detail_links_keep_order_and_duplicates() {
        let selector = attr_selector("a", "href", "/filedetails/").unwrap();
        let markup = r#"<html><body>
            <a href="https://c.test/filedetails/?id=2">b</a>
            <a href="https://c.test/other">skip</a>
            <a href="">empty</a>
            <a href="https://c.test/filedetails/?id=1">a</a>
            <a href="https://c.test/filedetails/?id=2">b again</a>
        </body></html>"#;

        assert_eq!(
            parse_detail_links(markup, &selector),
            vec![
                "https://c.test/filedetails/?id=2",
                "https://c.test/filedetails/?id=1",
                "https://c.test/filedetails/?id=2",
            ]
        );
    }

    #[test]
    fn full_image_url_drops_query() {
        let selector = attr_selector("img", "src", "/ugc/").unwrap();
        let markup = r#"<img src="https://host/avatar.png"><img src="https://host/ugc/abc?impolicy=x">"#;

        let url = parse_full_image_url(markup, &selector, "https://c.test/filedetails/?id=1")
            .unwrap()
            .unwrap();
        assert_eq!(url, "https://host/ugc/abc");
    }

    #[test]
    fn missing_image_is_none() {
        let selector = attr_selector("img", "src", "/ugc/").unwrap();
        let found = parse_full_image_url("<p>loading</p>", &selector, "https://c.test/").unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn detail_links_retry_until_rendered() {
        let url = "https://community.test/profiles/42/screenshots/?p=1&sort=oldestfirst&browsefilter=myfiles&view=grid&privacy=30";
        let renderer =
            ScriptedRenderer::default().with(url, r#"<a href="https://c.test/filedetails/?id=9">x</a>"#);
        let extractor = extractor(renderer);

        assert_eq!(
            extractor.detail_links(1).await,
            vec!["https://c.test/filedetails/?id=9"]
        );
        assert_eq!(extractor.renderer().visits_to("p=1&"), 1);
    }

    #[tokio::test]
    async fn empty_gallery_exhausts_attempts() {
        let url = "https://community.test/profiles/42/screenshots/?p=5&sort=oldestfirst&browsefilter=myfiles&view=grid&privacy=30";
        let extractor = extractor(ScriptedRenderer::default().with(url, "<div></div>"));

        assert!(extractor.detail_links(5).await.is_empty());
        assert_eq!(extractor.renderer().visits_to("p=5&"), 6);
    }

    #[tokio::test]
    async fn failing_detail_page_is_tried_six_times() {
        let extractor = extractor(ScriptedRenderer::default());

        let found = extractor
            .full_image_url("https://c.test/filedetails/?id=404")
            .await;

        assert!(found.is_none());
        assert_eq!(extractor.renderer().visits_to("id=404"), 6);
    }

    #[tokio::test]
    async fn detail_page_without_image_is_tried_six_times() {
        let detail = "https://c.test/filedetails/?id=7";
        let extractor = extractor(ScriptedRenderer::default().with(detail, "<p>spinner</p>"));

        assert!(extractor.full_image_url(detail).await.is_none());
        assert_eq!(extractor.renderer().visits_to("id=7"), 6);
    }

    #[tokio::test]
    async fn gallery_pages_settle_longer_than_detail_pages() {
        let config = Config::from_json(
            r#"{"profile": "42", "community": "https://community.test"}"#,
        )
        .unwrap();
        let gallery = "https://community.test/profiles/42/screenshots/?p=1&sort=oldestfirst&browsefilter=myfiles&view=grid&privacy=30";
        let detail = "https://steamcommunity.com/sharedfiles/filedetails/?id=1";
        let renderer = ScriptedRenderer::default()
            .with(gallery, &format!(r#"<a href="{}">1</a>"#, detail))
            .with(
                detail,
                r#"<img src="https://images.steamusercontent.com/ugc/1/2/?imw=5000">"#,
            );
        let extractor = LinkExtractor::from_config(renderer, &config).unwrap();

        assert_eq!(extractor.detail_links(1).await, vec![detail]);
        assert_eq!(
            extractor.full_image_url(detail).await.as_deref(),
            Some("https://images.steamusercontent.com/ugc/1/2/")
        );
        assert_eq!(
            extractor.renderer().settles_for("/screenshots/"),
            vec![Duration::from_secs(3)]
        );
        assert_eq!(
            extractor.renderer().settles_for("filedetails"),
            vec![Duration::from_secs(2)]
        );
    }
}
