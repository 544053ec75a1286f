mod browser;
mod extractor;
mod fetcher;
mod logging;
mod sink;
mod types;
mod walker;

use anyhow::Context;
use browser::{Browser, WebDriverRenderer};
use clap::Parser;
use extractor::LinkExtractor;
use fetcher::Fetcher;
use sink::UrlListSink;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use types::Config;
use walker::PageWalker;

/// Downloads every screenshot in a Steam profile's gallery.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(default_value = "config.json")]
    config: PathBuf,

    /// Highest gallery page to visit
    #[arg(long)]
    max_pages: Option<u32>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let mut config =
        Config::from_json(&text).with_context(|| format!("parsing {}", args.config.display()))?;

    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if args.headless {
        config.headless = true;
    }

    Ok(config)
}

fn create_download_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = logging::init(&config.log_file)
        .with_context(|| format!("opening log file {}", config.log_file.display()))?;

    create_download_dir(&config.download_dir)?;

    let fetcher = Fetcher::new(
        &config.download_dir,
        config.download_timeout(),
        config.download_retry,
    )?;
    fetcher
        .clear_partials()
        .with_context(|| format!("cleaning {}", config.download_dir.display()))?;
    let sink = UrlListSink::new(&config.output_file);

    let browser = Browser::launch(&config).await?;
    let renderer = WebDriverRenderer::new(browser.driver.clone());
    let extractor = match LinkExtractor::from_config(renderer, &config) {
        Ok(extractor) => extractor,
        Err(e) => {
            browser.quit().await;
            return Err(e);
        }
    };
    let walker = PageWalker::new(extractor, fetcher, sink);

    let mut interrupted = false;
    tokio::select! {
        _ = walker.run(config.max_pages) => {},
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, closing browser");
            interrupted = true;
        },
    }

    browser.quit().await;
    if interrupted {
        if let Err(e) = walker.fetcher().clear_partials() {
            warn!("Could not clean {}: {}", config.download_dir.display(), e);
        }
    }
    info!("All done.");

    Ok(())
}
