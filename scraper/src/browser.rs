use crate::types::{Config, GrabError, USER_AGENT};
use std::time::Duration;
use thirtyfour::{DesiredCapabilities, WebDriver};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Something that can load a URL and hand back the rendered markup, once the
/// page has had `settle` to finish client-side rendering.
pub trait PageRenderer {
    async fn navigate(&self, url: &str, settle: Duration) -> Result<String, GrabError>;
}

/// Renders pages through a live WebDriver session.
pub struct WebDriverRenderer {
    driver: WebDriver,
}

impl WebDriverRenderer {
    pub fn new(driver: WebDriver) -> Self {
        Self { driver }
    }
}

impl PageRenderer for WebDriverRenderer {
    async fn navigate(&self, url: &str, settle: Duration) -> Result<String, GrabError> {
        self.driver.goto(url).await?;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(self.driver.source().await?)
    }
}

pub struct Browser {
    pub driver: WebDriver,
    chromedriver: Option<Child>,
}

impl Browser {
    pub async fn launch(config: &Config) -> anyhow::Result<Self> {
        let chromedriver = match &config.chromedriver {
            Some(path) => {
                let port = config.driver_port()?;
                info!("Starting chromedriver {} on port {}", path.display(), port);
                let child = Command::new(path)
                    .arg(format!("--port={}", port))
                    .kill_on_drop(true)
                    .spawn()?;
                tokio::time::sleep(Duration::from_secs(1)).await;
                Some(child)
            }
            None => None,
        };

        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_arg(&format!("--user-agent={}", USER_AGENT))?;
        caps.add_chrome_arg("--log-level=3")?;
        if let Some(dir) = &config.user_data_dir {
            caps.add_chrome_arg(&format!("--user-data-dir={}", dir))?;
        }
        if let Some(profile) = &config.profile_directory {
            caps.add_chrome_arg(&format!("--profile-directory={}", profile))?;
        }
        if let Some(binary) = &config.chrome_binary {
            caps.set_binary(binary)?;
        }
        if config.headless {
            caps.set_headless()?;
        }

        info!("Connecting to WebDriver at {}", config.driver);
        let driver = WebDriver::new(&config.driver, caps).await?;

        Ok(Self {
            driver,
            chromedriver,
        })
    }

    pub async fn quit(self) {
        if let Err(e) = self.driver.quit().await {
            warn!("Failed to close browser session: {}", e);
        }

        if let Some(mut child) = self.chromedriver {
            child.kill().await.ok();
        }
    }
}
