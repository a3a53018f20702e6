//! WebDriver client seam
//!
//! The browser is driven through a W3C WebDriver server (chromedriver,
//! geckodriver or Selenium). [`WebDriverClient`] is the narrow surface the
//! page-object facade needs; [`ThirtyfourClient`] implements it on top of
//! the `thirtyfour` crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tracing::debug;
use url::Url;
use wpacceptance_common::{BrowserKind, BrowserSettings};

use crate::error::{E2eError, E2eResult};

/// Snapshot of a DOM element taken at query time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub tag_name: String,
    pub text: String,
}

/// Browser operations used by [`crate::browser::BrowserSession`]
#[async_trait]
pub trait WebDriverClient: Send + Sync {
    async fn navigate(&self, url: &Url) -> E2eResult<()>;

    async fn current_url(&self) -> E2eResult<Url>;

    /// First element matching a CSS selector, if any
    async fn query(&self, selector: &str) -> E2eResult<Option<ElementHandle>>;

    /// Visible text of the whole page
    async fn page_text(&self) -> E2eResult<String>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    /// Clear an input and type `value` into it
    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;

    /// PNG of the current viewport
    async fn screenshot_png(&self) -> E2eResult<Vec<u8>>;

    /// End the WebDriver session
    async fn quit(&self) -> E2eResult<()>;
}

/// Opens WebDriver sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, settings: &BrowserSettings) -> E2eResult<Box<dyn WebDriverClient>>;
}

/// Launcher for a remote WebDriver server
#[derive(Debug, Clone, Default)]
pub struct ThirtyfourLauncher;

#[async_trait]
impl BrowserLauncher for ThirtyfourLauncher {
    async fn launch(&self, settings: &BrowserSettings) -> E2eResult<Box<dyn WebDriverClient>> {
        let client = ThirtyfourClient::connect(settings).await?;
        Ok(Box::new(client))
    }
}

/// [`WebDriverClient`] backed by a thirtyfour session
pub struct ThirtyfourClient {
    driver: WebDriver,
}

impl ThirtyfourClient {
    pub async fn connect(settings: &BrowserSettings) -> E2eResult<Self> {
        debug!(
            "Connecting to {} WebDriver at {}",
            settings.browser.as_str(),
            settings.webdriver_url
        );

        let driver = match settings.browser {
            BrowserKind::Chrome => {
                let mut caps = DesiredCapabilities::chrome();
                if settings.headless {
                    caps.set_headless()?;
                }
                caps.add_arg("--no-sandbox")?;
                WebDriver::new(&settings.webdriver_url, caps).await
            }
            BrowserKind::Firefox => {
                let mut caps = DesiredCapabilities::firefox();
                if settings.headless {
                    caps.set_headless()?;
                }
                WebDriver::new(&settings.webdriver_url, caps).await
            }
        }
        .map_err(|e| {
            E2eError::WebDriver(format!(
                "could not start a session at {}: {}",
                settings.webdriver_url, e
            ))
        })?;

        driver
            .set_window_rect(0, 0, settings.window_width, settings.window_height)
            .await?;

        Ok(Self { driver })
    }

    async fn first(&self, selector: &str) -> E2eResult<Option<WebElement>> {
        let mut found = self.driver.find_all(By::Css(selector)).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    async fn require(&self, selector: &str) -> E2eResult<WebElement> {
        self.first(selector)
            .await?
            .ok_or_else(|| E2eError::ElementNotFound {
                selector: selector.to_string(),
            })
    }
}

#[async_trait]
impl WebDriverClient for ThirtyfourClient {
    async fn navigate(&self, url: &Url) -> E2eResult<()> {
        self.driver
            .goto(url.as_str())
            .await
            .map_err(|e| E2eError::Navigation(format!("{}: {}", url, e)))
    }

    async fn current_url(&self) -> E2eResult<Url> {
        let current = self.driver.current_url().await?;
        Ok(Url::parse(current.as_str())?)
    }

    async fn query(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
        match self.first(selector).await? {
            Some(elem) => Ok(Some(ElementHandle {
                selector: selector.to_string(),
                tag_name: elem.tag_name().await?,
                text: elem.text().await?,
            })),
            None => Ok(None),
        }
    }

    async fn page_text(&self) -> E2eResult<String> {
        let body = self.driver.find(By::Tag("body")).await?;
        Ok(body.text().await?)
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.require(selector).await?.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        let elem = self.require(selector).await?;
        elem.clear().await?;
        elem.send_keys(value).await?;
        Ok(())
    }

    async fn screenshot_png(&self) -> E2eResult<Vec<u8>> {
        Ok(self.driver.screenshot_as_png().await?)
    }

    async fn quit(&self) -> E2eResult<()> {
        self.driver.clone().quit().await?;
        Ok(())
    }
}
