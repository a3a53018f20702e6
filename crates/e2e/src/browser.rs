//! Page-object facade over a WebDriver session
//!
//! A [`BrowserSession`] is bound to one environment's base URL. Paths given
//! to [`BrowserSession::go_to`] are resolved against it, and element lookups
//! return [`ElementHandle`] snapshots rather than live references.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, info};
use url::Url;

use crate::environment::Environment;
use crate::error::{E2eError, E2eResult};
use crate::webdriver::{ElementHandle, WebDriverClient};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A screenshot written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
}

pub struct BrowserSession {
    client: Box<dyn WebDriverClient>,
    base_url: Url,
    implicit_wait: Duration,
}

impl BrowserSession {
    /// Bind a WebDriver session to a running environment
    pub fn for_environment(
        client: Box<dyn WebDriverClient>,
        environment: &Environment,
        implicit_wait: Duration,
    ) -> E2eResult<Self> {
        let base_url = environment.base_url()?.clone();
        Ok(Self::new(client, base_url, implicit_wait))
    }

    pub fn new(client: Box<dyn WebDriverClient>, base_url: Url, implicit_wait: Duration) -> Self {
        Self {
            client,
            base_url,
            implicit_wait,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a site-relative path; absolute URLs to other hosts are rejected
    pub fn resolve(&self, path: &str) -> E2eResult<Url> {
        let url = self.base_url.join(path)?;
        if url.origin() != self.base_url.origin() {
            return Err(E2eError::Navigation(format!(
                "{} is outside the environment at {}",
                path, self.base_url
            )));
        }
        Ok(url)
    }

    /// Navigate to a path relative to the environment root
    pub async fn go_to(&self, path: &str) -> E2eResult<()> {
        let url = self.resolve(path)?;
        debug!("Navigating to {}", url);
        self.client.navigate(&url).await
    }

    pub async fn current_url(&self) -> E2eResult<Url> {
        self.client.current_url().await
    }

    /// Query the DOM once, without waiting
    pub async fn query_element(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
        self.client.query(selector).await
    }

    /// Poll for an element until the implicit wait elapses.
    ///
    /// Absence is a normal `None`; only driver failures are errors.
    pub async fn find_element(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
        self.find_element_within(selector, self.implicit_wait).await
    }

    pub async fn find_element_within(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> E2eResult<Option<ElementHandle>> {
        let start = Instant::now();
        loop {
            if let Some(elem) = self.client.query(selector).await? {
                return Ok(Some(elem));
            }
            if start.elapsed() >= timeout {
                debug!("No element matched {} within {:?}", selector, timeout);
                return Ok(None);
            }
            sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    /// Like [`find_element`](Self::find_element) but a miss is an error
    pub async fn get_element(&self, selector: &str) -> E2eResult<ElementHandle> {
        self.find_element(selector)
            .await?
            .ok_or_else(|| E2eError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    pub async fn see_element(&self, selector: &str) -> E2eResult<bool> {
        Ok(self.find_element(selector).await?.is_some())
    }

    /// True when nothing matches right now
    pub async fn dont_see_element(&self, selector: &str) -> E2eResult<bool> {
        Ok(self.query_element(selector).await?.is_none())
    }

    pub async fn see_text(&self, text: &str) -> E2eResult<bool> {
        Ok(self.client.page_text().await?.contains(text))
    }

    pub async fn click(&self, selector: &str) -> E2eResult<()> {
        self.get_element(selector).await?;
        self.client.click(selector).await
    }

    pub async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.get_element(selector).await?;
        self.client.fill(selector, value).await
    }

    /// PNG bytes of the current page
    pub async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        self.client.screenshot_png().await
    }

    /// Capture the page and write it to `<dir>/<name>.png`
    pub async fn save_screenshot(&self, dir: &Path, name: &str) -> E2eResult<ScreenshotArtifact> {
        let png = self.screenshot().await?;
        let image = image::load_from_memory_with_format(&png, image::ImageFormat::Png)?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.png", sanitize_name(name)));
        tokio::fs::write(&path, &png).await?;

        let artifact = ScreenshotArtifact {
            path,
            width: image.width(),
            height: image.height(),
            sha256: hex::encode(Sha256::digest(&png)),
        };
        info!(
            "Screenshot saved to {} ({}x{})",
            artifact.path.display(),
            artifact.width,
            artifact.height
        );
        Ok(artifact)
    }

    /// End the WebDriver session
    pub async fn close(self) -> E2eResult<()> {
        self.client.quit().await
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "screenshot".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct PageStub {
        visited: Mutex<Vec<String>>,
        elements: Vec<&'static str>,
    }

    #[async_trait]
    impl WebDriverClient for PageStub {
        async fn navigate(&self, url: &Url) -> E2eResult<()> {
            self.visited.lock().push(url.to_string());
            Ok(())
        }

        async fn current_url(&self) -> E2eResult<Url> {
            let visited = self.visited.lock();
            Ok(Url::parse(visited.last().map(String::as_str).unwrap_or("about:blank"))?)
        }

        async fn query(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
            Ok(self.elements.contains(&selector).then(|| ElementHandle {
                selector: selector.to_string(),
                tag_name: "div".to_string(),
                text: "Just another WordPress site".to_string(),
            }))
        }

        async fn page_text(&self) -> E2eResult<String> {
            Ok("Just another WordPress site".to_string())
        }

        async fn click(&self, _selector: &str) -> E2eResult<()> {
            Ok(())
        }

        async fn fill(&self, _selector: &str, _value: &str) -> E2eResult<()> {
            Ok(())
        }

        async fn screenshot_png(&self) -> E2eResult<Vec<u8>> {
            let img = image::RgbaImage::new(4, 3);
            let mut buf = std::io::Cursor::new(Vec::new());
            img.write_to(&mut buf, image::ImageFormat::Png)?;
            Ok(buf.into_inner())
        }

        async fn quit(&self) -> E2eResult<()> {
            Ok(())
        }
    }

    fn session(elements: Vec<&'static str>) -> BrowserSession {
        let stub = PageStub {
            elements,
            ..Default::default()
        };
        BrowserSession::new(
            Box::new(stub),
            Url::parse("http://127.0.0.1:49153/").unwrap(),
            Duration::from_millis(150),
        )
    }

    #[test]
    fn test_resolve_relative_paths() {
        let s = session(vec![]);
        assert_eq!(s.resolve("/").unwrap().as_str(), "http://127.0.0.1:49153/");
        assert_eq!(
            s.resolve("/?s=hello").unwrap().as_str(),
            "http://127.0.0.1:49153/?s=hello"
        );
        assert_eq!(
            s.resolve("sample-page/").unwrap().as_str(),
            "http://127.0.0.1:49153/sample-page/"
        );
        assert!(matches!(
            s.resolve("https://example.com/"),
            Err(E2eError::Navigation(_))
        ));
    }

    #[tokio::test]
    async fn test_present_element() {
        let s = session(vec![".site-title"]);
        let elem = s.get_element(".site-title").await.unwrap();
        assert_eq!(elem.selector, ".site-title");
        assert!(s.see_element(".site-title").await.unwrap());
    }

    #[tokio::test]
    async fn test_absent_element_is_none_not_error() {
        let s = session(vec![]);
        assert_eq!(s.find_element("#site-navigation").await.unwrap(), None);
        assert!(!s.see_element("#site-navigation").await.unwrap());
        assert!(s.dont_see_element("#site-navigation").await.unwrap());
        assert!(matches!(
            s.get_element("#site-navigation").await,
            Err(E2eError::ElementNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_click_missing_element_fails() {
        let s = session(vec![]);
        assert!(matches!(
            s.click("#submit").await,
            Err(E2eError::ElementNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(vec![]);
        let shot = s.save_screenshot(dir.path(), "home page").await.unwrap();
        assert_eq!(shot.path, dir.path().join("home-page.png"));
        assert_eq!((shot.width, shot.height), (4, 3));
        assert_eq!(shot.sha256.len(), 64);
        assert!(shot.path.is_file());
    }
}
