//! In-process stand-ins for the container runtime, snapshot backend and
//! WebDriver server

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use wpacceptance_common::snapshot::{DB_DUMP_FILE, META_FILE};
use wpacceptance_common::{
    BrowserSettings, CreateSnapshot, Error, Result, Snapshot, SnapshotMeta, SnapshotProvider,
};
use wpacceptance_e2e::container::LABEL_ENVIRONMENT;
use wpacceptance_e2e::{
    BrowserLauncher, ContainerDriver, ContainerSpec, E2eError, E2eResult, ElementHandle, WebDriverClient,
};

/// Serve `200 OK` on a loopback port until the test ends
pub async fn spawn_site() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}

/// A loopback port nothing listens on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Lay out a WordPress install with a short startup timeout
pub fn wordpress_site(root: &Path) -> PathBuf {
    let site = root.join("srv/mysite");
    std::fs::create_dir_all(site.join("wp-content/themes/child")).unwrap();
    std::fs::write(site.join("wp-config.php"), "<?php\n").unwrap();
    std::fs::write(
        site.join("wpacceptance.toml"),
        "name = \"mysite\"\n\n[environment]\nstartup_timeout_secs = 2\n\n[browser]\nimplicit_wait_ms = 50\n",
    )
    .unwrap();
    site
}

// ---------------------------------------------------------------------------
// Container runtime
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DriverLog {
    pub networks: Vec<String>,
    pub containers: Vec<ContainerSpec>,
    pub removed_containers: Vec<String>,
    pub removed_networks: Vec<String>,
    pub execs: Vec<(String, Vec<String>)>,
}

impl DriverLog {
    pub fn live_containers(&self) -> Vec<String> {
        let removed: HashSet<&String> = self.removed_containers.iter().collect();
        self.containers
            .iter()
            .map(|c| c.name.clone())
            .filter(|n| !removed.contains(n))
            .collect()
    }

    pub fn live_networks(&self) -> Vec<String> {
        let removed: HashSet<&String> = self.removed_networks.iter().collect();
        self.networks
            .iter()
            .filter(|n| !removed.contains(n))
            .cloned()
            .collect()
    }
}

pub struct FakeDriver {
    pub log: Mutex<DriverLog>,
    /// Host port reported for the published WordPress port
    pub port: u16,
    /// Refuse to start containers whose name ends with this suffix
    pub fail_suffix: Option<&'static str>,
}

impl FakeDriver {
    pub fn new(port: u16) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(DriverLog::default()),
            port,
            fail_suffix: None,
        })
    }

    pub fn failing(port: u16, suffix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(DriverLog::default()),
            port,
            fail_suffix: Some(suffix),
        })
    }

    fn labelled(&self, spec: &ContainerSpec, selector: &str) -> bool {
        match selector.split_once('=') {
            Some((key, value)) => spec.labels.iter().any(|(k, v)| k == key && v == value),
            None => spec.labels.iter().any(|(k, _)| k == selector),
        }
    }
}

#[async_trait]
impl ContainerDriver for FakeDriver {
    async fn create_network(&self, name: &str, _labels: &[(String, String)]) -> E2eResult<()> {
        self.log.lock().networks.push(name.to_string());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> E2eResult<()> {
        self.log.lock().removed_networks.push(name.to_string());
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> E2eResult<String> {
        if let Some(suffix) = self.fail_suffix {
            if spec.name.ends_with(suffix) {
                return Err(E2eError::ContainerRuntime(format!("image {} not found", spec.image)));
            }
        }
        self.log.lock().containers.push(spec.clone());
        Ok(format!("{:x}", spec.name.len()))
    }

    async fn remove_container(&self, name: &str) -> E2eResult<()> {
        self.log.lock().removed_containers.push(name.to_string());
        Ok(())
    }

    async fn host_port(&self, _name: &str, _container_port: u16) -> E2eResult<u16> {
        Ok(self.port)
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> E2eResult<String> {
        self.log.lock().execs.push((name.to_string(), cmd.to_vec()));
        Ok(String::new())
    }

    async fn list_containers(&self, label: &str) -> E2eResult<Vec<String>> {
        let log = self.log.lock();
        let live = log.live_containers();
        Ok(log
            .containers
            .iter()
            .filter(|c| live.contains(&c.name) && self.labelled(c, label))
            .map(|c| c.name.clone())
            .collect())
    }

    async fn list_networks(&self, label: &str) -> E2eResult<Vec<String>> {
        let log = self.log.lock();
        let id = label
            .strip_prefix(LABEL_ENVIRONMENT)
            .and_then(|rest| rest.strip_prefix('='));
        Ok(log
            .live_networks()
            .into_iter()
            .filter(|n| id.map_or(true, |id| n == &format!("wpa-{}", id)))
            .collect())
    }

    fn remove_container_blocking(&self, name: &str) {
        self.log.lock().removed_containers.push(name.to_string());
    }

    fn remove_network_blocking(&self, name: &str) {
        self.log.lock().removed_networks.push(name.to_string());
    }
}

// ---------------------------------------------------------------------------
// Snapshot backend
// ---------------------------------------------------------------------------

pub const CREATED_ID: &str = "9f86d081884c7d659a2feaa0c55ad015";

#[derive(Debug, Default)]
pub struct SnapshotCalls {
    pub connects: usize,
    pub downloads: Vec<String>,
    pub creates: Vec<CreateSnapshot>,
}

pub struct FakeSnapshots {
    pub cache: TempDir,
    pub reachable: bool,
    /// Ids the backend can serve
    pub remote: Vec<String>,
    pub calls: Mutex<SnapshotCalls>,
}

impl FakeSnapshots {
    pub fn new() -> Arc<Self> {
        Self::with_remote(&[])
    }

    pub fn with_remote(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            cache: tempfile::tempdir().unwrap(),
            reachable: true,
            remote: ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(SnapshotCalls::default()),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            cache: tempfile::tempdir().unwrap(),
            reachable: false,
            remote: Vec::new(),
            calls: Mutex::new(SnapshotCalls::default()),
        })
    }

    /// Put a snapshot straight into the local cache
    pub fn seed(&self, id: &str) {
        let dir = self.cache.path().join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DB_DUMP_FILE), b"\x1f\x8b").unwrap();
        let meta = serde_json::json!({
            "project": "mysite",
            "table_prefix": "wp_",
            "sites": [{ "home_url": "https://mysite.example", "site_url": "https://mysite.example" }],
        });
        std::fs::write(dir.join(META_FILE), meta.to_string()).unwrap();
    }
}

#[async_trait]
impl SnapshotProvider for FakeSnapshots {
    async fn connect(&self) -> Result<()> {
        self.calls.lock().connects += 1;
        if self.reachable {
            Ok(())
        } else {
            Err(Error::Connection {
                reason: "no repository configured".to_string(),
            })
        }
    }

    fn is_cached(&self, id: &str) -> bool {
        self.cache.path().join(id).join(DB_DUMP_FILE).is_file()
    }

    fn resolve(&self, id: &str) -> Result<Snapshot> {
        if !self.is_cached(id) {
            return Err(Error::SnapshotNotFound { id: id.to_string() });
        }
        let dir = self.cache.path().join(id);
        let meta: SnapshotMeta = serde_json::from_str(&std::fs::read_to_string(dir.join(META_FILE))?)?;
        Ok(Snapshot {
            id: id.to_string(),
            dir,
            meta,
        })
    }

    async fn download(&self, id: &str) -> Result<Snapshot> {
        self.calls.lock().downloads.push(id.to_string());
        if !self.remote.iter().any(|r| r == id) {
            return Err(Error::SnapshotDownload {
                id: id.to_string(),
                reason: "Snapshot not found".to_string(),
            });
        }
        self.seed(id);
        self.resolve(id)
    }

    async fn create(&self, request: &CreateSnapshot) -> Result<Snapshot> {
        self.calls.lock().creates.push(request.clone());
        self.seed(CREATED_ID);
        self.resolve(CREATED_ID)
    }
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BrowserLog {
    pub launches: usize,
    pub visited: Vec<String>,
    pub quits: usize,
}

/// Launches [`FakePage`]s showing a fixed set of selectors
pub struct FakeBrowser {
    pub elements: Vec<&'static str>,
    /// Navigation never completes
    pub hang: bool,
    pub refuse_launch: bool,
    pub log: Arc<Mutex<BrowserLog>>,
}

impl FakeBrowser {
    pub fn showing(elements: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            elements: elements.to_vec(),
            hang: false,
            refuse_launch: false,
            log: Arc::new(Mutex::new(BrowserLog::default())),
        })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            elements: Vec::new(),
            hang: true,
            refuse_launch: false,
            log: Arc::new(Mutex::new(BrowserLog::default())),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            elements: Vec::new(),
            hang: false,
            refuse_launch: true,
            log: Arc::new(Mutex::new(BrowserLog::default())),
        })
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self, settings: &BrowserSettings) -> E2eResult<Box<dyn WebDriverClient>> {
        if self.refuse_launch {
            return Err(E2eError::WebDriver(format!(
                "could not start a session at {}",
                settings.webdriver_url
            )));
        }
        self.log.lock().launches += 1;
        Ok(Box::new(FakePage {
            elements: self.elements.clone(),
            hang: self.hang,
            log: self.log.clone(),
        }))
    }
}

pub struct FakePage {
    elements: Vec<&'static str>,
    hang: bool,
    log: Arc<Mutex<BrowserLog>>,
}

#[async_trait]
impl WebDriverClient for FakePage {
    async fn navigate(&self, url: &Url) -> E2eResult<()> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.log.lock().visited.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<Url> {
        let last = self.log.lock().visited.last().cloned();
        Ok(Url::parse(last.as_deref().unwrap_or("about:blank"))?)
    }

    async fn query(&self, selector: &str) -> E2eResult<Option<ElementHandle>> {
        Ok(self.elements.contains(&selector).then(|| ElementHandle {
            selector: selector.to_string(),
            tag_name: "div".to_string(),
            text: "My Site".to_string(),
        }))
    }

    async fn page_text(&self) -> E2eResult<String> {
        Ok("My Site Just another WordPress site".to_string())
    }

    async fn click(&self, _selector: &str) -> E2eResult<()> {
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> E2eResult<()> {
        Ok(())
    }

    async fn screenshot_png(&self) -> E2eResult<Vec<u8>> {
        let img = image::RgbaImage::new(8, 6);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    async fn quit(&self) -> E2eResult<()> {
        self.log.lock().quits += 1;
        Ok(())
    }
}
