//! WPAcceptance environment and browser automation
//!
//! This crate turns a WordPress snapshot into a disposable, containerised
//! site and drives a real browser against it:
//! - Provisions a database and web container per run from a snapshot
//! - Waits for the site to answer before handing it to the browser
//! - Wraps a WebDriver session in a page-object style facade
//! - Runs declarative YAML test cases and records results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Orchestrator::run (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SnapshotProvider                                           │
//! │    ├── connect()                                            │
//! │    └── download(id) | create(request) -> Snapshot           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Environment (via ContainerDriver)                          │
//! │    ├── provision(snapshot) -> Running { base_url }          │
//! │    └── destroy()           -> Destroyed                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserSession (via WebDriverClient)                       │
//! │    ├── go_to(path), find_element(selector) -> Option        │
//! │    └── TestRunner::run_specs([TestSpec]) -> results         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod container;
pub mod environment;
pub mod error;
pub mod orchestrator;
pub mod runner;
pub mod spec;
pub mod webdriver;

pub use browser::{BrowserSession, ScreenshotArtifact};
pub use container::{CliContainerDriver, ContainerDriver, ContainerRuntime, ContainerSpec};
pub use environment::{reap, CredentialOverrides, Environment, EnvironmentOptions, EnvironmentState, ReapReport};
pub use error::{E2eError, E2eResult};
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
pub use runner::{TestResult, TestRunner, TestSuiteResult};
pub use spec::{TestSpec, TestStep, SAMPLE_SPEC};
pub use webdriver::{BrowserLauncher, ElementHandle, ThirtyfourLauncher, WebDriverClient};
