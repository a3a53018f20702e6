//! Error types for environment provisioning and browser automation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error(transparent)]
    Common(#[from] wpacceptance_common::Error),

    #[error("Could not create environment: {0}")]
    Provision(String),

    #[error("Environment did not answer health checks after {attempts} attempts ({seconds}s)")]
    HealthCheckTimeout { attempts: usize, seconds: u64 },

    #[error("No container runtime found. Install docker or podman")]
    RuntimeNotFound,

    #[error("Container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("Invalid environment state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Environment {id} is not running (state: {state})")]
    NotRunning { id: String, state: String },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<thirtyfour::error::WebDriverError> for E2eError {
    fn from(e: thirtyfour::error::WebDriverError) -> Self {
        E2eError::WebDriver(e.to_string())
    }
}

impl From<url::ParseError> for E2eError {
    fn from(e: url::ParseError) -> Self {
        E2eError::Navigation(e.to_string())
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
