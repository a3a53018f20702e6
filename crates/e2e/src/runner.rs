//! Test case execution against a browser session

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::browser::BrowserSession;
use crate::error::{E2eError, E2eResult};
use crate::spec::{TestSpec, TestStep};

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub environment_id: String,
    pub snapshot_id: String,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs YAML test cases through a [`BrowserSession`]
pub struct TestRunner {
    screenshot_dir: PathBuf,
}

impl TestRunner {
    pub fn new(screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            screenshot_dir: screenshot_dir.into(),
        }
    }

    /// Run a list of test specs, continuing past failing cases
    pub async fn run_specs(&self, session: &BrowserSession, specs: &[TestSpec]) -> TestSuiteResult {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} test(s)...", specs.len());

        for spec in specs {
            let result = self.run_spec(session, spec).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Test Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        TestSuiteResult {
            started_at: Some(chrono::Utc::now() - chrono::Duration::milliseconds(duration_ms as i64)),
            total: specs.len(),
            passed,
            failed,
            duration_ms,
            results,
            ..Default::default()
        }
    }

    /// Run a single test spec, stopping at its first failing step
    pub async fn run_spec(&self, session: &BrowserSession, spec: &TestSpec) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        let mut steps = Vec::new();
        let mut test_error = None;

        for step in &spec.steps {
            let result = self.execute_step(session, &spec.name, step).await;
            let failed = !result.success;
            if failed {
                test_error = result.error.clone();
            }
            steps.push(result);
            if failed {
                break;
            }
        }

        TestResult {
            name: spec.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error: test_error,
        }
    }

    async fn execute_step(&self, session: &BrowserSession, test: &str, step: &TestStep) -> StepResult {
        let start = Instant::now();
        let step_name = step.label();
        debug!("Executing step: {}", step_name);

        let outcome = self.perform(session, test, step).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(screenshot_path) => StepResult {
                success: true,
                step_name,
                duration_ms,
                error: None,
                screenshot_path,
            },
            Err(e) => StepResult {
                success: false,
                step_name,
                duration_ms,
                error: Some(e.to_string()),
                screenshot_path: None,
            },
        }
    }

    async fn perform(
        &self,
        session: &BrowserSession,
        test: &str,
        step: &TestStep,
    ) -> E2eResult<Option<PathBuf>> {
        match step {
            TestStep::Navigate { url } => session.go_to(url).await?,
            TestStep::Click { selector } => session.click(selector).await?,
            TestStep::Fill { selector, value } => session.fill(selector, value).await?,
            TestStep::Wait { selector, timeout_ms } => {
                let found = match timeout_ms {
                    Some(ms) => {
                        session
                            .find_element_within(selector, Duration::from_millis(*ms))
                            .await?
                    }
                    None => session.find_element(selector).await?,
                };
                if found.is_none() {
                    return Err(E2eError::ElementNotFound {
                        selector: selector.clone(),
                    });
                }
            }
            TestStep::AssertElement {
                selector,
                present,
                text_contains,
            } => {
                assert_element(session, selector, *present, text_contains.as_deref()).await?
            }
            TestStep::AssertText { text } => {
                if !session.see_text(text).await? {
                    return Err(E2eError::AssertionFailed(format!(
                        "page text does not contain '{}'",
                        text
                    )));
                }
            }
            TestStep::AssertUrl { contains } => {
                let url = session.current_url().await?;
                if !url.as_str().contains(contains.as_str()) {
                    return Err(E2eError::AssertionFailed(format!(
                        "url {} does not contain '{}'",
                        url, contains
                    )));
                }
            }
            TestStep::Screenshot { name } => {
                let file = format!("{}-{}", test, name);
                let shot = session.save_screenshot(&self.screenshot_dir, &file).await?;
                return Ok(Some(shot.path));
            }
            TestStep::Log { message } => info!("[{}] {}", test, message),
        }
        Ok(None)
    }
}

async fn assert_element(
    session: &BrowserSession,
    selector: &str,
    present: bool,
    text_contains: Option<&str>,
) -> E2eResult<()> {
    if !present {
        return if session.dont_see_element(selector).await? {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed(format!("{} should be absent", selector)))
        };
    }

    let element = match session.find_element(selector).await? {
        Some(element) => element,
        None => {
            return Err(E2eError::AssertionFailed(format!("{} should be present", selector)));
        }
    };

    if let Some(expected) = text_contains {
        if !element.text.contains(expected) {
            return Err(E2eError::AssertionFailed(format!(
                "{} text '{}' does not contain '{}'",
                selector, element.text, expected
            )));
        }
    }
    Ok(())
}

/// Write test results to `<dir>/test-results.json`
pub fn write_results(dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let results = TestSuiteResult {
            environment_id: "abc-123".to_string(),
            total: 1,
            failed: 1,
            results: vec![TestResult {
                name: "home-page".to_string(),
                success: false,
                duration_ms: 12,
                steps: vec![],
                error: Some("Assertion failed: .site-title should be present".to_string()),
            }],
            ..Default::default()
        };
        assert!(!results.success());

        let path = write_results(&dir.path().join("out"), &results).unwrap();
        let parsed: TestSuiteResult =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.environment_id, "abc-123");
        assert_eq!(parsed.results[0].name, "home-page");
    }
}
